//! Forward-only cursor over a patch body.
//!
//! The K5 format has no tags or delimiters; every field is positional. The
//! reader keeps decode logic a single auditable pass: each read names its
//! field, errors carry the field and offset, and every byte is traced so a
//! decode can be followed field-by-field with `RUST_LOG=trace`.

use crate::bits::to_signed;
use crate::error::{Error, Result};

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Reader { data, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// Reads the next byte without consuming it. Used where a flag lives in
    /// the top bit of a value byte that a later loop still needs to read.
    pub(crate) fn peek(&self, field: &'static str) -> Result<u8> {
        match self.data.get(self.offset) {
            Some(&b) => Ok(b),
            None => Err(Error::Truncated {
                field,
                offset: self.offset,
                len: self.data.len(),
            }),
        }
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8> {
        let b = self.peek(field)?;
        log::trace!("{} @ {:03}: {:02X}", field, self.offset, b);
        self.offset += 1;
        Ok(b)
    }

    pub(crate) fn i8(&mut self, field: &'static str) -> Result<i8> {
        self.u8(field).map(to_signed)
    }

    pub(crate) fn bytes(&mut self, n: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.offset + n > self.data.len() {
            return Err(Error::Truncated {
                field,
                offset: self.offset,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.offset..self.offset + n];
        log::trace!("{} @ {:03}: {} bytes", field, self.offset, n);
        self.offset += n;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_advance() {
        let mut r = Reader::new(&[0x01, 0xFF, 0x03]);
        assert_eq!(r.u8("a").unwrap(), 0x01);
        assert_eq!(r.i8("b").unwrap(), -1);
        assert_eq!(r.offset(), 2);
        assert_eq!(r.peek("c").unwrap(), 0x03);
        assert_eq!(r.offset(), 2);
    }

    #[test]
    fn test_truncation_names_field() {
        let mut r = Reader::new(&[0x01]);
        r.u8("first").unwrap();
        match r.u8("second") {
            Err(Error::Truncated { field, offset, len }) => {
                assert_eq!(field, "second");
                assert_eq!(offset, 1);
                assert_eq!(len, 1);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }
}
