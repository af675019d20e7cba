use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use k5tool::{checksum, decode_bank, leiter, nybble, sysex, Single};

/// Inspect and verify Kawai K5 SysEx patch dumps
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all patches in a sysex file
    List {
        /// Path to the K5 sysex file
        sysex_file: PathBuf,
    },
    /// Print the full contents of a patch
    Dump {
        /// Path to the K5 sysex file
        sysex_file: PathBuf,

        /// Patch index within the file (0-indexed); omit to dump all
        patch_number: Option<usize>,

        /// Emit JSON instead of the text report
        #[arg(long)]
        json: bool,
    },
    /// Verify checksums and re-encoding of every patch in a file
    Check {
        /// Path to the K5 sysex file
        sysex_file: PathBuf,
    },
    /// Print a generated harmonic level table for a waveform
    Harmonics {
        /// Waveform name (saw, square, triangle)
        waveform: String,

        /// Number of harmonics to generate
        #[arg(long, default_value_t = 63)]
        count: usize,
    },
}

fn read_patches(path: &PathBuf) -> anyhow::Result<Vec<(sysex::SysexHeader, Single)>> {
    let data = std::fs::read(path)
        .with_context(|| format!("reading sysex file '{}'", path.display()))?;
    let patches = decode_bank(&data);
    if patches.is_empty() {
        anyhow::bail!("no K5 single-patch dumps in '{}'", path.display());
    }
    Ok(patches)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::List { sysex_file } => {
            for (header, single) in read_patches(&sysex_file)? {
                println!(
                    "{:>8}  {:<8}  ch {:>2}",
                    sysex::program_name(header.substatus2),
                    single.name,
                    header.channel + 1
                );
            }
        }
        Commands::Dump {
            sysex_file,
            patch_number,
            json,
        } => {
            let patches = read_patches(&sysex_file)?;
            let selected: Vec<_> = match patch_number {
                Some(n) => {
                    let entry = patches.get(n).with_context(|| {
                        format!(
                            "patch {} is out of range (file has {} patches)",
                            n,
                            patches.len()
                        )
                    })?;
                    vec![entry]
                }
                None => patches.iter().collect(),
            };
            for (header, single) in selected {
                if json {
                    println!("{}", serde_json::to_string_pretty(single)?);
                } else {
                    println!("{}:", sysex::program_name(header.substatus2));
                    println!("{}", single);
                }
            }
        }
        Commands::Check { sysex_file } => {
            let data = std::fs::read(&sysex_file)
                .with_context(|| format!("reading sysex file '{}'", sysex_file.display()))?;
            let mut failures = 0usize;
            for (i, message) in sysex::split_messages(&data).iter().enumerate() {
                let header = match sysex::SysexHeader::parse(message) {
                    Ok(h) => h,
                    Err(e) => {
                        println!("message {}: unparseable ({})", i, e);
                        failures += 1;
                        continue;
                    }
                };
                if !header.is_k5() || !header.is_single_dump() {
                    println!(
                        "message {}: skipped ({} for {})",
                        i,
                        header.function_name(),
                        sysex::program_name(header.substatus2)
                    );
                    continue;
                }
                let label = sysex::program_name(header.substatus2);
                let body = match nybble::collapse(sysex::payload(message)?) {
                    Ok(b) => b,
                    Err(e) => {
                        println!("{}: bad payload ({})", label, e);
                        failures += 1;
                        continue;
                    }
                };
                let single = match Single::decode(&body) {
                    Ok(s) => s,
                    Err(e) => {
                        println!("{}: decode failed ({})", label, e);
                        failures += 1;
                        continue;
                    }
                };
                if let Err(e) = Single::verify(&body) {
                    println!("{}: {}  \"{}\"", label, e, single.name);
                    failures += 1;
                    continue;
                }
                if single.encode() != body {
                    println!("{}: re-encoding differs  \"{}\"", label, single.name);
                    failures += 1;
                    continue;
                }
                println!(
                    "{}: ok  \"{}\"  checksum {:04X}",
                    label,
                    single.name,
                    checksum::compute(&body[..body.len() - 2])
                );
            }
            if failures > 0 {
                anyhow::bail!("{} message(s) failed verification", failures);
            }
        }
        Commands::Harmonics { waveform, count } => {
            let levels = leiter::levels(&waveform, count)?;
            for (i, level) in levels.iter().enumerate() {
                println!("{:>2}: {:>3}  {}", i + 1, level, "*".repeat(*level as usize / 3));
            }
        }
    }

    Ok(())
}
