use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use bootfex::{BootImage, FormatVariant, IdCheck};
use clap::Parser;

/// Unpack a boot image into per-segment files and a header descriptor.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the boot image (boot.img / boot.fex)
    #[arg(short, long)]
    image: PathBuf,

    /// Output directory for the unpacked artifacts
    #[arg(long, default_value = "out")]
    out: PathBuf,

    /// Device-family header layout to expect (android or allwinner)
    #[arg(long, default_value_t = FormatVariant::Android)]
    variant: FormatVariant,

    /// Compare the stored id field against the segment contents
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let data = fs::read(&args.image)
        .with_context(|| format!("Failed to read image: {:?}", args.image))?;
    let image = BootImage::from_bytes(&data, args.variant)
        .with_context(|| format!("Failed to decode boot image: {:?}", args.image))?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create output directory: {:?}", args.out))?;

    let descriptor = toml_edit::ser::to_string_pretty(&image.header)
        .context("Failed to serialize header descriptor")?;
    let descriptor_path = args.out.join("header.toml");
    fs::write(&descriptor_path, descriptor)
        .with_context(|| format!("Failed to write header descriptor: {descriptor_path:?}"))?;

    for (kind, data) in image.segments() {
        let path = args.out.join(kind.file_name());
        fs::write(&path, data)
            .with_context(|| format!("Failed to write {kind} segment: {path:?}"))?;
    }

    println!("{image}");

    if args.verify {
        match image.verify_id() {
            IdCheck::Match => println!("id check: OK"),
            IdCheck::Mismatch { stored, computed } => {
                // Advisory only: stock tools frequently leave the id stale.
                eprintln!("id check: MISMATCH");
                eprintln!("  stored:   {}", hex_string(&stored));
                eprintln!("  computed: {}", hex_string(&computed));
            }
        }
    }

    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
