use std::{fs, io, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use bootfex::{BootHeader, BootImage, IdPolicy, SegmentKind};
use clap::Parser;

/// Rebuild a boot image from a header descriptor and segment files.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory holding header.toml and the segment artifacts
    #[arg(long, default_value = "out")]
    dir: PathBuf,

    /// Path of the repacked image (defaults to boot.img, or boot.fex
    /// for a legacy-layout descriptor)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the descriptor's id field through instead of recomputing it
    #[arg(long)]
    preserve_id: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let descriptor_path = args.dir.join("header.toml");
    let descriptor = fs::read_to_string(&descriptor_path)
        .with_context(|| format!("Failed to read header descriptor: {descriptor_path:?}"))?;
    let header: BootHeader = toml_edit::de::from_str(&descriptor)
        .with_context(|| format!("Failed to parse header descriptor: {descriptor_path:?}"))?;

    let image = BootImage {
        kernel: read_segment(&args.dir, SegmentKind::Kernel)?.unwrap_or_default(),
        ramdisk: read_segment(&args.dir, SegmentKind::Ramdisk)?.unwrap_or_default(),
        second: read_segment(&args.dir, SegmentKind::Second)?.unwrap_or_default(),
        recovery_dtbo: read_segment(&args.dir, SegmentKind::RecoveryDtbo)?,
        dtb: read_segment(&args.dir, SegmentKind::Dtb)?,
        header,
    };

    let policy = if args.preserve_id {
        IdPolicy::Preserve
    } else {
        IdPolicy::Regenerate
    };
    let bytes = image
        .to_bytes(policy)
        .context("Failed to encode boot image")?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(image.header.variant().image_file_name()));
    fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write boot image: {output:?}"))?;

    println!("Packed {} bytes into {output:?}", bytes.len());

    Ok(())
}

/// Reads a segment artifact, treating a missing file as an absent
/// segment rather than an error.
fn read_segment(dir: &Path, kind: SegmentKind) -> Result<Option<Vec<u8>>> {
    let path = dir.join(kind.file_name());
    match fs::read(&path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read {kind} segment: {path:?}"))
        }
    }
}
