//! Boot image container codec for Android-style `boot.img` files and
//! the legacy Allwinner `boot.fex` flavor.
//!
//! The container is a fixed-layout header followed by payload segments
//! (kernel, ramdisk, optional second-stage loader, and depending on the
//! header layout a recovery dtbo and/or device tree blob), each region
//! zero-padded to the header's page size. [`BootImage::from_bytes`]
//! splits a byte stream into a [`BootHeader`] plus segment buffers;
//! [`BootImage::to_bytes`] rebuilds the stream, recomputing sizes and
//! (by default) the SHA-1 content id. Both directions are pure
//! functions over in-memory buffers; file I/O belongs to the caller.
//!
//! ```no_run
//! use bootfex::{BootImage, FormatVariant, IdPolicy};
//!
//! let data = std::fs::read("boot.img")?;
//! let mut image = BootImage::from_bytes(&data, FormatVariant::Android)?;
//! image.header.cmdline = "console=ttyS0 loglevel=4".into();
//! std::fs::write("boot.img", image.to_bytes(IdPolicy::Regenerate)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod header;
mod image;
mod padding;
mod variant;
mod version;

pub use error::Error;
pub use header::{
    BootHeader, HeaderExt, BOOT_MAGIC, CMDLINE_LEN, EXTRA_CMDLINE_LEN, HEADER_SIZE_LEGACY,
    HEADER_SIZE_V0, HEADER_SIZE_V1, HEADER_SIZE_V2, ID_LEN, NAME_LEN,
};
pub use image::{BootImage, IdCheck, IdPolicy, SegmentKind};
pub use variant::FormatVariant;
pub use version::OsVersion;
