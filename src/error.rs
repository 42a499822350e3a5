use std::str::Utf8Error;

use thiserror::Error;

use crate::image::SegmentKind;

/// Errors reported by the header model and the container codec.
///
/// Decode and encode are all-or-nothing: none of these leave partial
/// results behind, and nothing is retried internally. A stored id that
/// disagrees with the segment contents is deliberately *not* an error;
/// see [`crate::BootImage::verify_id`].
#[derive(Debug, Error)]
pub enum Error {
    /// The image does not begin with the expected magic tag.
    #[error("bad magic: {0:?}")]
    BadMagic([u8; 8]),
    /// Fewer bytes available than the fixed header layout requires.
    #[error("truncated header: need {expected} bytes, have {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    /// The byte stream ends before a declared segment's region.
    #[error("truncated image: {segment} segment needs {needed} bytes, have {available}")]
    TruncatedBody {
        segment: SegmentKind,
        needed: usize,
        available: usize,
    },
    /// `page_size` is zero or not a power of two; all padding math
    /// depends on it, so nothing can be decoded or encoded.
    #[error("invalid page size: {0} (must be a nonzero power of two)")]
    InvalidPageSize(u32),
    /// A string exceeds its fixed on-disk capacity. Silent truncation
    /// would corrupt the boot command line, so this is always fatal.
    #[error("{field} is too long: {len} bytes exceeds the {max}-byte field")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    /// The header declares an extended-layout version this codec does
    /// not recognize; field positions would be guesswork beyond it.
    #[error("unsupported header version: {0}")]
    UnsupportedVersion(u32),
    /// A v1/v2 header_size field disagrees with its fixed value.
    #[error("invalid header size for version {version}: {size}")]
    InvalidHeaderSize { version: u32, size: u32 },
    /// A string field holds non-UTF-8 bytes before its first NUL.
    #[error("{field} is not UTF-8")]
    StringNotUtf8 {
        field: &'static str,
        #[source]
        source: Utf8Error,
    },
    /// A segment buffer is too large for the format's 32-bit size field.
    #[error("{segment} segment is too large for the format: {len} bytes")]
    SegmentTooLarge { segment: SegmentKind, len: usize },
    /// Residual layout-level read failure.
    #[error("failed to read header fields")]
    HeaderRead(#[source] binrw::Error),
    /// Residual layout-level write failure.
    #[error("failed to write header fields")]
    HeaderWrite(#[source] binrw::Error),
}
