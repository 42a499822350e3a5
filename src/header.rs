use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};
use serde::{Deserialize, Serialize};

use crate::{error::Error, variant::FormatVariant, version::OsVersion};

/// Magic tag at the start of every image.
pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";

/// Fixed width of the board name field.
pub const NAME_LEN: usize = 16;
/// Fixed width of the kernel command line field.
pub const CMDLINE_LEN: usize = 512;
/// Fixed width of the content id field.
pub const ID_LEN: usize = 32;
/// Fixed width of the extra command line field (modern layouts only).
pub const EXTRA_CMDLINE_LEN: usize = 1024;

/// On-disk header sizes per layout.
pub const HEADER_SIZE_LEGACY: usize = 608;
pub const HEADER_SIZE_V0: usize = 1632;
pub const HEADER_SIZE_V1: usize = 1648;
pub const HEADER_SIZE_V2: usize = 1660;

/// Raw on-disk layout shared by modern header versions 0 through 2.
#[binrw]
#[brw(little, magic = b"ANDROID!")]
struct RawModern {
    kernel_size: u32,
    kernel_addr: u32,
    ramdisk_size: u32,
    ramdisk_addr: u32,
    second_size: u32,
    second_addr: u32,
    tags_addr: u32,
    page_size: u32,
    header_version: u32,
    os_version: u32,
    name: [u8; NAME_LEN],
    cmdline: Box<[u8; CMDLINE_LEN]>,
    id: [u8; ID_LEN],
    extra_cmdline: Box<[u8; EXTRA_CMDLINE_LEN]>,
    #[br(args(header_version))]
    ext: RawModernExt,
}

/// Version-dependent tail of the modern header.
#[binrw]
#[br(import(header_version: u32))]
enum RawModernExt {
    #[br(pre_assert(header_version == 0))]
    V0,
    #[br(pre_assert(header_version == 1))]
    V1 {
        recovery_dtbo_size: u32,
        recovery_dtbo_addr: u64,
        header_size: u32,
    },
    #[br(pre_assert(header_version == 2))]
    V2 {
        recovery_dtbo_size: u32,
        recovery_dtbo_addr: u64,
        header_size: u32,
        dtb_size: u32,
        dtb_addr: u64,
    },
}

/// Raw on-disk layout of the legacy 608-byte header. Identical to the
/// modern layout through `page_size`, then a dtb size word sits where
/// modern headers store their version and the next word is unused.
#[binrw]
#[brw(little, magic = b"ANDROID!")]
struct RawLegacy {
    kernel_size: u32,
    kernel_addr: u32,
    ramdisk_size: u32,
    ramdisk_addr: u32,
    second_size: u32,
    second_addr: u32,
    tags_addr: u32,
    page_size: u32,
    dtb_size: u32,
    extra_flags: u32,
    name: [u8; NAME_LEN],
    cmdline: Box<[u8; CMDLINE_LEN]>,
    id: [u8; ID_LEN],
}

/// Layout-dependent tail of a [`BootHeader`].
///
/// The variant decides both the on-disk header size and which optional
/// trailing segments the image may carry. `Legacy` is the 608-byte
/// family; `V0` through `V2` are the modern versioned family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderExt {
    Legacy {
        dtb_size: u32,
    },
    V0 {
        extra_cmdline: String,
    },
    V1 {
        extra_cmdline: String,
        recovery_dtbo_size: u32,
        recovery_dtbo_addr: u64,
    },
    V2 {
        extra_cmdline: String,
        recovery_dtbo_size: u32,
        recovery_dtbo_addr: u64,
        dtb_size: u32,
        dtb_addr: u64,
    },
}

/// Editable in-memory form of the fixed-size image header.
///
/// Pure data: parsing and serializing move between this record and the
/// raw byte layout, nothing here touches segment payloads. Size fields
/// are what was declared on disk (or whatever the caller left in them);
/// [`crate::BootImage::to_bytes`] recomputes them from the actual
/// segment buffers, so stale values here never reach an encoded image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootHeader {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    /// Opaque, passed through unmodified.
    pub tags_addr: u32,
    /// Alignment unit for every region; must be a nonzero power of two.
    pub page_size: u32,
    /// Opaque passthrough word: os_version in the modern layout, an
    /// unused flags word in the legacy layout.
    pub os_version: OsVersion,
    pub name: String,
    pub cmdline: String,
    /// Content checksum over the segment payloads; see
    /// [`crate::BootImage::content_id`].
    #[serde(with = "hex")]
    pub id: [u8; ID_LEN],
    pub ext: HeaderExt,
}

impl BootHeader {
    /// Parses the fixed header layout at the start of `data`.
    pub fn parse(data: &[u8], variant: FormatVariant) -> Result<Self, Error> {
        if data.len() >= BOOT_MAGIC.len() {
            let mut magic = [0u8; 8];
            magic.copy_from_slice(&data[..8]);
            if magic != BOOT_MAGIC {
                return Err(Error::BadMagic(magic));
            }
        }

        match variant {
            FormatVariant::Android => Self::parse_modern(data),
            FormatVariant::Allwinner => Self::parse_legacy(data),
        }
    }

    fn parse_modern(data: &[u8]) -> Result<Self, Error> {
        if data.len() < HEADER_SIZE_V0 {
            return Err(Error::TruncatedHeader {
                expected: HEADER_SIZE_V0,
                actual: data.len(),
            });
        }

        let version = u32::from_le_bytes([data[40], data[41], data[42], data[43]]);
        if version > 2 {
            return Err(Error::UnsupportedVersion(version));
        }

        let expected = modern_header_size(version);
        if data.len() < expected {
            return Err(Error::TruncatedHeader {
                expected,
                actual: data.len(),
            });
        }

        let raw = RawModern::read(&mut Cursor::new(data)).map_err(Error::HeaderRead)?;

        if !raw.page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(raw.page_size));
        }

        let ext = match raw.ext {
            RawModernExt::V0 => HeaderExt::V0 {
                extra_cmdline: unpack_str("extra_cmdline", &raw.extra_cmdline[..])?,
            },
            RawModernExt::V1 {
                recovery_dtbo_size,
                recovery_dtbo_addr,
                header_size,
            } => {
                if header_size as usize != HEADER_SIZE_V1 {
                    return Err(Error::InvalidHeaderSize {
                        version: 1,
                        size: header_size,
                    });
                }
                HeaderExt::V1 {
                    extra_cmdline: unpack_str("extra_cmdline", &raw.extra_cmdline[..])?,
                    recovery_dtbo_size,
                    recovery_dtbo_addr,
                }
            }
            RawModernExt::V2 {
                recovery_dtbo_size,
                recovery_dtbo_addr,
                header_size,
                dtb_size,
                dtb_addr,
            } => {
                if header_size as usize != HEADER_SIZE_V2 {
                    return Err(Error::InvalidHeaderSize {
                        version: 2,
                        size: header_size,
                    });
                }
                HeaderExt::V2 {
                    extra_cmdline: unpack_str("extra_cmdline", &raw.extra_cmdline[..])?,
                    recovery_dtbo_size,
                    recovery_dtbo_addr,
                    dtb_size,
                    dtb_addr,
                }
            }
        };

        Ok(Self {
            kernel_size: raw.kernel_size,
            kernel_addr: raw.kernel_addr,
            ramdisk_size: raw.ramdisk_size,
            ramdisk_addr: raw.ramdisk_addr,
            second_size: raw.second_size,
            second_addr: raw.second_addr,
            tags_addr: raw.tags_addr,
            page_size: raw.page_size,
            os_version: OsVersion::from_raw(raw.os_version),
            name: unpack_str("name", &raw.name)?,
            cmdline: unpack_str("cmdline", &raw.cmdline[..])?,
            id: raw.id,
            ext,
        })
    }

    fn parse_legacy(data: &[u8]) -> Result<Self, Error> {
        if data.len() < HEADER_SIZE_LEGACY {
            return Err(Error::TruncatedHeader {
                expected: HEADER_SIZE_LEGACY,
                actual: data.len(),
            });
        }

        let raw = RawLegacy::read(&mut Cursor::new(data)).map_err(Error::HeaderRead)?;

        if !raw.page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(raw.page_size));
        }

        Ok(Self {
            kernel_size: raw.kernel_size,
            kernel_addr: raw.kernel_addr,
            ramdisk_size: raw.ramdisk_size,
            ramdisk_addr: raw.ramdisk_addr,
            second_size: raw.second_size,
            second_addr: raw.second_addr,
            tags_addr: raw.tags_addr,
            page_size: raw.page_size,
            os_version: OsVersion::from_raw(raw.extra_flags),
            name: unpack_str("name", &raw.name)?,
            cmdline: unpack_str("cmdline", &raw.cmdline[..])?,
            id: raw.id,
            ext: HeaderExt::Legacy {
                dtb_size: raw.dtb_size,
            },
        })
    }

    /// Serializes the header back to its fixed layout.
    ///
    /// String fields are NUL-padded to their declared width; a string
    /// longer than its field is [`Error::FieldTooLong`], never silently
    /// cut.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        if !self.page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(self.page_size));
        }

        let mut cursor = Cursor::new(Vec::with_capacity(self.size()));

        match &self.ext {
            HeaderExt::Legacy { dtb_size } => {
                let raw = RawLegacy {
                    kernel_size: self.kernel_size,
                    kernel_addr: self.kernel_addr,
                    ramdisk_size: self.ramdisk_size,
                    ramdisk_addr: self.ramdisk_addr,
                    second_size: self.second_size,
                    second_addr: self.second_addr,
                    tags_addr: self.tags_addr,
                    page_size: self.page_size,
                    dtb_size: *dtb_size,
                    extra_flags: self.os_version.to_raw(),
                    name: pack_str("name", &self.name)?,
                    cmdline: Box::new(pack_str("cmdline", &self.cmdline)?),
                    id: self.id,
                };
                raw.write(&mut cursor).map_err(Error::HeaderWrite)?;
            }
            HeaderExt::V0 { extra_cmdline } => {
                let raw = self.raw_modern(0, extra_cmdline, RawModernExt::V0)?;
                raw.write(&mut cursor).map_err(Error::HeaderWrite)?;
            }
            HeaderExt::V1 {
                extra_cmdline,
                recovery_dtbo_size,
                recovery_dtbo_addr,
            } => {
                let ext = RawModernExt::V1 {
                    recovery_dtbo_size: *recovery_dtbo_size,
                    recovery_dtbo_addr: *recovery_dtbo_addr,
                    header_size: HEADER_SIZE_V1 as u32,
                };
                let raw = self.raw_modern(1, extra_cmdline, ext)?;
                raw.write(&mut cursor).map_err(Error::HeaderWrite)?;
            }
            HeaderExt::V2 {
                extra_cmdline,
                recovery_dtbo_size,
                recovery_dtbo_addr,
                dtb_size,
                dtb_addr,
            } => {
                let ext = RawModernExt::V2 {
                    recovery_dtbo_size: *recovery_dtbo_size,
                    recovery_dtbo_addr: *recovery_dtbo_addr,
                    header_size: HEADER_SIZE_V2 as u32,
                    dtb_size: *dtb_size,
                    dtb_addr: *dtb_addr,
                };
                let raw = self.raw_modern(2, extra_cmdline, ext)?;
                raw.write(&mut cursor).map_err(Error::HeaderWrite)?;
            }
        }

        Ok(cursor.into_inner())
    }

    fn raw_modern(
        &self,
        header_version: u32,
        extra_cmdline: &str,
        ext: RawModernExt,
    ) -> Result<RawModern, Error> {
        Ok(RawModern {
            kernel_size: self.kernel_size,
            kernel_addr: self.kernel_addr,
            ramdisk_size: self.ramdisk_size,
            ramdisk_addr: self.ramdisk_addr,
            second_size: self.second_size,
            second_addr: self.second_addr,
            tags_addr: self.tags_addr,
            page_size: self.page_size,
            header_version,
            os_version: self.os_version.to_raw(),
            name: pack_str("name", &self.name)?,
            cmdline: Box::new(pack_str("cmdline", &self.cmdline)?),
            id: self.id,
            extra_cmdline: Box::new(pack_str("extra_cmdline", extra_cmdline)?),
            ext,
        })
    }

    /// On-disk size of this header layout, before page padding.
    pub fn size(&self) -> usize {
        match self.ext {
            HeaderExt::Legacy { .. } => HEADER_SIZE_LEGACY,
            HeaderExt::V0 { .. } => HEADER_SIZE_V0,
            HeaderExt::V1 { .. } => HEADER_SIZE_V1,
            HeaderExt::V2 { .. } => HEADER_SIZE_V2,
        }
    }

    /// Declared header version, `None` for the unversioned legacy layout.
    pub fn version(&self) -> Option<u32> {
        match self.ext {
            HeaderExt::Legacy { .. } => None,
            HeaderExt::V0 { .. } => Some(0),
            HeaderExt::V1 { .. } => Some(1),
            HeaderExt::V2 { .. } => Some(2),
        }
    }

    /// Extra command line, where the layout carries one.
    pub fn extra_cmdline(&self) -> Option<&str> {
        match &self.ext {
            HeaderExt::Legacy { .. } => None,
            HeaderExt::V0 { extra_cmdline }
            | HeaderExt::V1 { extra_cmdline, .. }
            | HeaderExt::V2 { extra_cmdline, .. } => Some(extra_cmdline),
        }
    }

    /// Which image family this header belongs to.
    pub fn variant(&self) -> FormatVariant {
        match self.ext {
            HeaderExt::Legacy { .. } => FormatVariant::Allwinner,
            _ => FormatVariant::Android,
        }
    }
}

fn modern_header_size(version: u32) -> usize {
    match version {
        0 => HEADER_SIZE_V0,
        1 => HEADER_SIZE_V1,
        _ => HEADER_SIZE_V2,
    }
}

/// Reads a fixed-width string field: bytes up to the first NUL, or the
/// full width if no NUL is present.
fn unpack_str(field: &'static str, raw: &[u8]) -> Result<String, Error> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    let s = std::str::from_utf8(&raw[..end])
        .map_err(|source| Error::StringNotUtf8 { field, source })?;
    Ok(s.to_owned())
}

/// NUL-pads `s` into a fixed-width field.
fn pack_str<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N], Error> {
    let bytes = s.as_bytes();
    if bytes.len() > N {
        return Err(Error::FieldTooLong {
            field,
            len: bytes.len(),
            max: N,
        });
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v0_header() -> BootHeader {
        BootHeader {
            kernel_size: 0,
            kernel_addr: 0x10008000,
            ramdisk_size: 0,
            ramdisk_addr: 0x11000000,
            second_size: 0,
            second_addr: 0x10f00000,
            tags_addr: 0x10000100,
            page_size: 2048,
            os_version: OsVersion::from_parts(12, 0, 0, 2024, 6),
            name: "test".into(),
            cmdline: "console=ttyS0".into(),
            id: [0; ID_LEN],
            ext: HeaderExt::V0 {
                extra_cmdline: String::new(),
            },
        }
    }

    #[test]
    fn v0_round_trip() {
        let header = v0_header();
        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE_V0);
        assert_eq!(&bytes[..8], b"ANDROID!");

        let parsed = BootHeader::parse(&bytes, FormatVariant::Android).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), Some(0));
    }

    #[test]
    fn v1_and_v2_round_trip() {
        let mut header = v0_header();
        header.ext = HeaderExt::V1 {
            extra_cmdline: "androidboot.foo=1".into(),
            recovery_dtbo_size: 77,
            recovery_dtbo_addr: 0xdead_beef_0000,
        };
        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE_V1);
        assert_eq!(
            BootHeader::parse(&bytes, FormatVariant::Android).unwrap(),
            header
        );

        header.ext = HeaderExt::V2 {
            extra_cmdline: "androidboot.foo=1".into(),
            recovery_dtbo_size: 77,
            recovery_dtbo_addr: 0xdead_beef_0000,
            dtb_size: 123,
            dtb_addr: 0x4400_0000,
        };
        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE_V2);
        let parsed = BootHeader::parse(&bytes, FormatVariant::Android).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), Some(2));
    }

    #[test]
    fn legacy_round_trip() {
        let mut header = v0_header();
        header.ext = HeaderExt::Legacy { dtb_size: 4040 };
        let bytes = header.serialize().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE_LEGACY);

        let parsed = BootHeader::parse(&bytes, FormatVariant::Allwinner).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.version(), None);
        assert_eq!(parsed.extra_cmdline(), None);
        assert_eq!(parsed.variant(), FormatVariant::Allwinner);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = v0_header().serialize().unwrap();
        bytes[0] = b'X';
        let err = BootHeader::parse(&bytes, FormatVariant::Android).unwrap_err();
        assert!(matches!(err, Error::BadMagic(m) if &m[1..] == b"NDROID!"));

        // Magic mismatch wins regardless of buffer length.
        let err = BootHeader::parse(&bytes[..16], FormatVariant::Android).unwrap_err();
        assert!(matches!(err, Error::BadMagic(_)));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = v0_header().serialize().unwrap();
        let err = BootHeader::parse(&bytes[..HEADER_SIZE_V0 - 1], FormatVariant::Android)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedHeader {
                expected: HEADER_SIZE_V0,
                actual
            } if actual == HEADER_SIZE_V0 - 1
        ));

        // A v2 header cut between the v0 fields and the versioned tail.
        let mut header = v0_header();
        header.ext = HeaderExt::V2 {
            extra_cmdline: String::new(),
            recovery_dtbo_size: 0,
            recovery_dtbo_addr: 0,
            dtb_size: 0,
            dtb_addr: 0,
        };
        let bytes = header.serialize().unwrap();
        let err =
            BootHeader::parse(&bytes[..HEADER_SIZE_V1], FormatVariant::Android).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedHeader {
                expected: HEADER_SIZE_V2,
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_page_size() {
        for page_size in [0u32, 3, 2047] {
            let mut header = v0_header();
            header.page_size = page_size;
            assert!(matches!(
                header.serialize().unwrap_err(),
                Error::InvalidPageSize(p) if p == page_size
            ));
        }

        // Same check on the parse side, via a corrupted byte image.
        let mut bytes = v0_header().serialize().unwrap();
        bytes[36..40].copy_from_slice(&3000u32.to_le_bytes());
        assert!(matches!(
            BootHeader::parse(&bytes, FormatVariant::Android).unwrap_err(),
            Error::InvalidPageSize(3000)
        ));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = v0_header().serialize().unwrap();
        bytes[40..44].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            BootHeader::parse(&bytes, FormatVariant::Android).unwrap_err(),
            Error::UnsupportedVersion(3)
        ));
    }

    #[test]
    fn rejects_wrong_header_size_field() {
        let mut header = v0_header();
        header.ext = HeaderExt::V1 {
            extra_cmdline: String::new(),
            recovery_dtbo_size: 0,
            recovery_dtbo_addr: 0,
        };
        let mut bytes = header.serialize().unwrap();
        // header_size sits after the v1 dtbo size and address fields.
        bytes[1644..1648].copy_from_slice(&999u32.to_le_bytes());
        assert!(matches!(
            BootHeader::parse(&bytes, FormatVariant::Android).unwrap_err(),
            Error::InvalidHeaderSize {
                version: 1,
                size: 999
            }
        ));
    }

    #[test]
    fn overlong_strings_are_an_error_not_a_cut() {
        let mut header = v0_header();
        header.name = "x".repeat(NAME_LEN + 1);
        assert!(matches!(
            header.serialize().unwrap_err(),
            Error::FieldTooLong {
                field: "name",
                len: 17,
                max: NAME_LEN
            }
        ));

        let mut header = v0_header();
        header.cmdline = "c".repeat(CMDLINE_LEN + 1);
        assert!(matches!(
            header.serialize().unwrap_err(),
            Error::FieldTooLong {
                field: "cmdline",
                ..
            }
        ));
    }

    #[test]
    fn full_width_string_reads_back_without_a_nul() {
        let mut header = v0_header();
        header.name = "a".repeat(NAME_LEN);
        let bytes = header.serialize().unwrap();
        let parsed = BootHeader::parse(&bytes, FormatVariant::Android).unwrap();
        assert_eq!(parsed.name, header.name);
    }

    #[test]
    fn string_fields_stop_at_the_first_nul() {
        let mut bytes = v0_header().serialize().unwrap();
        // name starts at offset 48: "ab\0cd..." must read back as "ab".
        bytes[48..53].copy_from_slice(b"ab\0cd");
        let parsed = BootHeader::parse(&bytes, FormatVariant::Android).unwrap();
        assert_eq!(parsed.name, "ab");
    }
}
