use std::fmt;

use sha1::{Digest, Sha1};

use crate::{
    error::Error,
    header::{BootHeader, HeaderExt, ID_LEN},
    padding,
    variant::FormatVariant,
};

/// The five payload slots a container can carry, in their fixed stream
/// order. Which of the last two exist depends on the header layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Kernel,
    Ramdisk,
    Second,
    RecoveryDtbo,
    Dtb,
}

impl SegmentKind {
    /// Artifact file name used by the unpack/repack tools.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Ramdisk => "ramdisk",
            Self::Second => "second",
            Self::RecoveryDtbo => "recovery_dtbo",
            Self::Dtb => "dtb",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// What to do with the header's id field on encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdPolicy {
    /// Recompute the id from the segment payloads.
    #[default]
    Regenerate,
    /// Write the header's id bytes through unchanged.
    Preserve,
}

/// Advisory result of comparing the stored id against the payloads.
///
/// A mismatch is never fatal to the codec; whether to verify, ignore,
/// or regenerate is the caller's policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdCheck {
    Match,
    Mismatch {
        stored: [u8; ID_LEN],
        computed: [u8; ID_LEN],
    },
}

/// A decoded container: one header plus the segment payloads.
///
/// `kernel`, `ramdisk` and `second` are always present as buffers (an
/// empty buffer means the segment is absent from the stream). The
/// `recovery_dtbo` and `dtb` buffers exist only when the header's
/// [`HeaderExt`] declares their slot; a buffer supplied alongside a
/// layout without that slot is ignored by [`Self::to_bytes`].
///
/// Values of this type are never mutated by the codec; editing the
/// header or the buffers and encoding again is the caller's workflow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootImage {
    pub header: BootHeader,
    pub kernel: Vec<u8>,
    pub ramdisk: Vec<u8>,
    pub second: Vec<u8>,
    pub recovery_dtbo: Option<Vec<u8>>,
    pub dtb: Option<Vec<u8>>,
}

impl BootImage {
    /// Decodes a container from `data`.
    ///
    /// The header is parsed at offset 0, then each segment with a
    /// nonzero declared size is sliced out of its page-aligned region
    /// in fixed order. Padding bytes between regions are discarded
    /// without inspection; only re-encoding normalizes them to zero.
    /// All-or-nothing: any failure returns an error and no partial
    /// image.
    pub fn from_bytes(data: &[u8], variant: FormatVariant) -> Result<Self, Error> {
        let header = BootHeader::parse(data, variant)?;
        let page_size = header.page_size as usize;
        let mut offset = padding::round_up(header.size(), page_size);

        let mut take = |kind: SegmentKind, size: u32| -> Result<Vec<u8>, Error> {
            let size = size as usize;
            if size == 0 {
                return Ok(Vec::new());
            }
            let needed = offset + size;
            if needed > data.len() {
                return Err(Error::TruncatedBody {
                    segment: kind,
                    needed,
                    available: data.len(),
                });
            }
            let buf = data[offset..needed].to_vec();
            offset = padding::round_up(needed, page_size);
            Ok(buf)
        };

        let kernel = take(SegmentKind::Kernel, header.kernel_size)?;
        let ramdisk = take(SegmentKind::Ramdisk, header.ramdisk_size)?;
        let second = take(SegmentKind::Second, header.second_size)?;

        let (recovery_dtbo, dtb) = match header.ext {
            HeaderExt::Legacy { dtb_size } => (None, Some(take(SegmentKind::Dtb, dtb_size)?)),
            HeaderExt::V0 { .. } => (None, None),
            HeaderExt::V1 {
                recovery_dtbo_size, ..
            } => (
                Some(take(SegmentKind::RecoveryDtbo, recovery_dtbo_size)?),
                None,
            ),
            HeaderExt::V2 {
                recovery_dtbo_size,
                dtb_size,
                ..
            } => (
                Some(take(SegmentKind::RecoveryDtbo, recovery_dtbo_size)?),
                Some(take(SegmentKind::Dtb, dtb_size)?),
            ),
        };

        Ok(Self {
            header,
            kernel,
            ramdisk,
            second,
            recovery_dtbo,
            dtb,
        })
    }

    /// Encodes the image back into a single byte stream.
    ///
    /// Every size field in the emitted header is recomputed from the
    /// actual buffer lengths; stale values in [`Self::header`] never
    /// reach the output. Each region is zero-padded to the next page
    /// boundary, so an image whose original padding was nonzero will
    /// not re-encode byte-identically — a deliberate normalization.
    pub fn to_bytes(&self, id_policy: IdPolicy) -> Result<Vec<u8>, Error> {
        let mut header = self.header.clone();
        header.kernel_size = declared_size(SegmentKind::Kernel, &self.kernel)?;
        header.ramdisk_size = declared_size(SegmentKind::Ramdisk, &self.ramdisk)?;
        header.second_size = declared_size(SegmentKind::Second, &self.second)?;

        let recovery_dtbo = self.recovery_dtbo.as_deref().unwrap_or(&[]);
        let dtb = self.dtb.as_deref().unwrap_or(&[]);
        match &mut header.ext {
            HeaderExt::Legacy { dtb_size } => {
                *dtb_size = declared_size(SegmentKind::Dtb, dtb)?;
            }
            HeaderExt::V0 { .. } => {}
            HeaderExt::V1 {
                recovery_dtbo_size, ..
            } => {
                *recovery_dtbo_size = declared_size(SegmentKind::RecoveryDtbo, recovery_dtbo)?;
            }
            HeaderExt::V2 {
                recovery_dtbo_size,
                dtb_size,
                ..
            } => {
                *recovery_dtbo_size = declared_size(SegmentKind::RecoveryDtbo, recovery_dtbo)?;
                *dtb_size = declared_size(SegmentKind::Dtb, dtb)?;
            }
        }

        if id_policy == IdPolicy::Regenerate {
            header.id = self.content_id();
        }

        let header_bytes = header.serialize()?;
        let page_size = header.page_size as usize;

        let segments = self.segments();
        let total = padding::round_up(header_bytes.len(), page_size)
            + segments
                .iter()
                .map(|(_, data)| padding::round_up(data.len(), page_size))
                .sum::<usize>();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&header_bytes);
        out.resize(padding::round_up(out.len(), page_size), 0);
        for (_, data) in segments {
            out.extend_from_slice(data);
            out.resize(padding::round_up(out.len(), page_size), 0);
        }

        Ok(out)
    }

    /// The present (non-empty) segments in fixed stream order.
    pub fn segments(&self) -> Vec<(SegmentKind, &[u8])> {
        let recovery_slot = matches!(self.header.ext, HeaderExt::V1 { .. } | HeaderExt::V2 { .. });
        let dtb_slot = matches!(
            self.header.ext,
            HeaderExt::Legacy { .. } | HeaderExt::V2 { .. }
        );

        let slots = [
            (SegmentKind::Kernel, Some(self.kernel.as_slice())),
            (SegmentKind::Ramdisk, Some(self.ramdisk.as_slice())),
            (SegmentKind::Second, Some(self.second.as_slice())),
            (
                SegmentKind::RecoveryDtbo,
                recovery_slot.then(|| self.recovery_dtbo.as_deref()).flatten(),
            ),
            (
                SegmentKind::Dtb,
                dtb_slot.then(|| self.dtb.as_deref()).flatten(),
            ),
        ];

        slots
            .into_iter()
            .filter_map(|(kind, data)| data.filter(|d| !d.is_empty()).map(|d| (kind, d)))
            .collect()
    }

    /// Content id: SHA-1 over each present segment's exact bytes
    /// followed by its length as a little-endian u32, in fixed order,
    /// zero-padded to the 32-byte field. Order-sensitive by
    /// construction: the same payloads in a different slot order hash
    /// differently.
    pub fn content_id(&self) -> [u8; ID_LEN] {
        let mut hasher = Sha1::new();
        for (_, data) in self.segments() {
            hasher.update(data);
            hasher.update((data.len() as u32).to_le_bytes());
        }
        let digest = hasher.finalize();

        let mut id = [0u8; ID_LEN];
        id[..digest.len()].copy_from_slice(&digest);
        id
    }

    /// Compares the stored id against the payloads. Advisory only.
    pub fn verify_id(&self) -> IdCheck {
        let computed = self.content_id();
        if self.header.id == computed {
            IdCheck::Match
        } else {
            IdCheck::Mismatch {
                stored: self.header.id,
                computed,
            }
        }
    }
}

fn declared_size(kind: SegmentKind, data: &[u8]) -> Result<u32, Error> {
    u32::try_from(data.len()).map_err(|_| Error::SegmentTooLarge {
        segment: kind,
        len: data.len(),
    })
}

impl fmt::Display for BootImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.header.version() {
            Some(v) => writeln!(f, "Boot image header (v{v}):")?,
            None => writeln!(f, "Boot image header (legacy):")?,
        }
        writeln!(f, "- Kernel size:          {}", self.kernel.len())?;
        writeln!(f, "- Kernel address:       {:#x}", self.header.kernel_addr)?;
        writeln!(f, "- Ramdisk size:         {}", self.ramdisk.len())?;
        writeln!(f, "- Ramdisk address:      {:#x}", self.header.ramdisk_addr)?;
        writeln!(f, "- Second stage size:    {}", self.second.len())?;
        writeln!(f, "- Second stage address: {:#x}", self.header.second_addr)?;
        writeln!(f, "- Kernel tags address:  {:#x}", self.header.tags_addr)?;
        writeln!(f, "- Page size:            {}", self.header.page_size)?;
        writeln!(f, "- OS version:           {}", self.header.os_version)?;
        writeln!(f, "- Name:                 {:?}", self.header.name)?;
        writeln!(f, "- Cmdline:              {:?}", self.header.cmdline)?;
        write!(f, "- Id:                   {}", hex::encode(self.header.id))?;

        if let Some(extra) = self.header.extra_cmdline() {
            writeln!(f)?;
            write!(f, "- Extra cmdline:        {extra:?}")?;
        }
        if let Some(dtbo) = &self.recovery_dtbo {
            writeln!(f)?;
            write!(f, "- Recovery dtbo size:   {}", dtbo.len())?;
        }
        if let Some(dtb) = &self.dtb {
            writeln!(f)?;
            write!(f, "- Device tree size:     {}", dtb.len())?;
        }

        Ok(())
    }
}
