use std::fmt;

use serde::{Deserialize, Serialize};

/// Packed OS version and security patch level.
///
/// The codec passes this field through unmodified; the accessors only
/// exist so callers and the unpack listing can render it.
///
/// # Bitwise format
///
/// * 7 bits: first version component
/// * 7 bits: second version component
/// * 7 bits: third version component
/// * 7 bits: patch year since 2000
/// * 4 bits: patch month
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OsVersion(u32);

impl OsVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u32 {
        self.0
    }

    /// Packs a version triple and a patch year/month.
    pub fn from_parts(major: u8, minor: u8, patch: u8, year: u16, month: u8) -> Self {
        let version =
            (u32::from(major) << 14) | ((u32::from(minor) & 0x7f) << 7) | (u32::from(patch) & 0x7f);
        let level = (u32::from(year.saturating_sub(2000)) << 4) | (u32::from(month) & 0xf);
        Self((version << 11) | (level & 0x7ff))
    }

    /// The three version components.
    pub fn version_parts(self) -> (u8, u8, u8) {
        let v = self.0 >> 11;
        ((v >> 14) as u8, (v >> 7 & 0x7f) as u8, (v & 0x7f) as u8)
    }

    /// Patch level as (year, month).
    pub fn patch_level(self) -> (u16, u8) {
        let level = self.0 & 0x7ff;
        ((level >> 4) as u16 + 2000, (level & 0xf) as u8)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b, c) = self.version_parts();
        let (year, month) = self.patch_level();
        write!(f, "{a}.{b}.{c} ({year}-{month:02})")
    }
}

impl fmt::Debug for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OsVersion({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks() {
        let v = OsVersion::from_parts(12, 0, 0, 2024, 6);
        assert_eq!(v.to_raw(), 402653574);
        assert_eq!(v.version_parts(), (12, 0, 0));
        assert_eq!(v.patch_level(), (2024, 6));
        assert_eq!(v.to_string(), "12.0.0 (2024-06)");
        assert_eq!(OsVersion::from_raw(v.to_raw()), v);
    }

    #[test]
    fn zero_is_opaque_passthrough() {
        let v = OsVersion::from_raw(0);
        assert_eq!(v.to_raw(), 0);
        assert_eq!(v.version_parts(), (0, 0, 0));
    }
}
