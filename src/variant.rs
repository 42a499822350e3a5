use std::{fmt, str::FromStr};

/// Device-family parameter selecting which header layout rules apply.
///
/// The wrapper tools in this space historically hid the choice behind a
/// global "script variant" toggle; here it is an explicit argument to
/// [`crate::BootHeader::parse`] and [`crate::BootImage::from_bytes`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FormatVariant {
    /// Modern headers, versions 0 through 2 (`boot.img`).
    #[default]
    Android,
    /// Legacy 608-byte header with an inline dtb size word and no
    /// extra cmdline (`boot.fex`).
    Allwinner,
}

impl FormatVariant {
    /// Conventional file name for a packed image of this family.
    pub fn image_file_name(self) -> &'static str {
        match self {
            Self::Android => "boot.img",
            Self::Allwinner => "boot.fex",
        }
    }
}

impl fmt::Display for FormatVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Android => "android",
            Self::Allwinner => "allwinner",
        })
    }
}

impl FromStr for FormatVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "android" => Ok(Self::Android),
            "allwinner" => Ok(Self::Allwinner),
            other => Err(format!(
                "unknown format variant {other:?} (expected \"android\" or \"allwinner\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for variant in [FormatVariant::Android, FormatVariant::Allwinner] {
            assert_eq!(variant.to_string().parse::<FormatVariant>(), Ok(variant));
        }
        assert!("samsung".parse::<FormatVariant>().is_err());
    }
}
