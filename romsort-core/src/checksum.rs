use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Checksum algorithms that DATs and scanned files may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecksumAlgorithm {
    /// CRC-32 (every DAT format has it)
    Crc32,
    /// MD5 (128-bit)
    Md5,
    /// SHA-1 (160-bit)
    Sha1,
    /// SHA-256 (256-bit)
    Sha256,
}

impl ChecksumAlgorithm {
    /// All algorithms, weakest first.
    pub const ALL: [ChecksumAlgorithm; 4] = [Self::Crc32, Self::Md5, Self::Sha1, Self::Sha256];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Crc32 => "CRC32",
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    fn bit(&self) -> u8 {
        match self {
            Self::Crc32 => 1,
            Self::Md5 => 1 << 1,
            Self::Sha1 => 1 << 2,
            Self::Sha256 => 1 << 3,
        }
    }
}

/// A set of checksum algorithms, e.g. the ones a caller needs computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChecksumBitmask(u8);

impl ChecksumBitmask {
    pub const NONE: Self = Self(0);
    pub const CRC32: Self = Self(1);
    pub const MD5: Self = Self(1 << 1);
    pub const SHA1: Self = Self(1 << 2);
    pub const SHA256: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    pub fn contains(&self, algorithm: ChecksumAlgorithm) -> bool {
        self.0 & algorithm.bit() != 0
    }

    pub fn with(self, algorithm: ChecksumAlgorithm) -> Self {
        Self(self.0 | algorithm.bit())
    }

    pub fn intersects(&self, other: ChecksumBitmask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The algorithms in this set, weakest first.
    pub fn algorithms(&self) -> impl Iterator<Item = ChecksumAlgorithm> + '_ {
        ChecksumAlgorithm::ALL
            .into_iter()
            .filter(|algorithm| self.contains(*algorithm))
    }
}

impl From<ChecksumAlgorithm> for ChecksumBitmask {
    fn from(algorithm: ChecksumAlgorithm) -> Self {
        Self(algorithm.bit())
    }
}

impl BitOr for ChecksumBitmask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChecksumBitmask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Known checksums of a ROM or file. Values are lowercase hex.
///
/// Any subset of algorithms may be present: minimal DATs only carry CRC32,
/// while a fully hashed file may carry all four.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Checksums {
    pub crc32: Option<String>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
}

impl Checksums {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crc32(mut self, crc32: impl AsRef<str>) -> Self {
        self.crc32 = Some(format!("{:0>8}", normalize_hex(crc32.as_ref())));
        self
    }

    pub fn with_md5(mut self, md5: impl AsRef<str>) -> Self {
        self.md5 = Some(normalize_hex(md5.as_ref()));
        self
    }

    pub fn with_sha1(mut self, sha1: impl AsRef<str>) -> Self {
        self.sha1 = Some(normalize_hex(sha1.as_ref()));
        self
    }

    pub fn with_sha256(mut self, sha256: impl AsRef<str>) -> Self {
        self.sha256 = Some(normalize_hex(sha256.as_ref()));
        self
    }

    pub fn get(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        match algorithm {
            ChecksumAlgorithm::Crc32 => self.crc32.as_deref(),
            ChecksumAlgorithm::Md5 => self.md5.as_deref(),
            ChecksumAlgorithm::Sha1 => self.sha1.as_deref(),
            ChecksumAlgorithm::Sha256 => self.sha256.as_deref(),
        }
    }

    /// Which algorithms have a value.
    pub fn bitmask(&self) -> ChecksumBitmask {
        ChecksumAlgorithm::ALL
            .into_iter()
            .filter(|algorithm| self.get(*algorithm).is_some())
            .fold(ChecksumBitmask::NONE, |mask, algorithm| mask.with(algorithm))
    }

    pub fn is_empty(&self) -> bool {
        self.bitmask().is_empty()
    }

    /// True when every algorithm present on *both* sides has equal values.
    ///
    /// An algorithm missing on either side is not a mismatch, so two
    /// checksum sets with no algorithm in common always agree. Callers are
    /// expected to compare sizes separately.
    pub fn agrees_with(&self, other: &Checksums) -> bool {
        ChecksumAlgorithm::ALL.into_iter().all(|algorithm| {
            match (self.get(algorithm), other.get(algorithm)) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        })
    }

}

impl fmt::Display for Checksums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for algorithm in ChecksumAlgorithm::ALL {
            if let Some(value) = self.get(algorithm) {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "{}:{}", algorithm.name().to_lowercase(), value)?;
                first = false;
            }
        }
        if first {
            f.write_str("(no checksums)")?;
        }
        Ok(())
    }
}

fn normalize_hex(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmask_algorithms() {
        let mask = ChecksumBitmask::CRC32 | ChecksumBitmask::SHA1;
        assert!(mask.contains(ChecksumAlgorithm::Crc32));
        assert!(!mask.contains(ChecksumAlgorithm::Md5));
        assert_eq!(
            mask.algorithms().collect::<Vec<_>>(),
            vec![ChecksumAlgorithm::Crc32, ChecksumAlgorithm::Sha1]
        );
        assert!(ChecksumBitmask::NONE.is_empty());
    }

    #[test]
    fn test_pads_short_crc32() {
        let checksums = Checksums::new().with_crc32("ABCD12").with_sha1("DEADBEEF00");
        assert_eq!(checksums.crc32.as_deref(), Some("00abcd12"));
        assert_eq!(checksums.sha1.as_deref(), Some("deadbeef00"));
    }

    #[test]
    fn test_agrees_only_on_shared_algorithms() {
        let crc_only = Checksums::new().with_crc32("abcdef90");
        let full = Checksums::new()
            .with_crc32("abcdef90")
            .with_sha256("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff");
        assert!(crc_only.agrees_with(&full));
        assert!(full.agrees_with(&crc_only));

        let other_crc = Checksums::new().with_crc32("09876543");
        assert!(!other_crc.agrees_with(&full));
    }

    #[test]
    fn test_disjoint_checksums_agree() {
        let crc_only = Checksums::new().with_crc32("abcdef90");
        let sha_only = Checksums::new().with_sha1("0123456789abcdef0123456789abcdef01234567");
        assert!(crc_only.agrees_with(&sha_only));
    }

    #[test]
    fn test_display() {
        let checksums = Checksums::new().with_crc32("abcdef90").with_sha1("ff");
        assert_eq!(checksums.to_string(), "crc32:abcdef90 sha1:ff");
        assert_eq!(Checksums::new().to_string(), "(no checksums)");
    }
}
