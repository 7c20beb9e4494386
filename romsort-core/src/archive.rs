use std::fmt;
use std::path::{Path, PathBuf};

/// Container formats an input archive may use.
///
/// Only the kind is recorded here; reading and writing the container is the
/// job of a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
    Rar,
    Tar,
    Gzip,
    /// Compressed disc image; its `.cue` sheet can be regenerated from the
    /// track data so it is allowed to be missing.
    Chd,
}

impl ArchiveKind {
    /// Guess the kind from a file name, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar") {
            return Some(Self::Tar);
        }
        let ext = Path::new(&name).extension()?.to_str()?.to_string();
        match ext.as_str() {
            "zip" => Some(Self::Zip),
            "7z" => Some(Self::SevenZip),
            "rar" => Some(Self::Rar),
            "gz" => Some(Self::Gzip),
            "chd" => Some(Self::Chd),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
            Self::Tar => "tar",
            Self::Gzip => "gz",
            Self::Chd => "chd",
        }
    }
}

/// An archive on disk, identified by its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Archive {
    path: PathBuf,
    kind: ArchiveKind,
}

impl Archive {
    pub fn new(path: impl Into<PathBuf>, kind: ArchiveKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Build an archive descriptor from its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = ArchiveKind::from_path(&path)?;
        Some(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn is_chd(&self) -> bool {
        self.kind == ArchiveKind::Chd
    }

    /// File name without the container extension.
    pub fn stem(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lower = name.to_lowercase();
        for suffix in [".tar.gz", ".tgz"] {
            if lower.ends_with(suffix) {
                return name[..name.len() - suffix.len()].to_string();
            }
        }
        match Path::new(&name).file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => name,
        }
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
