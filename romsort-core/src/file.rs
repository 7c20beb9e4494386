//! Input and output file values.
//!
//! A [`File`] is one of three things: a plain file on disk, one entry inside
//! an archive, or a whole archive treated as a single opaque blob. All three
//! share the same capabilities (size, checksums, header, patch, physical
//! path); the few places that care about the difference match on the enum.
//!
//! Files are values. Removing a header or moving a file to a new path
//! returns a new `File`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{Archive, ArchiveKind};
use crate::checksum::Checksums;
use crate::header::FileHeader;

/// A patch that can turn one ROM into another (applied by a separate step).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Patch {
    pub path: PathBuf,
    /// CRC32 of the ROM the patch applies to
    pub crc_before: String,
    /// CRC32 of the patched result, if the patch format records it
    pub crc_after: Option<String>,
    pub size_after: Option<u64>,
}

/// Size and checksums of a file's data once its header is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Headered {
    header: &'static FileHeader,
    size: u64,
    checksums: Checksums,
}

/// Properties every file kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileProps {
    size: u64,
    checksums: Checksums,
    headered: Option<Headered>,
    patch: Option<Arc<Patch>>,
}

impl FileProps {
    fn new(size: u64, checksums: Checksums) -> Self {
        Self {
            size,
            checksums,
            headered: None,
            patch: None,
        }
    }
}

/// A file directly on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawFile {
    path: PathBuf,
    props: FileProps,
}

/// One entry inside an archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveEntry {
    archive: Archive,
    entry_path: String,
    props: FileProps,
}

/// A whole archive to be copied or moved unmodified.
///
/// Its checksums are unknown until something hashes the archive file
/// itself, so a freshly made `ArchiveFile` carries none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveFile {
    archive: Archive,
    props: FileProps,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum File {
    Raw(RawFile),
    Entry(ArchiveEntry),
    Archive(ArchiveFile),
}

impl File {
    pub fn raw(path: impl Into<PathBuf>, size: u64, checksums: Checksums) -> Self {
        File::Raw(RawFile {
            path: path.into(),
            props: FileProps::new(size, checksums),
        })
    }

    pub fn entry(
        archive: Archive,
        entry_path: impl Into<String>,
        size: u64,
        checksums: Checksums,
    ) -> Self {
        File::Entry(ArchiveEntry {
            archive,
            entry_path: entry_path.into(),
            props: FileProps::new(size, checksums),
        })
    }

    /// A placeholder for an entire archive, not yet checksummed.
    pub fn archive_file(archive: Archive) -> Self {
        File::Archive(ArchiveFile {
            archive,
            props: FileProps::new(0, Checksums::new()),
        })
    }

    fn props(&self) -> &FileProps {
        match self {
            File::Raw(f) => &f.props,
            File::Entry(e) => &e.props,
            File::Archive(a) => &a.props,
        }
    }

    fn map_props(mut self, f: impl FnOnce(&mut FileProps)) -> Self {
        match &mut self {
            File::Raw(raw) => f(&mut raw.props),
            File::Entry(entry) => f(&mut entry.props),
            File::Archive(archive) => f(&mut archive.props),
        }
        self
    }

    /// Record a detected header and the checksums of the data behind it.
    pub fn with_header(
        self,
        header: &'static FileHeader,
        size_without_header: u64,
        checksums_without_header: Checksums,
    ) -> Self {
        self.map_props(|p| {
            p.headered = Some(Headered {
                header,
                size: size_without_header,
                checksums: checksums_without_header,
            })
        })
    }

    pub fn with_patch(self, patch: Patch) -> Self {
        self.map_props(|p| p.patch = Some(Arc::new(patch)))
    }

    pub fn with_size(self, size: u64) -> Self {
        self.map_props(|p| p.size = size)
    }

    pub fn with_checksums(self, checksums: Checksums) -> Self {
        self.map_props(|p| p.checksums = checksums)
    }

    /// Drop the detected header; the file is then treated as headerless and
    /// its own checksums are authoritative.
    pub fn forget_header(self) -> Self {
        self.map_props(|p| p.headered = None)
    }

    /// The file as it will look once the header is stripped.
    pub fn without_header(self) -> Self {
        self.map_props(|p| {
            if let Some(headered) = p.headered.take() {
                p.size = headered.size;
                p.checksums = headered.checksums;
            }
        })
    }

    pub fn size(&self) -> u64 {
        self.props().size
    }

    pub fn checksums(&self) -> &Checksums {
        &self.props().checksums
    }

    pub fn header(&self) -> Option<&'static FileHeader> {
        self.props().headered.as_ref().map(|h| h.header)
    }

    pub fn size_without_header(&self) -> u64 {
        match &self.props().headered {
            Some(h) => h.size,
            None => self.size(),
        }
    }

    pub fn checksums_without_header(&self) -> &Checksums {
        match &self.props().headered {
            Some(h) => &h.checksums,
            None => self.checksums(),
        }
    }

    pub fn patch(&self) -> Option<&Patch> {
        self.props().patch.as_deref()
    }

    /// The physical path: the file itself, or the archive holding it.
    pub fn file_path(&self) -> &Path {
        match self {
            File::Raw(f) => &f.path,
            File::Entry(e) => e.archive.path(),
            File::Archive(a) => a.archive.path(),
        }
    }

    pub fn archive(&self) -> Option<&Archive> {
        match self {
            File::Raw(_) => None,
            File::Entry(e) => Some(&e.archive),
            File::Archive(a) => Some(&a.archive),
        }
    }

    pub fn entry_path(&self) -> Option<&str> {
        match self {
            File::Entry(e) => Some(&e.entry_path),
            _ => None,
        }
    }

    pub fn is_archive_entry(&self) -> bool {
        matches!(self, File::Entry(_))
    }

    pub fn is_archive_file(&self) -> bool {
        matches!(self, File::Archive(_))
    }

    /// Base name used for display and sorting: the entry's own name for
    /// archive entries, otherwise the physical file name.
    pub fn file_name(&self) -> String {
        let name = match self {
            File::Entry(e) => Path::new(&e.entry_path).file_name(),
            _ => self.file_path().file_name(),
        };
        name.map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Same file at a different physical path. For archive members the
    /// archive is relocated; its kind follows the new extension when known.
    pub fn with_file_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match self {
            File::Raw(f) => File::Raw(RawFile { path, ..f }),
            File::Entry(e) => File::Entry(ArchiveEntry {
                archive: relocate(&e.archive, path),
                ..e
            }),
            File::Archive(a) => File::Archive(ArchiveFile {
                archive: relocate(&a.archive, path),
                ..a
            }),
        }
    }

    /// Rename an archive entry; other kinds are returned unchanged.
    pub fn with_entry_path(self, entry_path: impl Into<String>) -> Self {
        match self {
            File::Entry(e) => File::Entry(ArchiveEntry {
                entry_path: entry_path.into(),
                ..e
            }),
            other => other,
        }
    }

    /// Turn an archive entry into a placeholder for its whole archive.
    /// Header and patch information does not carry over.
    pub fn into_archive_file(self) -> Self {
        match self {
            File::Entry(e) => File::archive_file(e.archive),
            other => other,
        }
    }
}

fn relocate(archive: &Archive, path: PathBuf) -> Archive {
    let kind = ArchiveKind::from_path(&path).unwrap_or(archive.kind());
    Archive::new(path, kind)
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            File::Raw(raw) => write!(f, "{}", raw.path.display()),
            File::Entry(e) => write!(f, "{}|{}", e.archive.path().display(), e.entry_path),
            File::Archive(a) => write!(f, "{}", a.archive.path().display()),
        }
    }
}

#[cfg(test)]
#[path = "tests/file_tests.rs"]
mod tests;
