//! Core value types shared by the DAT model and the candidate pipeline:
//! checksums, ROM headers, archives and the input/output [`File`] sum type.

pub mod archive;
pub mod checksum;
pub mod file;
pub mod header;
pub mod util;

pub use archive::{Archive, ArchiveKind};
pub use checksum::{ChecksumAlgorithm, ChecksumBitmask, Checksums};
pub use file::{ArchiveEntry, ArchiveFile, File, Patch, RawFile};
pub use header::FileHeader;
