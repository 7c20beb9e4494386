//! Reading and writing archive contents.
//!
//! Only zip is handled natively (via the `zip` crate). Other archive kinds
//! can be listed by a scanner and passed through whole, but reading their
//! entries reports [`WriteError::UnsupportedArchive`].

use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use romsort_core::{Archive, ArchiveKind, ChecksumBitmask, Checksums, File};

use crate::error::WriteError;
use crate::hash;

/// One entry to put into a new zip.
#[derive(Debug, Clone, Copy)]
pub struct ZipSource<'a> {
    pub input: &'a File,
    pub entry_path: &'a str,
    /// Header bytes to drop from the start of the input
    pub skip: u64,
}

fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<fs::File>>, WriteError> {
    let file = fs::File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// List a zip's file entries with their sizes and CRC32s from the central
/// directory, without decompressing anything.
pub fn list_entries(archive: &Archive) -> Result<Vec<File>, WriteError> {
    if archive.kind() != ArchiveKind::Zip {
        return Err(WriteError::unsupported(archive.path(), archive.kind()));
    }
    let mut zip = open_zip(archive.path())?;
    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip.by_index_raw(i)?;
        if entry.is_dir() {
            continue;
        }
        let checksums = Checksums::new().with_crc32(format!("{:08x}", entry.crc32()));
        entries.push(File::entry(
            archive.clone(),
            entry.name(),
            entry.size(),
            checksums,
        ));
    }
    Ok(entries)
}

fn skip_bytes(reader: &mut dyn Read, skip: u64) -> io::Result<()> {
    if skip == 0 {
        return Ok(());
    }
    let skipped = io::copy(&mut (&mut *reader).take(skip), &mut io::sink())?;
    if skipped < skip {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("input shorter than its {skip} byte header"),
        ));
    }
    Ok(())
}

/// Run `f` over the bytes of `file` after dropping the first `skip` bytes.
///
/// Raw files and whole archives are read from disk; archive entries are
/// streamed out of their archive.
pub fn with_reader<T>(
    file: &File,
    skip: u64,
    f: impl FnOnce(&mut dyn Read) -> io::Result<T>,
) -> Result<T, WriteError> {
    match file {
        File::Raw(_) | File::Archive(_) => {
            let mut reader = BufReader::new(fs::File::open(file.file_path())?);
            skip_bytes(&mut reader, skip)?;
            Ok(f(&mut reader)?)
        }
        File::Entry(_) => {
            let archive = file
                .archive()
                .ok_or_else(|| WriteError::Task(format!("{file} has no archive")))?;
            let entry_path = file.entry_path().unwrap_or_default();
            if archive.kind() != ArchiveKind::Zip {
                return Err(WriteError::unsupported(archive.path(), archive.kind()));
            }
            let mut zip = open_zip(archive.path())?;
            let mut entry = match zip.by_name(entry_path) {
                Ok(entry) => entry,
                Err(ZipError::FileNotFound) => {
                    return Err(WriteError::missing_entry(archive.path(), entry_path));
                }
                Err(e) => return Err(e.into()),
            };
            skip_bytes(&mut entry, skip)?;
            Ok(f(&mut entry)?)
        }
    }
}

/// Write the contents of `input` (minus `skip` header bytes) to `dest`.
pub fn extract_to(input: &File, skip: u64, dest: &Path) -> Result<u64, WriteError> {
    with_reader(input, skip, |reader| {
        let mut out = fs::File::create(dest)?;
        io::copy(reader, &mut out)
    })
}

/// Hash the contents of `input` after `skip` header bytes.
pub fn hash_input(
    input: &File,
    bitmask: ChecksumBitmask,
    skip: u64,
) -> Result<(u64, Checksums), WriteError> {
    with_reader(input, skip, |reader| hash::hash_reader(reader, bitmask, 0))
}

pub(crate) fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Create a zip at `dest` holding `sources`, ordered by entry path.
///
/// The zip is assembled next to `dest` and renamed into place, so a failed
/// write never leaves a truncated archive at the final path.
pub fn write_zip(dest: &Path, sources: &[ZipSource<'_>]) -> Result<(), WriteError> {
    let mut sorted: Vec<&ZipSource<'_>> = sources.iter().collect();
    sorted.sort_by(|a, b| a.entry_path.cmp(b.entry_path));

    let tmp = temp_path(dest);
    let result = (|| -> Result<(), WriteError> {
        let mut writer = ZipWriter::new(fs::File::create(&tmp)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for source in sorted {
            writer.start_file(source.entry_path, options)?;
            with_reader(source.input, source.skip, |reader| {
                io::copy(reader, &mut writer)
            })?;
        }
        writer.finish()?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&tmp, dest)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
#[path = "tests/archive_io_tests.rs"]
mod tests;
