use std::collections::HashMap;
use std::path::{Path, PathBuf};

use romsort_core::{ChecksumAlgorithm, ChecksumBitmask, Checksums, File};

use crate::dat::Rom;

/// Lookup key for one checksum of one file size.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChecksumKey {
    algorithm: ChecksumAlgorithm,
    value: String,
    size: u64,
}

/// An indexed view of the scanned input files for fast ROM lookups.
///
/// Built once per run and read-only afterwards, so it can be shared freely
/// between concurrent game-processing tasks.
#[derive(Debug, Default)]
pub struct IndexedFiles {
    /// Backing store, in scan order
    files: Vec<File>,
    /// (algorithm, value, size) → file indices
    by_checksum: HashMap<ChecksumKey, Vec<usize>>,
    /// size → (algorithms a file has, file indices), for files that can only
    /// be matched by size against ROMs sharing none of their algorithms
    by_size: HashMap<u64, Vec<(ChecksumBitmask, Vec<usize>)>>,
    /// physical path → every file at that path (all entries of an archive)
    by_path: HashMap<PathBuf, Vec<File>>,
}

impl IndexedFiles {
    /// Build the index from scanned files, preserving their order.
    pub fn from_files(files: Vec<File>) -> Self {
        let mut index = Self::default();

        for (i, file) in files.iter().enumerate() {
            index.insert(i, file.size(), file.checksums());
            if file.header().is_some() {
                index.insert(i, file.size_without_header(), file.checksums_without_header());
            }
            index
                .by_path
                .entry(file.file_path().to_path_buf())
                .or_default()
                .push(file.clone());
        }

        index.files = files;
        index
    }

    fn insert(&mut self, i: usize, size: u64, checksums: &Checksums) {
        for algorithm in ChecksumAlgorithm::ALL {
            if let Some(value) = checksums.get(algorithm) {
                let key = ChecksumKey {
                    algorithm,
                    value: value.to_string(),
                    size,
                };
                self.by_checksum.entry(key).or_default().push(i);
            }
        }

        let mask = checksums.bitmask();
        let groups = self.by_size.entry(size).or_default();
        match groups.iter_mut().find(|(m, _)| *m == mask) {
            Some((_, indices)) => indices.push(i),
            None => groups.push((mask, vec![i])),
        }
    }

    /// All input files that satisfy `rom`, in scan order.
    ///
    /// A file matches when its size is equal and every checksum algorithm
    /// present on both sides agrees. A headered file also matches through
    /// its headerless size and checksums.
    pub fn find_files(&self, rom: &Rom) -> Option<Vec<File>> {
        let rom_mask = rom.checksums.bitmask();
        let mut hits: Vec<usize> = Vec::new();

        for algorithm in rom_mask.algorithms() {
            if let Some(value) = rom.checksums.get(algorithm) {
                let key = ChecksumKey {
                    algorithm,
                    value: value.to_string(),
                    size: rom.size,
                };
                if let Some(indices) = self.by_checksum.get(&key) {
                    hits.extend_from_slice(indices);
                }
            }
        }

        if let Some(groups) = self.by_size.get(&rom.size) {
            for (mask, indices) in groups {
                if !mask.intersects(rom_mask) {
                    hits.extend_from_slice(indices);
                }
            }
        }

        hits.sort_unstable();
        hits.dedup();

        let files: Vec<File> = hits
            .into_iter()
            .map(|i| &self.files[i])
            .filter(|file| Self::file_matches(rom, file))
            .cloned()
            .collect();

        if files.is_empty() { None } else { Some(files) }
    }

    fn file_matches(rom: &Rom, file: &File) -> bool {
        rom.matches(file.size(), file.checksums())
            || (file.header().is_some()
                && rom.matches(file.size_without_header(), file.checksums_without_header()))
    }

    /// Every file grouped by the physical path it lives at.
    pub fn files_by_file_path(&self) -> &HashMap<PathBuf, Vec<File>> {
        &self.by_path
    }

    /// Every file (or archive entry) at `path`.
    pub fn files_at(&self, path: &Path) -> &[File] {
        self.by_path.get(path).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/indexed_files_tests.rs"]
mod tests;
