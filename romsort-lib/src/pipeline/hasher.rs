use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use romsort_core::{ChecksumBitmask, Checksums, File};
use romsort_dat::Dat;

use super::CandidateStage;
use crate::archive_io;
use crate::candidate::{Candidate, ParentCandidates, RomWithFiles};
use crate::error::{PipelineError, WriteError};

/// Source of checksums for files that were not hashed during scanning.
pub trait ChecksumProvider: Send + Sync {
    fn checksums(&self, file: &File, bitmask: ChecksumBitmask) -> Result<(u64, Checksums), WriteError>;
}

/// Hashes files by reading them from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileChecksumProvider;

impl ChecksumProvider for FileChecksumProvider {
    fn checksums(&self, file: &File, bitmask: ChecksumBitmask) -> Result<(u64, Checksums), WriteError> {
        archive_io::hash_input(file, bitmask, 0)
    }
}

/// Fills in the size and checksums of whole-archive pass-through inputs.
///
/// Each archive is hashed once even when several bindings refer to it. A
/// candidate whose archive cannot be read is dropped.
pub struct ArchiveFileHasher {
    provider: Arc<dyn ChecksumProvider>,
    bitmask: ChecksumBitmask,
}

impl ArchiveFileHasher {
    pub fn new(provider: Arc<dyn ChecksumProvider>) -> Self {
        Self {
            provider,
            bitmask: ChecksumBitmask::CRC32 | ChecksumBitmask::SHA1,
        }
    }

    pub fn with_bitmask(mut self, bitmask: ChecksumBitmask) -> Self {
        self.bitmask = bitmask;
        self
    }

    fn hash_candidate(
        &self,
        candidate: &Candidate,
        cache: &mut HashMap<PathBuf, (u64, Checksums)>,
    ) -> Result<Vec<RomWithFiles>, WriteError> {
        let mut bindings = Vec::with_capacity(candidate.roms_with_files().len());
        for binding in candidate.roms_with_files() {
            let input = binding.input_file();
            if !input.is_archive_file() || !input.checksums().is_empty() {
                bindings.push(binding.clone());
                continue;
            }
            let path = input.file_path().to_path_buf();
            let (size, checksums) = match cache.get(&path) {
                Some(hashed) => hashed.clone(),
                None => {
                    let hashed = self.provider.checksums(input, self.bitmask)?;
                    cache.insert(path, hashed.clone());
                    hashed
                }
            };
            let input = input.clone().with_size(size).with_checksums(checksums.clone());
            let output = binding
                .output_file()
                .clone()
                .with_size(size)
                .with_checksums(checksums);
            bindings.push(binding.clone().with_input_file(input).with_output_file(output));
        }
        Ok(bindings)
    }
}

impl CandidateStage for ArchiveFileHasher {
    fn name(&self) -> &'static str {
        "archive file hasher"
    }

    fn process(
        &self,
        dat: &Dat,
        candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError> {
        let mut cache = HashMap::new();
        let mut output = Vec::with_capacity(candidates.len());
        for parent in candidates {
            let mut hashed = Vec::with_capacity(parent.candidates.len());
            for candidate in parent.candidates {
                match self.hash_candidate(&candidate, &mut cache) {
                    Ok(bindings) => hashed.push(candidate.with_roms_with_files(bindings)),
                    Err(e) => {
                        log::warn!("{}: {}: failed to hash archive: {}", dat.name, candidate.name(), e);
                    }
                }
            }
            output.push(ParentCandidates {
                parent: parent.parent,
                candidates: hashed,
            });
        }
        Ok(output)
    }
}
