use std::path::PathBuf;
use std::sync::Arc;

use romsort_core::{Archive, ArchiveKind};
use romsort_dat::{Dat, Game, Rom};

use super::CandidateStage;
use crate::candidate::{Candidate, ParentCandidates, RomWithFiles};
use crate::error::PipelineError;
use crate::options::Options;
use crate::output_factory::sanitize;

/// Folds every candidate of a DAT into a single zip named after the DAT,
/// with each game's files under a directory named after the game.
///
/// Only active when zipping with `single_archive` set. Bindings that are
/// not zip entries (whole-archive copies) are carried over unchanged.
pub struct CandidateCombiner {
    options: Arc<Options>,
}

impl CandidateCombiner {
    pub fn new(options: Arc<Options>) -> Self {
        Self { options }
    }

    /// Directory of the first zip any candidate writes to.
    fn zip_dir(candidates: &[ParentCandidates]) -> Option<PathBuf> {
        candidates
            .iter()
            .flat_map(|p| &p.candidates)
            .flat_map(|c| c.roms_with_files())
            .map(|b| b.output_file())
            .find(|f| f.is_archive_entry())
            .map(|f| {
                f.file_path()
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            })
    }

    fn combine(&self, dat: &Dat, dir: PathBuf, candidates: Vec<ParentCandidates>) -> Candidate {
        let all: Vec<Candidate> = candidates.into_iter().flat_map(|p| p.candidates).collect();
        let zip_path = dir.join(format!("{}.zip", sanitize(&dat.name)));

        let mut game = Game::new(dat.name.clone());
        let mut bindings = Vec::new();
        for candidate in &all {
            let prefix = sanitize(candidate.name());
            for binding in candidate.roms_with_files() {
                let rom = Rom {
                    name: format!("{}/{}", prefix, binding.rom().name),
                    ..binding.rom().clone()
                };
                game = game.with_rom(rom.clone());

                let output = binding.output_file();
                let output = match output.entry_path() {
                    Some(entry) => romsort_core::File::entry(
                        Archive::new(&zip_path, ArchiveKind::Zip),
                        format!("{prefix}/{entry}"),
                        output.size(),
                        output.checksums().clone(),
                    ),
                    None => output.clone(),
                };
                bindings.push(RomWithFiles::new(rom, binding.input_file().clone(), output));
            }
        }

        Candidate::new(Arc::new(game), None, bindings)
    }
}

impl CandidateStage for CandidateCombiner {
    fn name(&self) -> &'static str {
        "candidate combiner"
    }

    fn process(
        &self,
        dat: &Dat,
        candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError> {
        if !self.options.single_archive || !self.options.should_zip() {
            return Ok(candidates);
        }
        let Some(dir) = Self::zip_dir(&candidates) else {
            return Ok(candidates);
        };
        let combined = self.combine(dat, dir, candidates);
        Ok(vec![ParentCandidates {
            parent: dat.name.clone(),
            candidates: vec![combined],
        }])
    }
}
