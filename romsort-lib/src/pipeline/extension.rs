use std::path::Path;
use std::sync::Arc;

use romsort_core::File;
use romsort_dat::Dat;

use super::CandidateStage;
use crate::candidate::{Candidate, ParentCandidates, RomWithFiles};
use crate::error::PipelineError;
use crate::options::{FixExtension, Options};

/// Gives outputs the extension of the file they are read from.
///
/// With `fix_extension = "auto"` only ROMs whose DAT name has no extension
/// are touched; with `"always"` any differing extension is replaced.
pub struct ExtensionCorrector {
    options: Arc<Options>,
}

impl ExtensionCorrector {
    pub fn new(options: Arc<Options>) -> Self {
        Self { options }
    }

    fn correct(&self, binding: RomWithFiles) -> RomWithFiles {
        let input = binding.input_file();
        if input.is_archive_file() {
            return binding;
        }
        let apply = match self.options.fix_extension {
            FixExtension::Never => false,
            FixExtension::Auto => binding.rom().extension().is_none(),
            FixExtension::Always => true,
        };
        if !apply {
            return binding;
        }
        let Some(ext) = extension(&input.file_name()) else {
            return binding;
        };

        let output = binding.output_file().clone();
        let corrected = match &output {
            File::Entry(_) => {
                let entry_path = output.entry_path().unwrap_or_default();
                match replace_extension(entry_path, &ext) {
                    Some(renamed) => output.with_entry_path(renamed),
                    None => return binding,
                }
            }
            _ => {
                let path = output.file_path().to_string_lossy().into_owned();
                match replace_extension(&path, &ext) {
                    Some(renamed) => output.with_file_path(renamed),
                    None => return binding,
                }
            }
        };
        binding.with_output_file(corrected)
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
}

/// `name` with its extension set to `ext`, or `None` if it already has it.
fn replace_extension(name: &str, ext: &str) -> Option<String> {
    match extension(name) {
        Some(current) if current.eq_ignore_ascii_case(ext) => None,
        Some(current) => Some(format!("{}{}", &name[..name.len() - current.len()], ext)),
        None => Some(format!("{name}.{ext}")),
    }
}

impl CandidateStage for ExtensionCorrector {
    fn name(&self) -> &'static str {
        "extension corrector"
    }

    fn process(
        &self,
        _dat: &Dat,
        candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError> {
        if self.options.fix_extension == FixExtension::Never {
            return Ok(candidates);
        }
        Ok(candidates
            .into_iter()
            .map(|parent| ParentCandidates {
                parent: parent.parent,
                candidates: parent
                    .candidates
                    .into_iter()
                    .map(|candidate| {
                        let bindings: Vec<RomWithFiles> = candidate
                            .roms_with_files()
                            .iter()
                            .cloned()
                            .map(|b| self.correct(b))
                            .collect();
                        Candidate::with_roms_with_files(candidate, bindings)
                    })
                    .collect(),
            })
            .collect())
    }
}
