use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use romsort_dat::Dat;

use super::CandidateStage;
use crate::candidate::ParentCandidates;
use crate::error::PipelineError;
use crate::options::{MergeMode, Options};

/// Rejects a DAT's candidates when two of them would write different inputs
/// to the same output.
///
/// Any conflict fails the whole DAT, not just the candidates involved.
pub struct CandidateValidator;

impl CandidateValidator {
    /// Output locations claimed by more than one distinct input.
    pub fn conflicts(candidates: &[ParentCandidates]) -> Vec<String> {
        let mut by_output: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for candidate in candidates.iter().flat_map(|p| &p.candidates) {
            for binding in candidate.roms_with_files() {
                by_output
                    .entry(binding.output_file().to_string())
                    .or_default()
                    .insert(binding.input_file().to_string());
            }
        }
        by_output
            .into_iter()
            .filter(|(_, inputs)| inputs.len() > 1)
            .map(|(output, inputs)| {
                format!(
                    "{output} <- {}",
                    inputs.into_iter().collect::<Vec<_>>().join(", ")
                )
            })
            .collect()
    }
}

impl CandidateStage for CandidateValidator {
    fn name(&self) -> &'static str {
        "candidate validator"
    }

    fn process(
        &self,
        _dat: &Dat,
        candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError> {
        let conflicts = Self::conflicts(&candidates);
        if conflicts.is_empty() {
            Ok(candidates)
        } else {
            Err(PipelineError::Validation { conflicts })
        }
    }
}

/// Warns when a merged set cannot be complete because games of a parent
/// group produced no candidate. Never drops anything.
pub struct MergeSplitValidator {
    options: Arc<Options>,
}

impl MergeSplitValidator {
    pub fn new(options: Arc<Options>) -> Self {
        Self { options }
    }

    /// `(parent, missing game)` pairs for groups that would be incomplete.
    pub fn missing_games(dat: &Dat, candidates: &[ParentCandidates]) -> Vec<(String, String)> {
        let produced: HashSet<&str> = candidates
            .iter()
            .flat_map(|p| &p.candidates)
            .map(|c| c.game().name.as_str())
            .collect();

        let mut missing = Vec::new();
        for parent in dat.parents().into_iter().filter(|p| p.games.len() > 1) {
            let any = parent.games.iter().any(|g| produced.contains(g.name.as_str()));
            if !any {
                continue;
            }
            for game in &parent.games {
                if !produced.contains(game.name.as_str()) {
                    missing.push((parent.name.clone(), game.name.clone()));
                }
            }
        }
        missing
    }
}

impl CandidateStage for MergeSplitValidator {
    fn name(&self) -> &'static str {
        "merge/split validator"
    }

    fn process(
        &self,
        dat: &Dat,
        candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError> {
        if self.options.merge_roms != MergeMode::Merged {
            return Ok(candidates);
        }
        for (parent, game) in Self::missing_games(dat, &candidates) {
            log::warn!(
                "{}: {}: merged set is missing {}",
                dat.name,
                parent,
                game
            );
        }
        Ok(candidates)
    }
}
