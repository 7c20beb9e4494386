//! Post-processing of generated candidates.
//!
//! A [`CandidatePipeline`] is an ordered list of [`CandidateStage`]s. Each
//! stage takes the full candidate list for one DAT and returns a new one;
//! bindings are replaced, never edited in place. The first stage to return
//! an error stops the pipeline.
//!
//! Stages may touch the filesystem (hashing whole archives), so each one
//! runs on tokio's blocking pool.

mod combiner;
mod extension;
mod hasher;
mod validator;

use std::sync::Arc;

use romsort_dat::Dat;

use crate::candidate::ParentCandidates;
use crate::error::PipelineError;
use crate::options::Options;

pub use combiner::CandidateCombiner;
pub use extension::ExtensionCorrector;
pub use hasher::{ArchiveFileHasher, ChecksumProvider, FileChecksumProvider};
pub use validator::{CandidateValidator, MergeSplitValidator};

/// One post-processing step.
pub trait CandidateStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(
        &self,
        dat: &Dat,
        candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError>;
}

/// Runs stages in order, short-circuiting on the first error.
pub struct CandidatePipeline {
    stages: Vec<Arc<dyn CandidateStage>>,
}

impl CandidatePipeline {
    /// The standard stage order: extension correction, archive hashing,
    /// validation, merge/split checks, then combining.
    pub fn new(options: Arc<Options>, provider: Arc<dyn ChecksumProvider>) -> Self {
        Self {
            stages: vec![
                Arc::new(ExtensionCorrector::new(Arc::clone(&options))),
                Arc::new(ArchiveFileHasher::new(provider)),
                Arc::new(CandidateValidator),
                Arc::new(MergeSplitValidator::new(Arc::clone(&options))),
                Arc::new(CandidateCombiner::new(options)),
            ],
        }
    }

    pub fn with_stages(stages: Vec<Arc<dyn CandidateStage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(
        &self,
        dat: Arc<Dat>,
        mut candidates: Vec<ParentCandidates>,
    ) -> Result<Vec<ParentCandidates>, PipelineError> {
        for stage in &self.stages {
            let name = stage.name();
            let stage = Arc::clone(stage);
            let stage_dat = Arc::clone(&dat);
            let result =
                tokio::task::spawn_blocking(move || stage.process(&stage_dat, candidates))
                    .await
                    .map_err(|e| PipelineError::stage(name, e.to_string()))?;
            candidates = match result {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::error!("{}: {} failed: {}", dat.name, name, e);
                    return Err(e);
                }
            };
            log::trace!("{}: {} done", dat.name, name);
        }
        Ok(candidates)
    }
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
