//! Turns a DAT and a set of scanned files into concrete write plans, and
//! carries them out.
//!
//! The flow is [`CandidateGenerator`] -> [`CandidatePipeline`] ->
//! [`CandidateWriter`], all configured by one [`Options`].

pub mod archive_io;
pub mod candidate;
pub mod candidate_generator;
pub mod error;
pub mod hash;
pub mod options;
pub mod output_factory;
pub mod pipeline;
pub mod writer;

pub use candidate::{Candidate, ParentCandidates, RomWithFiles};
pub use candidate_generator::CandidateGenerator;
pub use error::{ConfigError, OutputPathError, PipelineError, WriteError};
pub use options::{Command, FixExtension, GameSubdirMode, LinkMode, MergeMode, Options};
pub use output_factory::{OutputFactory, OutputPath};
pub use pipeline::{CandidatePipeline, CandidateStage, ChecksumProvider, FileChecksumProvider};
pub use writer::{CandidateWriter, WriteResult, WriteState, WriteSummary, WriterContext};
