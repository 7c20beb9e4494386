use std::path::PathBuf;

use thiserror::Error;

use romsort_core::ArchiveKind;

/// Errors raised while loading or validating [`Options`](crate::Options).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid options file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A combination of options that cannot be honored together
    #[error("Invalid options: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Errors raised while computing an output path for one ROM.
///
/// These are per-ROM: the generator logs them and treats the ROM as unbound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputPathError {
    #[error("failed to replace token {token} in output template '{template}'")]
    UnresolvedToken { token: String, template: String },

    #[error("invalid output path: {0}")]
    InvalidPath(String),
}

impl OutputPathError {
    pub fn unresolved(token: impl Into<String>, template: impl Into<String>) -> Self {
        Self::UnresolvedToken {
            token: token.into(),
            template: template.into(),
        }
    }

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }
}

/// Errors raised while writing or verifying one output.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Reading from this archive format is not supported
    #[error("Unsupported archive {} ({kind:?})", path.display())]
    UnsupportedArchive { path: PathBuf, kind: ArchiveKind },

    #[error("Entry '{entry}' not found in {}", archive.display())]
    MissingEntry { archive: PathBuf, entry: String },

    #[error("Verification failed for {}: expected {expected}, got {actual}", path.display())]
    Verification {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Gave up on {} after {attempts} attempts", path.display())]
    RetriesExhausted { path: PathBuf, attempts: u32 },

    /// A write task panicked or was cancelled
    #[error("Write task failed: {0}")]
    Task(String),
}

impl WriteError {
    pub fn unsupported(path: impl Into<PathBuf>, kind: ArchiveKind) -> Self {
        Self::UnsupportedArchive {
            path: path.into(),
            kind,
        }
    }

    pub fn missing_entry(archive: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self::MissingEntry {
            archive: archive.into(),
            entry: entry.into(),
        }
    }
}

/// Errors raised by candidate post-processing stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Two or more candidates would write different content to one path
    #[error("{} conflicting output path(s): {}", conflicts.len(), conflicts.join(", "))]
    Validation { conflicts: Vec<String> },

    #[error("{stage}: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },
}

impl PipelineError {
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }
}
