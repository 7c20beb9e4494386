/// Errors that can occur while loading or checking a DAT.
#[derive(Debug, thiserror::Error)]
pub enum DatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid DAT file: {0}")]
    InvalidDat(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatError {
    pub fn invalid_dat(msg: impl Into<String>) -> Self {
        Self::InvalidDat(msg.into())
    }
}
