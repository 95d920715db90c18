use std::sync::Arc;

use thiserror::Error;

use crate::model::RemovalSummary;

#[derive(Error, Debug, Clone)]
pub enum TarstowError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("Directory Walk Error: {0}")]
    Walk(#[from] Arc<walkdir::Error>),

    #[error("JSON Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Aborted: {0}")]
    UserAbort(String),

    #[error("Source code detected, manual compilation required ({})", .0.join(", "))]
    SourceDetected(Vec<String>),

    #[error("Environment Error: {0}")]
    Environment(String),

    #[error("Unsupported archive type: {0}")]
    UnsupportedArchive(String),

    #[error("Extraction Error: {0}")]
    Extraction(String),

    #[error("Installation Error: {0}")]
    InstallError(String),

    #[error("Uninstall incomplete: {} item(s) could not be removed", .0.failed.len())]
    PartialFailure(RemovalSummary),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Parsing Error in {0}: {1}")]
    ParseError(&'static str, String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl TarstowError {
    /// Process exit status used by the command line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            TarstowError::UserAbort(_) => 2,
            TarstowError::SourceDetected(_) => 3,
            TarstowError::NotFound(_) => 4,
            TarstowError::PartialFailure(_) => 5,
            _ => 1,
        }
    }

    /// True for outcomes the operator chose or policy forced, as opposed to
    /// something going wrong.
    pub fn is_deliberate_stop(&self) -> bool {
        matches!(
            self,
            TarstowError::UserAbort(_) | TarstowError::SourceDetected(_)
        )
    }
}

impl From<std::io::Error> for TarstowError {
    fn from(err: std::io::Error) -> Self {
        TarstowError::Io(Arc::new(err))
    }
}

impl From<walkdir::Error> for TarstowError {
    fn from(err: walkdir::Error) -> Self {
        TarstowError::Walk(Arc::new(err))
    }
}

impl From<serde_json::Error> for TarstowError {
    fn from(err: serde_json::Error) -> Self {
        TarstowError::Json(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, TarstowError>;
