use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a session failure.
///
/// Every kind is recoverable; callers decide how loudly to surface it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DetectorUnavailable,
    SourceOpen,
    RecordingOpen,
    ConfigParse,
    NothingToSave,
    Save,
    InvalidState,
}

/// Structured error reported at the session boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("failed to open {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("recording unavailable: {0}")]
    RecordingOpen(String),

    #[error("invalid config value for {field}: {reason}")]
    ConfigParse { field: &'static str, reason: String },

    #[error("nothing to save")]
    NothingToSave,

    #[error("save failed: {0}")]
    Save(String),

    #[error("{operation} is not valid while {mode}")]
    InvalidState {
        operation: &'static str,
        mode: &'static str,
    },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DetectorUnavailable(_) => ErrorKind::DetectorUnavailable,
            SessionError::SourceOpen { .. } => ErrorKind::SourceOpen,
            SessionError::RecordingOpen(_) => ErrorKind::RecordingOpen,
            SessionError::ConfigParse { .. } => ErrorKind::ConfigParse,
            SessionError::NothingToSave => ErrorKind::NothingToSave,
            SessionError::Save(_) => ErrorKind::Save,
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    pub(crate) fn source_open(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        SessionError::SourceOpen {
            path: path.into(),
            reason: format!("{:#}", err),
        }
    }

    pub(crate) fn recording(err: &anyhow::Error) -> Self {
        SessionError::RecordingOpen(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        let err = SessionError::source_open("missing.png", &anyhow::anyhow!("no such file"));
        assert_eq!(err.kind(), ErrorKind::SourceOpen);
        assert_eq!(err.to_string(), "failed to open missing.png: no such file");

        let err = SessionError::InvalidState {
            operation: "pause",
            mode: "idle",
        };
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), "pause is not valid while idle");
    }
}
