//! Error types for transcription scoring

use std::fmt;

/// Custom error type for note extraction, scoring and similarity building
#[derive(Debug, Clone)]
pub enum EvalError {
    /// E001: Malformed intervals, mismatched array lengths, bad tolerances
    InvalidInput(String),
    /// E002: Family table or configuration missing or malformed
    Configuration(String),
    /// E003: Note container could not be parsed
    MidiParse(String),
    /// E004: File I/O error
    Io(String),
    /// E005: Similarity corpus or feature vectors unusable
    Similarity(String),
    /// E006: Report or matrix serialization error
    Serialization(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::InvalidInput(msg) => write!(f, "E001: Invalid input - {}", msg),
            EvalError::Configuration(msg) => write!(f, "E002: Configuration error - {}", msg),
            EvalError::MidiParse(msg) => write!(f, "E003: MIDI parse error - {}", msg),
            EvalError::Io(msg) => write!(f, "E004: File I/O error - {}", msg),
            EvalError::Similarity(msg) => write!(f, "E005: Similarity error - {}", msg),
            EvalError::Serialization(msg) => write!(f, "E006: Serialization error - {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<std::io::Error> for EvalError {
    fn from(err: std::io::Error) -> Self {
        EvalError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<midly::Error> for EvalError {
    fn from(err: midly::Error) -> Self {
        EvalError::MidiParse(err.to_string())
    }
}

impl From<hound::Error> for EvalError {
    fn from(err: hound::Error) -> Self {
        EvalError::Io(format!("WAV error: {}", err))
    }
}

/// Result type alias for scoring operations
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_code() {
        let err = EvalError::InvalidInput("ref_pitches has 2 rows, expected 3".to_string());
        assert_eq!(
            err.to_string(),
            "E001: Invalid input - ref_pitches has 2 rows, expected 3"
        );
        let err = EvalError::Configuration("family table empty".to_string());
        assert!(err.to_string().starts_with("E002"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.mid");
        let err: EvalError = io.into();
        assert!(matches!(err, EvalError::Io(_)));
    }
}
