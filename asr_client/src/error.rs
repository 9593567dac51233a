use std::time::Duration;

use asr_protocol::ProtocolError;
use thiserror::Error;

/// Failure categories reported to listeners and to `wait_result` callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Failure,
    SessionTimeout,
    ConnectionFailure,
    ActiveRecognition,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// The server answered a request with a non-SUCCESS result
    #[error("[{method}]: {code}{}", message_suffix(.message))]
    ProtocolFailure {
        method: String,
        code: String,
        message: String,
    },

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Recognition already active")]
    ActiveRecognition,

    #[error("Recognition timeout after {0:?}")]
    Timeout(Duration),

    #[error("Language model has neither a URI nor a grammar")]
    InvalidLanguageModel,

    #[error("Audio source error: {0}")]
    Audio(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl RecognitionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RecognitionError::ConnectionFailure(_) => ErrorCode::ConnectionFailure,
            RecognitionError::ActiveRecognition => ErrorCode::ActiveRecognition,
            RecognitionError::Timeout(_) => ErrorCode::SessionTimeout,
            _ => ErrorCode::Failure,
        }
    }
}

impl From<std::io::Error> for RecognitionError {
    fn from(err: std::io::Error) -> Self {
        RecognitionError::Audio(err.to_string())
    }
}

fn message_suffix(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_failure_message() {
        let err = RecognitionError::ProtocolFailure {
            method: "START_RECOGNITION".to_string(),
            code: "ERR_LM".to_string(),
            message: "Language model not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[START_RECOGNITION]: ERR_LM: Language model not found"
        );
        assert_eq!(err.code(), ErrorCode::Failure);

        let err = RecognitionError::ProtocolFailure {
            method: "CREATE_SESSION".to_string(),
            code: "ERR_LICENSE".to_string(),
            message: String::new(),
        };
        assert_eq!(err.to_string(), "[CREATE_SESSION]: ERR_LICENSE");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RecognitionError::Timeout(Duration::from_secs(1)).code(),
            ErrorCode::SessionTimeout
        );
        assert_eq!(
            RecognitionError::ConnectionFailure("refused".into()).code(),
            ErrorCode::ConnectionFailure
        );
        assert_eq!(ErrorCode::ActiveRecognition.to_string(), "ACTIVE_RECOGNITION");
    }
}
