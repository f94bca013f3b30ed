use thiserror::Error;

/// Failures that cross an adapter boundary. Every variant carries a human
/// readable cause so it can be turned into a single log line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("unsupported url: {0}")]
    UrlUnsupported(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("authorization failed: {0}")]
    Token(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl ChatError {
    pub fn is_token(&self) -> bool {
        matches!(self, ChatError::Token(_))
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
