use std::io;
use thiserror::Error;

/// Core error type for tokenwright.
#[derive(Error, Debug)]
pub enum TokenwrightError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("encoding unavailable: {message}")]
    Encoding { message: String },

    #[error("no context for session '{session_id}', conversation '{conversation_id}'")]
    ContextNotFound {
        session_id: String,
        conversation_id: String,
    },

    #[error("template references missing variable(s): {}", missing.join(", "))]
    MalformedTemplate { missing: Vec<String> },

    #[error("store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TokenwrightError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    pub fn context_not_found(
        session_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self::ContextNotFound {
            session_id: session_id.into(),
            conversation_id: conversation_id.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error is caused by user input (vs internal/system).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::ContextNotFound { .. } | Self::MalformedTemplate { .. }
        )
    }

    /// Returns true if retrying the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Store { .. })
    }
}

pub type Result<T> = std::result::Result<T, TokenwrightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = TokenwrightError::config("bad value");
        assert_eq!(err.to_string(), "config error: bad value");
    }

    #[test]
    fn malformed_template_names_every_variable() {
        let err = TokenwrightError::MalformedTemplate {
            missing: vec!["audience".to_string(), "tone".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "template references missing variable(s): audience, tone"
        );
    }

    #[test]
    fn context_not_found_display() {
        let err = TokenwrightError::context_not_found("s1", "c1");
        assert_eq!(
            err.to_string(),
            "no context for session 's1', conversation 'c1'"
        );
    }

    #[test]
    fn user_error_classification() {
        assert!(TokenwrightError::validation("field", "bad").is_user_error());
        assert!(TokenwrightError::context_not_found("s", "c").is_user_error());
        assert!(TokenwrightError::MalformedTemplate { missing: vec![] }.is_user_error());
        assert!(!TokenwrightError::config("oops").is_user_error());
        assert!(!TokenwrightError::encoding("no vocab").is_user_error());
    }

    #[test]
    fn retryable_classification() {
        let io_err = TokenwrightError::io("read", io::Error::new(io::ErrorKind::Other, "timeout"));
        assert!(io_err.is_retryable());
        assert!(TokenwrightError::store("redis down").is_retryable());
        assert!(!TokenwrightError::config("nope").is_retryable());
    }
}
