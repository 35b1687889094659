//! Error types for the onboarding service.
//!
//! [`SettingsError`] covers loading the service's own TOML settings.
//! [`OnboardError`] is the taxonomy every component reports through and
//! the HTTP layer maps to status codes.

use std::time::Duration;

/// Errors raised while reading or validating the settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The file is not valid TOML or does not match the settings schema.
    #[error("Failed to parse settings TOML: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    /// The settings file could not be read from disk.
    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        source: std::io::Error,
        path: String,
    },

    /// The file parsed but carries values the service cannot run with.
    #[error("Settings validation error: {message}")]
    Validation { message: String },
}

/// Component failures surfaced by configuration, registry and task operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum OnboardError {
    /// A caller-supplied value was missing, empty or not permitted.
    #[error("invalid request: {message}")]
    Validation { message: String },

    /// A remote collaborator (configuration source, registry) was unreachable
    /// or answered with something unusable.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The external build process could not be spawned or failed.
    #[error("{message}")]
    Process { message: String },

    /// The external build process exceeded its wall-clock budget and was killed.
    #[error("task '{task}' timed out after {secs}s")]
    Timeout { task: String, secs: u64 },

    /// A named resource does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Anything unexpected. The message is logged, never sent to clients.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl OnboardError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn timeout(task: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            task: task.into(),
            secs: after.as_secs(),
        }
    }

    /// Classify a [`reqwest::Error`] as a transport failure with a readable message.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else if let Some(status) = err.status() {
            format!("remote returned HTTP {}", status.as_u16())
        } else if err.is_decode() {
            "malformed response body".to_string()
        } else {
            err.to_string()
        };
        Self::Transport { message }
    }

    /// Short category name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Transport { .. } => "transport",
            Self::Process { .. } => "process",
            Self::Timeout { .. } => "timeout",
            Self::NotFound { .. } => "not_found",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<reqwest::Error> for OnboardError {
    fn from(err: reqwest::Error) -> Self {
        Self::classify_reqwest(&err)
    }
}

/// Result alias for component operations.
pub type Result<T> = std::result::Result<T, OnboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(OnboardError::validation("x").kind(), "validation");
        assert_eq!(OnboardError::transport("x").kind(), "transport");
        assert_eq!(OnboardError::process("x").kind(), "process");
        assert_eq!(OnboardError::not_found("x").kind(), "not_found");
        assert_eq!(OnboardError::internal("x").kind(), "internal");
        assert_eq!(
            OnboardError::timeout("test", Duration::from_secs(3)).kind(),
            "timeout"
        );
    }

    #[test]
    fn test_display_messages() {
        let err = OnboardError::timeout("test", Duration::from_secs(600));
        assert_eq!(err.to_string(), "task 'test' timed out after 600s");

        let err = OnboardError::process("task failed with exit code 1");
        assert_eq!(err.to_string(), "task failed with exit code 1");

        let err = OnboardError::transport("connection failed");
        assert_eq!(err.to_string(), "transport error: connection failed");
    }

    #[test]
    fn test_settings_parse_error_from_toml() {
        let err: SettingsError = toml::from_str::<toml::Table>("not = = toml")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Failed to parse settings TOML"));
    }
}
