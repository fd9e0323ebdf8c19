//! Command error types for the headless control protocol
//!
//! Provides structured errors that serialize to `{"code": "...", "message": "..."}`.

use serde::Serialize;
use veil_core::QueueError;

/// Errors returned by headless commands
///
/// Each variant serializes with a snake_case `code` field for client matching.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CommandError {
    // Validation errors
    InvalidCommand { message: String },
    InvalidInput { message: String },

    // Queue errors
    QueueFull { message: String, capacity: usize },
    QueueBusy { message: String },
    NothingToExport { message: String },

    // Configuration errors
    ProviderNotConfigured { message: String },

    // Operation errors
    StorageError { message: String },
    ExternalError { message: String },
    InternalError { message: String },
}

impl CommandError {
    pub fn invalid_command(command: &str) -> Self {
        Self::InvalidCommand {
            message: format!(
                "Unknown command '{command}'. Expected one of: add, start, stop, clear, status, jobs, export, save, ping, wait, quit"
            ),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn nothing_to_export() -> Self {
        Self::NothingToExport {
            message: "No completed documents to export".to_string(),
        }
    }

    pub fn provider_not_configured() -> Self {
        Self::ProviderNotConfigured {
            message: "No rewriting provider configured. Set GEMINI_API_KEY, ANTHROPIC_API_KEY or OPENAI_API_KEY, or pass --provider".to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidCommand { message }
            | Self::InvalidInput { message }
            | Self::QueueFull { message, .. }
            | Self::QueueBusy { message }
            | Self::NothingToExport { message }
            | Self::ProviderNotConfigured { message }
            | Self::StorageError { message }
            | Self::ExternalError { message }
            | Self::InternalError { message } => message,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for CommandError {}

impl From<QueueError> for CommandError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Capacity { capacity, .. } => Self::QueueFull {
                message: err.to_string(),
                capacity,
            },
            QueueError::State { .. } => Self::QueueBusy {
                message: err.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Result type alias for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Extension trait for converting Results to CommandResult
pub trait ResultExt<T> {
    fn storage_err(self) -> CommandResult<T>;
    fn external_err(self) -> CommandResult<T>;
    fn internal_err(self) -> CommandResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn storage_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::storage(e.to_string()))
    }

    fn external_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::external(e.to_string()))
    }

    fn internal_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::QueueState;

    #[test]
    fn test_serializes_code_and_message() {
        let err = CommandError::nothing_to_export();
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "code": "nothing_to_export",
                "message": "No completed documents to export"
            })
        );
    }

    #[test]
    fn test_queue_errors_map_to_codes() {
        let full: CommandError = QueueError::Capacity {
            current: 99,
            requested: 2,
            capacity: 100,
        }
        .into();
        assert!(matches!(full, CommandError::QueueFull { capacity: 100, .. }));
        assert!(full.message().contains("100"));

        let busy: CommandError = QueueError::State {
            state: QueueState::Stopping,
        }
        .into();
        let json = serde_json::to_value(&busy).unwrap();
        assert_eq!(json["code"], "queue_busy");
        assert!(busy.to_string().contains("stopping"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), std::fmt::Error> = Err(std::fmt::Error);
        assert!(matches!(
            result.external_err(),
            Err(CommandError::ExternalError { .. })
        ));
    }
}
