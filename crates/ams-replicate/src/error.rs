//! Error types for the replication library.

use thiserror::Error;

/// Main error type for replication operations.
#[derive(Error, Debug)]
pub enum ReplicateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential acquisition failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Management API returned an error response
    #[error("Management API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Storage API returned an error response
    #[error("Storage error during {operation} ({status}): {message}")]
    Storage {
        operation: String,
        status: u16,
        message: String,
    },

    /// SAS credential could not be generated
    #[error("SAS generation failed: {0}")]
    Sas(String),

    /// Blob transfer failed hard for a specific blob
    #[error("Transfer failed for blob {blob}: {message}")]
    Transfer { blob: String, message: String },

    /// External bulk-copy tool failed or produced unusable output
    #[error("Bulk copy error: {0}")]
    BulkCopy(String),

    /// A bounded wait expired
    #[error("Timed out after {seconds}s waiting for {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// The run finished but some items failed; details are in the report
    #[error("Replication completed with {0} failure(s)")]
    Partial(usize),

    /// Replication was cancelled (SIGINT, etc.)
    #[error("Replication cancelled")]
    Cancelled,

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// IO error (file operations, subprocess pipes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML deserialization error (blob listing responses)
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),
}

impl ReplicateError {
    /// Create a Storage error with the operation it occurred in.
    pub fn storage(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ReplicateError::Storage {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a Transfer error.
    pub fn transfer(blob: impl Into<String>, message: impl Into<String>) -> Self {
        ReplicateError::Transfer {
            blob: blob.into(),
            message: message.into(),
        }
    }

    /// Create a Timeout error.
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        ReplicateError::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Map the error class to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReplicateError::Config(_) | ReplicateError::Auth(_) => 2,
            ReplicateError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicateError>;
