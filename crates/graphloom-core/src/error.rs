//! Error types for graphloom operations.
//!
//! This module provides a structured error hierarchy with error codes
//! and a transient/permanent split that drives retry policy.

use thiserror::Error;

/// Result type alias for graphloom operations.
pub type GraphloomResult<T> = Result<T, GraphloomError>;

/// Main error type for all graphloom operations.
#[derive(Error, Debug)]
pub enum GraphloomError {
    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
    },

    /// Per-chunk extraction failed (after any retries).
    #[error("Extraction error: {message}")]
    Extraction {
        message: String,
        code: ErrorCode,
        chunk_id: Option<String>,
    },

    /// The extraction oracle call itself failed.
    #[error("Oracle error: {message}")]
    Oracle {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Graph storage backend failed.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Workflow checkpoint store failed.
    #[error("Checkpoint error: {message}")]
    Checkpoint {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Workflow execution failed.
    #[error("Workflow error: {message}")]
    Workflow {
        message: String,
        code: ErrorCode,
        step_id: Option<String>,
    },

    /// Pipeline run not found.
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Waiting on a run exceeded the caller's timeout.
    #[error("Timed out waiting for run {run_id}")]
    AwaitTimeout { run_id: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        code: ErrorCode,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation (VAL_xxx)
    ValInvalidInput,
    ValEmptyChunks,
    ValChunkTooLong,

    // Extraction (EXT_xxx)
    ExtExhaustedRetries,
    ExtMalformedInput,

    // Oracle (ORC_xxx)
    OrcTimeout,
    OrcRateLimited,
    OrcConnectionFailed,
    OrcInvalidResponse,

    // Storage (STO_xxx)
    StoUnavailable,
    StoOperationFailed,

    // Checkpoint (CKP_xxx)
    CkpOperationFailed,
    CkpNotFound,

    // Workflow (WFL_xxx)
    WflStepFailed,
    WflNotResumable,
    WflConfirmationExpired,
    WflCancelled,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseMissingField,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValEmptyChunks => "VAL_002",
            ErrorCode::ValChunkTooLong => "VAL_003",
            ErrorCode::ExtExhaustedRetries => "EXT_001",
            ErrorCode::ExtMalformedInput => "EXT_002",
            ErrorCode::OrcTimeout => "ORC_001",
            ErrorCode::OrcRateLimited => "ORC_002",
            ErrorCode::OrcConnectionFailed => "ORC_003",
            ErrorCode::OrcInvalidResponse => "ORC_004",
            ErrorCode::StoUnavailable => "STO_001",
            ErrorCode::StoOperationFailed => "STO_002",
            ErrorCode::CkpOperationFailed => "CKP_001",
            ErrorCode::CkpNotFound => "CKP_002",
            ErrorCode::WflStepFailed => "WFL_001",
            ErrorCode::WflNotResumable => "WFL_002",
            ErrorCode::WflConfirmationExpired => "WFL_003",
            ErrorCode::WflCancelled => "WFL_004",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseMissingField => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl GraphloomError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
        }
    }

    /// Create a validation error with a specific code.
    pub fn validation_with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::Validation {
            message: message.into(),
            code,
        }
    }

    /// Create an extraction error for a chunk.
    pub fn extraction(message: impl Into<String>, chunk_id: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            code: ErrorCode::ExtExhaustedRetries,
            chunk_id: Some(chunk_id.into()),
        }
    }

    /// Create an oracle timeout error.
    pub fn oracle_timeout(message: impl Into<String>) -> Self {
        Self::Oracle {
            message: message.into(),
            code: ErrorCode::OrcTimeout,
            source: None,
        }
    }

    /// Create an oracle rate-limit error.
    pub fn oracle_rate_limited(message: impl Into<String>) -> Self {
        Self::Oracle {
            message: message.into(),
            code: ErrorCode::OrcRateLimited,
            source: None,
        }
    }

    /// Create a transient oracle connection error.
    pub fn oracle_unavailable(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Oracle {
            message: message.into(),
            code: ErrorCode::OrcConnectionFailed,
            source,
        }
    }

    /// Create a generic oracle error (non-retryable).
    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle {
            message: message.into(),
            code: ErrorCode::OrcInvalidResponse,
            source: None,
        }
    }

    /// Create a retryable storage-unavailable error.
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoUnavailable,
            source: None,
        }
    }

    /// Create a permanent storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoOperationFailed,
            source: None,
        }
    }

    /// Create a checkpoint store error.
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
            code: ErrorCode::CkpOperationFailed,
            source: None,
        }
    }

    /// Create a workflow step failure.
    pub fn workflow_step(message: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self::Workflow {
            message: message.into(),
            code: ErrorCode::WflStepFailed,
            step_id: Some(step_id.into()),
        }
    }

    /// Create a workflow error with a specific code.
    pub fn workflow(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::Workflow {
            message: message.into(),
            code,
            step_id: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::Extraction { code, .. } => *code,
            Self::Oracle { code, .. } => *code,
            Self::Storage { code, .. } => *code,
            Self::Checkpoint { code, .. } => *code,
            Self::Workflow { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this failure is transient and worth retrying with backoff.
    ///
    /// Oracle timeouts and rate limits are transient, as is a storage
    /// backend reporting itself unavailable. Malformed input and parse
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::OrcTimeout
                | ErrorCode::OrcRateLimited
                | ErrorCode::OrcConnectionFailed
                | ErrorCode::StoUnavailable
        )
    }
}

impl From<rusqlite::Error> for GraphloomError {
    fn from(err: rusqlite::Error) -> Self {
        // SQLITE_BUSY / SQLITE_LOCKED mean the backend may recover; every
        // other SQLite failure is treated as permanent.
        let transient = matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        );
        Self::Storage {
            message: err.to_string(),
            code: if transient {
                ErrorCode::StoUnavailable
            } else {
                ErrorCode::StoOperationFailed
            },
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = GraphloomError::validation("bad input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(GraphloomError::oracle_timeout("slow").is_transient());
        assert!(GraphloomError::oracle_rate_limited("429").is_transient());
        assert!(GraphloomError::storage_unavailable("busy").is_transient());
        assert!(!GraphloomError::oracle("garbage output").is_transient());
        assert!(!GraphloomError::parse("not json").is_transient());
        assert!(!GraphloomError::storage("corrupt").is_transient());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::OrcTimeout.as_str(), "ORC_001");
        assert_eq!(ErrorCode::StoUnavailable.as_str(), "STO_001");
        assert_eq!(ErrorCode::WflStepFailed.as_str(), "WFL_001");
    }
}
