//! Error types for ledger-pager
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use crate::session::SessionKey;
use thiserror::Error;

/// The main error type for ledger-pager
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Session Errors
    // ============================================================================
    #[error("Session {tx_id}({chain_id}) already exists")]
    SessionExists { chain_id: String, tx_id: String },

    #[error("No query session for {tx_id}({chain_id})")]
    SessionNotFound { chain_id: String, tx_id: String },

    #[error("Query iterator '{query_id}' not found")]
    IteratorNotFound { query_id: String },

    // ============================================================================
    // Iteration Errors
    // ============================================================================
    #[error("Result sequence failed: {message}")]
    Sequence { message: String },

    #[error("Failed to encode query result: {message}")]
    Serialization { message: String },

    // ============================================================================
    // Ledger Errors
    // ============================================================================
    #[error("Invalid chain ID, {chain_id}")]
    UnknownChain { chain_id: String },

    #[error("Key '{key}' not found in namespace '{namespace}'")]
    NotFound { namespace: String, key: String },

    #[error("Ledger error: {message}")]
    Ledger { message: String },

    // ============================================================================
    // Invocation Errors
    // ============================================================================
    #[error("{message}")]
    InvalidArguments { message: String },

    #[error("Requested function {name} not found.")]
    UnknownOperation { name: String },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a session-exists error for a key
    pub fn session_exists(key: &SessionKey) -> Self {
        Self::SessionExists {
            chain_id: key.chain_id().to_string(),
            tx_id: key.tx_id().to_string(),
        }
    }

    /// Create a session-not-found error for a key
    pub fn session_not_found(key: &SessionKey) -> Self {
        Self::SessionNotFound {
            chain_id: key.chain_id().to_string(),
            tx_id: key.tx_id().to_string(),
        }
    }

    /// Create an iterator-not-found error
    pub fn iterator_not_found(query_id: impl Into<String>) -> Self {
        Self::IteratorNotFound {
            query_id: query_id.into(),
        }
    }

    /// Create a result sequence error
    pub fn sequence(message: impl Into<String>) -> Self {
        Self::Sequence {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an unknown chain error
    pub fn unknown_chain(chain_id: impl Into<String>) -> Self {
        Self::UnknownChain {
            chain_id: chain_id.into(),
        }
    }

    /// Create a point lookup miss
    pub fn not_found(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// Create a ledger error
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Errors that end an iterator for good; the entry must be released
    pub fn is_iteration_failure(&self) -> bool {
        matches!(self, Error::Sequence { .. } | Error::Serialization { .. })
    }

    /// Check if this error is a lookup miss (session, iterator, chain or key)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::SessionNotFound { .. }
                | Error::IteratorNotFound { .. }
                | Error::UnknownChain { .. }
                | Error::NotFound { .. }
        )
    }

    /// Check if this error was caused by the caller rather than the store
    pub fn is_client_error(&self) -> bool {
        self.is_not_found()
            || matches!(
                self,
                Error::SessionExists { .. }
                    | Error::InvalidArguments { .. }
                    | Error::UnknownOperation { .. }
            )
    }
}

/// Result type alias for ledger-pager
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
