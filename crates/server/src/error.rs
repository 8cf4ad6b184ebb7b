//! Error types for the server crate

use std::io;
use thiserror::Error;

/// Errors that can occur in the query server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind a listening socket
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine actor has stopped
    #[error("engine task stopped")]
    EngineGone,
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
