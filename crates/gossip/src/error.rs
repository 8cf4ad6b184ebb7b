//! Error types for the gossip crate

use std::io;
use thiserror::Error;

/// Errors that can occur in the gossip transport
#[derive(Debug, Error)]
pub enum GossipError {
    /// Failed to bind the gossip socket
    #[error("failed to bind gossip socket on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (malformed datagrams)
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for gossip operations
pub type Result<T> = std::result::Result<T, GossipError>;
