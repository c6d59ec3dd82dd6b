//! Inter-Process Interfaces Library
//!
//! This crate provides the wire protocols spoken between the orchestrator, the
//! RRH proxy, the vBBU agents and the UE clients: the JSON command channel and
//! the HTTP control calls.

pub mod channel;
pub mod http_control;
pub mod message_types;

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid load report")]
    InvalidReport,

    #[error("Peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Rejected by peer: {0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl InterfaceError {
    /// Whether the error means the remote side could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::PeerUnreachable { .. } | Self::Timeout(_))
    }
}
