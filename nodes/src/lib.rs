//! C-RAN Node Library
//!
//! This crate implements the cooperating processes of the emulator: the
//! orchestrator, the RRH proxy, the vBBU agent and the UE traffic generator.

pub mod orchestrator;
pub mod rrh;
pub mod ue;
pub mod vbbu;

use interfaces::InterfaceError;
use std::net::IpAddr;
use thiserror::Error;

/// Common errors for C-RAN nodes
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Unknown client {0}")]
    UnknownClient(IpAddr),

    #[error("Target unavailable: {0}")]
    TargetUnavailable(String),

    #[error("Service inactive")]
    ServiceInactive,

    #[error("Unknown vBBU: {0}")]
    UnknownVbbu(String),

    #[error("Invalid UE ID: {0}")]
    InvalidUeId(String),

    #[error("Already in requested state: {0}")]
    AlreadyInState(String),

    #[error("Interface error: {0}")]
    Interface(#[from] InterfaceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
