//! Common Types for the C-RAN Emulator
//!
//! Defines the identifiers and records shared by the orchestrator, the RRH proxy
//! and the vBBU agents

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing identifiers from their wire form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid UE identifier: {0}")]
    InvalidUeId(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// UE identity
///
/// The number is the last octet of the UE's address; the wire form is `UE<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UeId(pub u8);

impl UeId {
    /// Create a new UE identity
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Get the numeric identity
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for UeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UE{}", self.0)
    }
}

impl FromStr for UeId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .get(..2)
            .filter(|prefix| prefix.eq_ignore_ascii_case("ue"))
            .map(|_| &trimmed[2..])
            .ok_or_else(|| TypeError::InvalidUeId(s.to_string()))?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidUeId(s.to_string()));
        }

        digits
            .parse::<u8>()
            .map(UeId)
            .map_err(|_| TypeError::InvalidUeId(s.to_string()))
    }
}

impl TryFrom<String> for UeId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UeId> for String {
    fn from(value: UeId) -> Self {
        value.to_string()
    }
}

/// Network endpoint of a vBBU (`ip:port`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    /// Host address
    pub ip: IpAddr,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Base URL for plain HTTP requests to this endpoint
    pub fn http_url(&self) -> String {
        format!("http://{}", SocketAddr::from(*self))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SocketAddr::from(*self))
    }
}

impl FromStr for Endpoint {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Endpoint::from)
            .map_err(|_| TypeError::InvalidEndpoint(s.to_string()))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        SocketAddr::new(endpoint.ip, endpoint.port)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.to_string()
    }
}

/// Binding of a UE to the vBBU serving it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Serving vBBU address
    pub vbbu_ip: IpAddr,
    /// Serving vBBU port
    pub vbbu_port: u16,
}

impl Assignment {
    /// Endpoint of the serving vBBU
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.vbbu_ip, self.vbbu_port)
    }
}

impl From<Endpoint> for Assignment {
    fn from(endpoint: Endpoint) -> Self {
        Self {
            vbbu_ip: endpoint.ip,
            vbbu_port: endpoint.port,
        }
    }
}

/// Activation state of a vBBU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationState {
    /// Serving UE traffic
    Active,
    /// Refusing UE traffic
    Inactive,
}

impl ActivationState {
    /// Build from a boolean flag
    pub fn from_flag(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    /// Whether the state is `Active`
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Predefined vBBU known to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VbbuDescriptor {
    /// vBBU name (e.g. `vbbu1`)
    pub name: String,
    /// Host address
    pub ip: IpAddr,
    /// HTTP port
    pub port: u16,
    /// Activation flag as last commanded by the orchestrator
    #[serde(rename = "is_active")]
    pub active: bool,
}

impl VbbuDescriptor {
    /// Endpoint of this vBBU
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.ip, self.port)
    }
}

/// Last load report received from a vBBU
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    /// Utilization in percent of the vBBU's capacity
    pub cpu: f64,
    /// UEs seen within the activity window
    pub connections: u32,
    /// Reception time (seconds since the Unix epoch)
    pub timestamp: f64,
}

impl LoadSample {
    /// Whether the sample is at most `max_age_secs` old at `now`
    pub fn is_fresh(&self, now: f64, max_age_secs: f64) -> bool {
        now - self.timestamp <= max_age_secs
    }
}

/// Joined descriptor and load view returned by `get_vbbus`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VbbuView {
    pub ip: IpAddr,
    pub port: u16,
    pub is_active: bool,
    /// `None` when no fresh sample exists
    pub cpu: Option<f64>,
    /// `None` when no fresh sample exists
    pub connections: Option<u32>,
}

/// Connectivity of a UE towards the RRH
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UeLinkState {
    Connected,
    Disconnected,
}

impl UeLinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}
