//! Message Types for the Command Channels
//!
//! Commands are JSON objects discriminated by a `command` field. Each channel
//! decodes its payload exactly once, at the boundary, into a typed enum.

use crate::InterfaceError;
use common::types::{Endpoint, UeId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};

/// A family of commands accepted on one channel
pub trait CommandSet: Sized {
    /// Recognised `command` discriminators
    const COMMANDS: &'static [&'static str];

    /// Build the typed command from an already parsed JSON object
    fn from_value(value: Value) -> Result<Self, InterfaceError>;
}

/// Decode a raw payload into a typed command
///
/// Unparsable payloads are `MalformedMessage`, an unrecognised discriminator is
/// `UnknownCommand` and absent required fields are `MissingField`.
pub fn decode_command<C: CommandSet>(payload: &[u8]) -> Result<C, InterfaceError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| InterfaceError::MalformedMessage(e.to_string()))?;

    if !value.is_object() {
        return Err(InterfaceError::MalformedMessage("expected a JSON object".into()));
    }

    let name = value
        .get("command")
        .ok_or(InterfaceError::MissingField("command"))?
        .as_str()
        .ok_or_else(|| InterfaceError::InvalidField {
            field: "command",
            reason: "expected a string".into(),
        })?;

    if !C::COMMANDS.contains(&name) {
        return Err(InterfaceError::UnknownCommand(name.to_string()));
    }

    C::from_value(value)
}

/// Encode a command or reply as one newline-terminated JSON line
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, InterfaceError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn from_raw<R: DeserializeOwned>(value: Value) -> Result<R, InterfaceError> {
    serde_json::from_value(value).map_err(|e| InterfaceError::MalformedMessage(e.to_string()))
}

fn require<T>(field: Option<T>, name: &'static str) -> Result<T, InterfaceError> {
    field.ok_or(InterfaceError::MissingField(name))
}

fn parse_ue_id(raw: Option<String>) -> Result<UeId, InterfaceError> {
    require(raw, "ue_id")?
        .parse()
        .map_err(|e: common::TypeError| InterfaceError::InvalidField {
            field: "ue_id",
            reason: e.to_string(),
        })
}

fn parse_endpoint(raw: Option<String>, name: &'static str) -> Result<Endpoint, InterfaceError> {
    require(raw, name)?
        .parse()
        .map_err(|e: common::TypeError| InterfaceError::InvalidField {
            field: name,
            reason: e.to_string(),
        })
}

/// Single-UE rebinding request, shared by the orchestrator and proxy channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandoverRequest {
    /// UE to rebind
    pub ue_id: UeId,
    /// Target vBBU address
    pub new_vbbu_ip: IpAddr,
    /// Target vBBU port
    pub new_vbbu_port: u16,
}

impl HandoverRequest {
    pub fn new(ue_id: UeId, target: Endpoint) -> Self {
        Self {
            ue_id,
            new_vbbu_ip: target.ip,
            new_vbbu_port: target.port,
        }
    }

    /// Target vBBU endpoint
    pub fn target(&self) -> Endpoint {
        Endpoint::new(self.new_vbbu_ip, self.new_vbbu_port)
    }
}

#[derive(Debug, Deserialize)]
struct RawHandover {
    ue_id: Option<String>,
    new_vbbu_ip: Option<String>,
    new_vbbu_port: Option<u16>,
}

impl TryFrom<RawHandover> for HandoverRequest {
    type Error = InterfaceError;

    fn try_from(raw: RawHandover) -> Result<Self, Self::Error> {
        let ue_id = parse_ue_id(raw.ue_id)?;
        let new_vbbu_ip = require(raw.new_vbbu_ip, "new_vbbu_ip")?
            .parse()
            .map_err(|_| InterfaceError::InvalidField {
                field: "new_vbbu_ip",
                reason: "expected an IP address".into(),
            })?;
        let new_vbbu_port = require(raw.new_vbbu_port.filter(|p| *p != 0), "new_vbbu_port")?;

        Ok(Self {
            ue_id,
            new_vbbu_ip,
            new_vbbu_port,
        })
    }
}

/// Load report pushed by a vBBU agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadReport {
    /// Reporting vBBU; the peer address is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vbbu_ip: Option<IpAddr>,
    /// Utilization in percent
    pub cpu: f64,
    /// UEs seen within the activity window
    pub connections: u32,
}

/// One `(ue_id, vbbu_ip, vbbu_port)` triple reported by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub ue_id: UeId,
    pub vbbu_ip: IpAddr,
    pub vbbu_port: u16,
}

impl AssignmentReport {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.vbbu_ip, self.vbbu_port)
    }
}

#[derive(Debug, Deserialize)]
struct RawAssignmentReport {
    ue_id: Option<String>,
    vbbu_ip: Option<String>,
    vbbu_port: Option<u16>,
}

impl RawAssignmentReport {
    /// Incomplete or unparsable entries are dropped
    fn validate(self) -> Option<AssignmentReport> {
        Some(AssignmentReport {
            ue_id: self.ue_id?.parse().ok()?,
            vbbu_ip: self.vbbu_ip?.parse().ok()?,
            vbbu_port: self.vbbu_port.filter(|p| *p != 0)?,
        })
    }
}

/// Commands accepted on the orchestrator channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OrchestratorCommand {
    Handover(HandoverRequest),
    Migrate { from_vbbu: Endpoint },
    ReportLoad(LoadReport),
    ReportAssignments { assignments: Vec<AssignmentReport> },
    GetAssignments,
    GetLoads,
    GetVbbus,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum RawOrchestratorCommand {
    Handover(RawHandover),
    Migrate {
        from_vbbu: Option<String>,
    },
    ReportLoad {
        vbbu_ip: Option<IpAddr>,
        #[serde(alias = "utilization")]
        cpu: Option<f64>,
        connections: Option<u32>,
    },
    ReportAssignments {
        #[serde(default)]
        assignments: Vec<RawAssignmentReport>,
    },
    GetAssignments,
    GetLoads,
    GetVbbus,
}

impl CommandSet for OrchestratorCommand {
    const COMMANDS: &'static [&'static str] = &[
        "handover",
        "migrate",
        "report_load",
        "report_assignments",
        "get_assignments",
        "get_loads",
        "get_vbbus",
    ];

    fn from_value(value: Value) -> Result<Self, InterfaceError> {
        let command = match from_raw::<RawOrchestratorCommand>(value)? {
            RawOrchestratorCommand::Handover(raw) => Self::Handover(raw.try_into()?),
            RawOrchestratorCommand::Migrate { from_vbbu } => Self::Migrate {
                from_vbbu: parse_endpoint(from_vbbu, "from_vbbu")?,
            },
            RawOrchestratorCommand::ReportLoad {
                vbbu_ip,
                cpu,
                connections,
            } => match (cpu, connections) {
                (Some(cpu), Some(connections)) => Self::ReportLoad(LoadReport {
                    vbbu_ip,
                    cpu,
                    connections,
                }),
                _ => return Err(InterfaceError::InvalidReport),
            },
            RawOrchestratorCommand::ReportAssignments { assignments } => Self::ReportAssignments {
                assignments: assignments
                    .into_iter()
                    .filter_map(RawAssignmentReport::validate)
                    .collect(),
            },
            RawOrchestratorCommand::GetAssignments => Self::GetAssignments,
            RawOrchestratorCommand::GetLoads => Self::GetLoads,
            RawOrchestratorCommand::GetVbbus => Self::GetVbbus,
        };
        Ok(command)
    }
}

/// Commands accepted on the proxy control channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ProxyCommand {
    Handover(HandoverRequest),
    UpdateRedirect { from_vbbu: Endpoint, to_vbbu: Endpoint },
    UeConnect { ue_id: UeId },
    UeDisconnect { ue_id: UeId },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum RawProxyCommand {
    Handover(RawHandover),
    UpdateRedirect {
        from_vbbu: Option<String>,
        to_vbbu: Option<String>,
    },
    UeConnect {
        ue_id: Option<String>,
    },
    UeDisconnect {
        ue_id: Option<String>,
    },
}

impl CommandSet for ProxyCommand {
    const COMMANDS: &'static [&'static str] =
        &["handover", "update_redirect", "ue_connect", "ue_disconnect"];

    fn from_value(value: Value) -> Result<Self, InterfaceError> {
        let command = match from_raw::<RawProxyCommand>(value)? {
            RawProxyCommand::Handover(raw) => Self::Handover(raw.try_into()?),
            RawProxyCommand::UpdateRedirect { from_vbbu, to_vbbu } => Self::UpdateRedirect {
                from_vbbu: parse_endpoint(from_vbbu, "from_vbbu")?,
                to_vbbu: parse_endpoint(to_vbbu, "to_vbbu")?,
            },
            RawProxyCommand::UeConnect { ue_id } => Self::UeConnect {
                ue_id: parse_ue_id(ue_id)?,
            },
            RawProxyCommand::UeDisconnect { ue_id } => Self::UeDisconnect {
                ue_id: parse_ue_id(ue_id)?,
            },
        };
        Ok(command)
    }
}

/// Outcome discriminator carried by every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Plain acknowledgement or error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// Reply to an orchestrator `handover`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverReply {
    pub status: ReplyStatus,
    pub message: String,
    pub ue_id: UeId,
    pub vbbu_ip: IpAddr,
    pub vbbu_port: u16,
}

/// Reply to an orchestrator `migrate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub status: ReplyStatus,
    pub message: String,
    pub migrated_ues_count: usize,
    pub migrated_ue_ids: Vec<UeId>,
    pub new_vbbu_target: Endpoint,
    pub activated_vbbu_name: String,
}

/// Reply to `report_assignments`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentsApplied {
    pub status: ReplyStatus,
    pub applied: usize,
}

/// Reply to a proxy `handover`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHandoverReply {
    pub status: ReplyStatus,
    /// UE identity as commanded
    pub ue_id: UeId,
    /// Address derived from the UE identity
    pub ue_ip: Ipv4Addr,
    /// Newly applied route
    pub new_target: Endpoint,
    /// Address of the commanding peer
    pub from: IpAddr,
}

/// Envelope used by the orchestrator HTTP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: ReplyStatus::Ok,
            data: Some(data),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }
}
