//! TOML Configuration
//!
//! One file describes the whole emulated topology; each role reads the sections
//! it needs. Every field has a default matching the reference deployment.

use anyhow::{anyhow, Context, Result};
use common::types::{ActivationState, Endpoint, UeId, VbbuDescriptor};
use common::utils::UeAddressing;
use nodes::orchestrator::OrchestratorConfig;
use nodes::rrh::RrhConfig;
use nodes::ue::UeConfig;
use nodes::vbbu::VbbuConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Complete emulator configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CranConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub rrh: RrhSection,
    #[serde(default)]
    pub vbbu: VbbuSection,
    #[serde(default)]
    pub ue: UeSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub log: LogSection,
}

impl CranConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = Self::from_toml_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok((config, true))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let pool = &self.orchestrator.vbbus;
        for (i, entry) in pool.iter().enumerate() {
            if pool[..i].iter().any(|other| other.name == entry.name) {
                return Err(anyhow!("duplicate vBBU name: {}", entry.name));
            }
            if entry.port == 0 {
                return Err(anyhow!("vBBU {} has port 0", entry.name));
            }
        }
        if self.ue.count == 0 {
            return Err(anyhow!("ue.count must be at least 1"));
        }
        if let Some([min, max]) = self.orchestrator.handover_delay_ms {
            if min > max {
                return Err(anyhow!("handover_delay_ms: {} > {}", min, max));
            }
        }
        let [min, max] = self.ue.interval_ms;
        if min > max {
            return Err(anyhow!("ue.interval_ms: {} > {}", min, max));
        }

        let non_zero = [
            ("rrh.report_period_secs", self.rrh.report_period_secs),
            ("vbbu.report_period_secs", self.vbbu.report_period_secs),
            ("vbbu.activity_window_secs", self.vbbu.activity_window_secs),
            ("timeouts.push_ms", self.timeouts.push_ms),
            ("timeouts.control_ms", self.timeouts.control_ms),
            ("timeouts.forward_ms", self.timeouts.forward_ms),
            ("timeouts.report_ms", self.timeouts.report_ms),
            ("timeouts.read_ms", self.timeouts.read_ms),
        ];
        if let Some((key, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(anyhow!("{} must be greater than zero", key));
        }
        Ok(())
    }

    fn addressing(&self) -> UeAddressing {
        UeAddressing::new(self.ue.subnet)
    }

    /// Where the proxy control channel is reached
    pub fn rrh_control_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.rrh.address, self.rrh.control_listen.port())
    }

    /// Where UEs reach the proxy data path
    pub fn rrh_data_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.rrh.address, self.rrh.data_listen.port())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let section = &self.orchestrator;
        OrchestratorConfig {
            listen_addr: section.listen,
            api_addr: section.api_listen,
            vbbus: section.vbbus.iter().map(VbbuEntry::descriptor).collect(),
            migration_prefix: section.migration_prefix.clone(),
            migration_start: section.migration_start,
            ue_count: self.ue.count,
            load_stale_after: Duration::from_secs(section.load_stale_after_secs),
            handover_delay_ms: section.handover_delay_ms.map(|[min, max]| (min, max)),
            read_timeout: Duration::from_millis(self.timeouts.read_ms),
        }
    }

    pub fn rrh_config(&self) -> RrhConfig {
        RrhConfig {
            data_addr: self.rrh.data_listen,
            control_addr: self.rrh.control_listen,
            orchestrator_addr: self.orchestrator.address,
            default_vbbu: self.rrh.default_vbbu,
            ue_count: self.ue.count,
            ue_addressing: self.addressing(),
            forward_timeout: Duration::from_millis(self.timeouts.forward_ms),
            report_timeout: Duration::from_millis(self.timeouts.report_ms),
            report_period: Duration::from_secs(self.rrh.report_period_secs),
            read_timeout: Duration::from_millis(self.timeouts.read_ms),
        }
    }

    /// Build a vBBU agent configuration
    ///
    /// The pool entry is found by name, or else by port; CLI values override it.
    pub fn vbbu_config(&self, overrides: &VbbuOverrides) -> Result<VbbuConfig> {
        let pool = &self.orchestrator.vbbus;
        let entry = match (&overrides.name, overrides.port) {
            (Some(name), _) => Some(
                pool.iter()
                    .find(|e| &e.name == name)
                    .ok_or_else(|| anyhow!("unknown vBBU name: {}", name))?,
            ),
            (None, Some(port)) => pool.iter().find(|e| e.port == port),
            (None, None) => return Err(anyhow!("a vBBU needs --name or --port")),
        };

        let port = overrides
            .port
            .or(entry.map(|e| e.port))
            .ok_or_else(|| anyhow!("no port for vBBU"))?;
        let name = entry
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("vbbu-{}", port));
        let active = if overrides.inactive {
            false
        } else {
            entry.map_or(true, |e| e.active)
        };
        let capacity = overrides
            .capacity
            .or(entry.map(|e| e.capacity))
            .unwrap_or(self.vbbu.capacity);

        Ok(VbbuConfig {
            name,
            listen_addr: SocketAddr::new(self.vbbu.listen_ip, port),
            advertised_ip: entry.map(|e| e.ip),
            initial_state: ActivationState::from_flag(active),
            capacity,
            orchestrator_addr: self.orchestrator.address,
            report_period: Duration::from_secs(self.vbbu.report_period_secs),
            report_timeout: Duration::from_millis(self.timeouts.report_ms),
            activity_window: Duration::from_secs(self.vbbu.activity_window_secs),
        })
    }

    pub fn ue_config(&self, ue: UeId, rrh: Option<IpAddr>) -> Result<UeConfig> {
        if ue.value() == 0 || ue.value() > self.ue.count {
            return Err(anyhow!("UE id must be within 1..={}", self.ue.count));
        }
        let rrh_addr = match rrh {
            Some(ip) => SocketAddr::new(ip, self.rrh.data_listen.port()),
            None => self.rrh_data_endpoint(),
        };
        let [min, max] = self.ue.interval_ms;

        Ok(UeConfig {
            ue_id: ue,
            mgmt_addr: SocketAddr::new(self.ue.listen_ip, self.ue.mgmt_port),
            rrh_addr,
            interval_ms: (min, max),
            request_timeout: Duration::from_millis(self.timeouts.forward_ms),
        })
    }
}

/// CLI overrides for the vBBU role
#[derive(Debug, Clone, Default)]
pub struct VbbuOverrides {
    pub name: Option<String>,
    pub port: Option<u16>,
    pub inactive: bool,
    pub capacity: Option<u32>,
}

/// Orchestrator section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorSection {
    /// Command channel listen address
    #[serde(default = "default_orchestrator_listen")]
    pub listen: SocketAddr,
    /// Address other nodes use to reach the command channel
    #[serde(default = "default_orchestrator_address")]
    pub address: SocketAddr,
    /// HTTP mirror listen address
    #[serde(default = "default_api_listen")]
    pub api_listen: Option<SocketAddr>,
    #[serde(default = "default_migration_prefix")]
    pub migration_prefix: String,
    #[serde(default = "default_migration_start")]
    pub migration_start: usize,
    #[serde(default = "default_load_stale_after_secs")]
    pub load_stale_after_secs: u64,
    /// Emulated handover delay `[min, max]` in milliseconds
    #[serde(default)]
    pub handover_delay_ms: Option<[u64; 2]>,
    /// Predefined vBBU pool in index order
    #[serde(default = "default_vbbus")]
    pub vbbus: Vec<VbbuEntry>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            listen: default_orchestrator_listen(),
            address: default_orchestrator_address(),
            api_listen: default_api_listen(),
            migration_prefix: default_migration_prefix(),
            migration_start: default_migration_start(),
            load_stale_after_secs: default_load_stale_after_secs(),
            handover_delay_ms: None,
            vbbus: default_vbbus(),
        }
    }
}

fn default_orchestrator_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9100)
}

fn default_orchestrator_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 200)), 9100)
}

fn default_api_listen() -> Option<SocketAddr> {
    Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5006))
}

fn default_migration_prefix() -> String {
    "vbbu".to_string()
}

fn default_migration_start() -> usize {
    2
}

fn default_load_stale_after_secs() -> u64 {
    15
}

fn default_vbbus() -> Vec<VbbuEntry> {
    vec![
        VbbuEntry {
            name: "vbbu1".to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 201)),
            port: 8080,
            active: true,
            capacity: 10,
        },
        VbbuEntry {
            name: "vbbu2".to_string(),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 202)),
            port: 8081,
            active: false,
            capacity: 20,
        },
    ]
}

/// One predefined vBBU
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VbbuEntry {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
    #[serde(default)]
    pub active: bool,
    /// UEs served at 100% utilization
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

impl VbbuEntry {
    fn descriptor(&self) -> VbbuDescriptor {
        VbbuDescriptor {
            name: self.name.clone(),
            ip: self.ip,
            port: self.port,
            active: self.active,
        }
    }
}

fn default_capacity() -> u32 {
    10
}

/// RRH proxy section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RrhSection {
    #[serde(default = "default_rrh_data_listen")]
    pub data_listen: SocketAddr,
    #[serde(default = "default_rrh_control_listen")]
    pub control_listen: SocketAddr,
    /// Address of the RRH host as seen by UEs and the orchestrator
    #[serde(default = "default_rrh_address")]
    pub address: IpAddr,
    /// Initial route of every UE
    #[serde(default = "default_rrh_default_vbbu")]
    pub default_vbbu: Endpoint,
    #[serde(default = "default_assignment_report_secs")]
    pub report_period_secs: u64,
}

impl Default for RrhSection {
    fn default() -> Self {
        Self {
            data_listen: default_rrh_data_listen(),
            control_listen: default_rrh_control_listen(),
            address: default_rrh_address(),
            default_vbbu: default_rrh_default_vbbu(),
            report_period_secs: default_assignment_report_secs(),
        }
    }
}

fn default_rrh_data_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000)
}

fn default_rrh_control_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9200)
}

fn default_rrh_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 100))
}

fn default_rrh_default_vbbu() -> Endpoint {
    Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 201)), 8080)
}

fn default_assignment_report_secs() -> u64 {
    2
}

/// vBBU agent section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VbbuSection {
    #[serde(default = "default_listen_ip")]
    pub listen_ip: IpAddr,
    /// Capacity of vBBUs absent from the pool
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_load_report_secs")]
    pub report_period_secs: u64,
    #[serde(default = "default_activity_window_secs")]
    pub activity_window_secs: u64,
}

impl Default for VbbuSection {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            capacity: default_capacity(),
            report_period_secs: default_load_report_secs(),
            activity_window_secs: default_activity_window_secs(),
        }
    }
}

fn default_listen_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_load_report_secs() -> u64 {
    5
}

fn default_activity_window_secs() -> u64 {
    5
}

/// UE section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UeSection {
    /// Managed UEs are `UE1..=UE<count>`
    #[serde(default = "default_ue_count")]
    pub count: u8,
    /// Subnet whose last octet is the UE number
    #[serde(default = "default_ue_subnet")]
    pub subnet: Ipv4Addr,
    #[serde(default = "default_listen_ip")]
    pub listen_ip: IpAddr,
    #[serde(default = "default_ue_mgmt_port")]
    pub mgmt_port: u16,
    /// Pause between requests `[min, max]` in milliseconds
    #[serde(default = "default_ue_interval_ms")]
    pub interval_ms: [u64; 2],
}

impl Default for UeSection {
    fn default() -> Self {
        Self {
            count: default_ue_count(),
            subnet: default_ue_subnet(),
            listen_ip: default_listen_ip(),
            mgmt_port: default_ue_mgmt_port(),
            interval_ms: default_ue_interval_ms(),
        }
    }
}

fn default_ue_count() -> u8 {
    10
}

fn default_ue_subnet() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 0)
}

fn default_ue_mgmt_port() -> u16 {
    5000
}

fn default_ue_interval_ms() -> [u64; 2] {
    [1500, 3000]
}

/// Outbound and inbound timeouts, in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutSection {
    /// Orchestrator pushes to the proxy control channel
    #[serde(default = "default_push_ms")]
    pub push_ms: u64,
    /// HTTP control calls to vBBUs and UEs
    #[serde(default = "default_control_ms")]
    pub control_ms: u64,
    /// Proxy forwarding and UE requests
    #[serde(default = "default_push_ms")]
    pub forward_ms: u64,
    /// Load and assignment reports
    #[serde(default = "default_push_ms")]
    pub report_ms: u64,
    /// Reading one request on a command channel
    #[serde(default = "default_push_ms")]
    pub read_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            push_ms: default_push_ms(),
            control_ms: default_control_ms(),
            forward_ms: default_push_ms(),
            report_ms: default_push_ms(),
            read_ms: default_push_ms(),
        }
    }
}

fn default_push_ms() -> u64 {
    3000
}

fn default_control_ms() -> u64 {
    2000
}

/// Logging section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LogSection {
    /// Level used when neither `RUST_LOG` nor `--log-level` is set
    #[serde(default)]
    pub level: Option<String>,
    /// Append log lines to this file instead of stdout
    #[serde(default)]
    pub filename: Option<String>,
}
