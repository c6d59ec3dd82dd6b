//! RRH Proxy
//!
//! Forwards every UE request to the vBBU currently serving it. The route table
//! is keyed by UE address; the redirect overlay lazily corrects routes that
//! still point at a migrated vBBU.

mod data_path;
mod reporter;
mod service;

pub use data_path::router;
pub use reporter::AssignmentReporter;
pub use service::RrhService;

use crate::NodeError;
use bytes::Bytes;
use common::types::{Endpoint, UeId, UeLinkState};
use common::utils::UeAddressing;
use interfaces::message_types::AssignmentReport;
use interfaces::InterfaceError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, warn};

/// RRH proxy configuration
#[derive(Debug, Clone)]
pub struct RrhConfig {
    /// UE-facing HTTP listen address
    pub data_addr: SocketAddr,
    /// Control channel listen address
    pub control_addr: SocketAddr,
    /// Orchestrator command channel
    pub orchestrator_addr: SocketAddr,
    /// Route installed for every UE at startup
    pub default_vbbu: Endpoint,
    /// Number of routed UEs (`UE1..=UEn`)
    pub ue_count: u8,
    pub ue_addressing: UeAddressing,
    /// Timeout of a forwarded request
    pub forward_timeout: Duration,
    /// Timeout of an assignment report
    pub report_timeout: Duration,
    /// Assignment report period
    pub report_period: Duration,
    /// Read timeout on inbound control connections
    pub read_timeout: Duration,
}

/// Proxy routing state
pub struct RrhProxy {
    routes: RwLock<HashMap<Ipv4Addr, Endpoint>>,
    redirects: RwLock<HashMap<Endpoint, Endpoint>>,
    links: RwLock<HashMap<Ipv4Addr, UeLinkState>>,
    addressing: UeAddressing,
    client: reqwest::Client,
}

impl RrhProxy {
    /// Route every configured UE to the default vBBU, all disconnected
    pub fn new(config: &RrhConfig) -> Result<Self, NodeError> {
        let ues: Vec<Ipv4Addr> = (1..=config.ue_count)
            .map(|n| config.ue_addressing.ip_for(UeId(n)))
            .collect();

        let routes = ues.iter().map(|ip| (*ip, config.default_vbbu)).collect();
        let links = ues
            .iter()
            .map(|ip| (*ip, UeLinkState::Disconnected))
            .collect();

        let client = reqwest::Client::builder()
            .timeout(config.forward_timeout)
            .build()
            .map_err(|e| InterfaceError::MalformedMessage(e.to_string()))?;

        info!(
            "RRH proxy routing {} UEs to {} by default",
            config.ue_count, config.default_vbbu
        );

        Ok(Self {
            routes: RwLock::new(routes),
            redirects: RwLock::new(HashMap::new()),
            links: RwLock::new(links),
            addressing: config.ue_addressing,
            client,
        })
    }

    pub fn addressing(&self) -> UeAddressing {
        self.addressing
    }

    /// Resolve the vBBU serving the UE at `ue_ip`
    ///
    /// Overlay entries are followed until none matches; a cycle stops the walk
    /// at the last endpoint not yet visited. A corrected route is persisted.
    pub fn resolve(&self, ue_ip: Ipv4Addr) -> Result<Endpoint, NodeError> {
        let mut routes = self.routes.write();
        let current = *routes
            .get(&ue_ip)
            .ok_or(NodeError::UnknownClient(IpAddr::V4(ue_ip)))?;

        let redirects = self.redirects.read();
        let mut target = current;
        let mut visited = HashSet::from([current]);
        while let Some(next) = redirects.get(&target) {
            if !visited.insert(*next) {
                warn!("Redirect cycle through {} for {}", next, ue_ip);
                break;
            }
            target = *next;
        }

        if target != current {
            routes.insert(ue_ip, target);
            info!("{} traffic redirected: {} -> {}", ue_ip, current, target);
        }
        Ok(target)
    }

    /// Forward a UE request and return the vBBU's status and body
    pub async fn forward(&self, ue_ip: Ipv4Addr, path_and_query: &str) -> Result<(u16, Bytes), NodeError> {
        let target = self.resolve(ue_ip)?;
        let url = format!("{}{}", target.http_url(), path_and_query);
        debug!("Forwarding {} -> {}", ue_ip, url);

        let unreachable = |e: reqwest::Error| {
            NodeError::Interface(if e.is_timeout() {
                InterfaceError::Timeout(url.clone())
            } else {
                InterfaceError::PeerUnreachable {
                    peer: target.to_string(),
                    reason: e.to_string(),
                }
            })
        };

        let response = self.client.get(&url).send().await.map_err(unreachable)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(unreachable)?;
        debug!("{} answered {} with {}", target, ue_ip, status);
        Ok((status, body))
    }

    /// Overwrite a UE route, bypassing the overlay
    pub fn set_route(&self, ue_ip: Ipv4Addr, target: Endpoint) {
        self.routes.write().insert(ue_ip, target);
    }

    /// Install or replace a redirect rule
    pub fn set_redirect(&self, from: Endpoint, to: Endpoint) {
        self.redirects.write().insert(from, to);
    }

    pub fn set_link(&self, ue_ip: Ipv4Addr, state: UeLinkState) {
        self.links.write().insert(ue_ip, state);
    }

    /// Current route of every UE
    pub fn routes(&self) -> BTreeMap<Ipv4Addr, Endpoint> {
        self.routes.read().iter().map(|(ip, e)| (*ip, *e)).collect()
    }

    /// Routes of the connected UEs, as reported to the orchestrator
    pub fn connected_assignments(&self) -> Vec<AssignmentReport> {
        let links = self.links.read();
        let routes = self.routes.read();

        let mut reports: Vec<AssignmentReport> = routes
            .iter()
            .filter(|(ip, _)| links.get(*ip).is_some_and(|l| l.is_connected()))
            .filter_map(|(ip, target)| {
                self.addressing
                    .ue_for(IpAddr::V4(*ip))
                    .map(|ue_id| AssignmentReport {
                        ue_id,
                        vbbu_ip: target.ip,
                        vbbu_port: target.port,
                    })
            })
            .collect();
        reports.sort_by_key(|r| r.ue_id);
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config(default_vbbu: Endpoint) -> RrhConfig {
        RrhConfig {
            data_addr: "127.0.0.1:0".parse().unwrap(),
            control_addr: "127.0.0.1:0".parse().unwrap(),
            orchestrator_addr: "127.0.0.1:9".parse().unwrap(),
            default_vbbu,
            ue_count: 10,
            ue_addressing: UeAddressing::new(Ipv4Addr::new(127, 0, 0, 0)),
            forward_timeout: Duration::from_secs(3),
            report_timeout: Duration::from_secs(1),
            report_period: Duration::from_secs(2),
            read_timeout: Duration::from_secs(1),
        }
    }

    fn ep(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    fn ue(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(127, 0, 0, n)
    }

    #[test]
    fn test_initial_routes() {
        let proxy = RrhProxy::new(&test_config(ep("10.0.0.201:8080"))).unwrap();
        assert_eq!(proxy.routes().len(), 10);
        assert_eq!(proxy.resolve(ue(3)).unwrap(), ep("10.0.0.201:8080"));
        assert!(matches!(proxy.resolve(ue(42)), Err(NodeError::UnknownClient(_))));
        assert!(proxy.connected_assignments().is_empty());
    }

    #[test]
    fn test_redirect_is_applied_and_persisted() {
        let proxy = RrhProxy::new(&test_config(ep("10.0.0.201:8080"))).unwrap();
        proxy.set_redirect(ep("10.0.0.201:8080"), ep("10.0.0.202:8081"));

        assert_eq!(proxy.resolve(ue(1)).unwrap(), ep("10.0.0.202:8081"));
        assert_eq!(proxy.routes()[&ue(1)], ep("10.0.0.202:8081"));
        assert_eq!(proxy.routes()[&ue(2)], ep("10.0.0.201:8080"));
    }

    #[test]
    fn test_redirect_chain_and_cycle() {
        let proxy = RrhProxy::new(&test_config(ep("10.0.0.201:8080"))).unwrap();
        proxy.set_redirect(ep("10.0.0.201:8080"), ep("10.0.0.202:8081"));
        proxy.set_redirect(ep("10.0.0.202:8081"), ep("10.0.0.203:8082"));
        assert_eq!(proxy.resolve(ue(1)).unwrap(), ep("10.0.0.203:8082"));

        proxy.set_redirect(ep("10.0.0.203:8082"), ep("10.0.0.201:8080"));
        // 203 -> 201 -> 202 -> 203 stops before revisiting 203
        assert_eq!(proxy.resolve(ue(1)).unwrap(), ep("10.0.0.202:8081"));
    }

    #[test]
    fn test_handover_bypasses_overlay() {
        let proxy = RrhProxy::new(&test_config(ep("10.0.0.201:8080"))).unwrap();
        proxy.set_redirect(ep("10.0.0.202:8081"), ep("10.0.0.203:8082"));
        proxy.set_route(ue(4), ep("10.0.0.202:8081"));
        assert_eq!(proxy.routes()[&ue(4)], ep("10.0.0.202:8081"));
    }

    #[test]
    fn test_connected_assignments() {
        let proxy = RrhProxy::new(&test_config(ep("10.0.0.201:8080"))).unwrap();
        proxy.set_link(ue(5), UeLinkState::Connected);
        proxy.set_link(ue(2), UeLinkState::Connected);
        proxy.set_link(ue(2), UeLinkState::Disconnected);

        let reports = proxy.connected_assignments();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].ue_id, UeId(5));
        assert_eq!(reports[0].endpoint(), ep("10.0.0.201:8080"));
    }
}
