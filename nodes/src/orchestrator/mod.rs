//! Orchestrator
//!
//! Owns the authoritative vBBU registry and UE assignments, and drives the
//! proxy and the vBBUs through the [`ControlPlane`].

pub mod api;
pub mod control;
mod service;

pub use control::{ControlPlane, RemoteControlPlane};
pub use service::OrchestratorService;

use crate::NodeError;
use common::types::{Assignment, Endpoint, LoadSample, UeId, UeLinkState, VbbuDescriptor, VbbuView};
use common::utils::unix_timestamp;
use interfaces::http_control::{UeAction, VbbuAction};
use interfaces::message_types::{
    AssignmentReport, AssignmentsApplied, HandoverReply, HandoverRequest, LoadReport, MigrationReport,
    ProxyCommand, ReplyStatus,
};
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Command channel listen address
    pub listen_addr: SocketAddr,
    /// HTTP mirror listen address, disabled when `None`
    pub api_addr: Option<SocketAddr>,
    /// Predefined vBBU pool, in index order
    pub vbbus: Vec<VbbuDescriptor>,
    /// Name prefix of migration targets
    pub migration_prefix: String,
    /// Index of the first migration target
    pub migration_start: usize,
    /// Number of managed UEs (`UE1..=UEn`)
    pub ue_count: u8,
    /// Age after which a load sample is no longer shown
    pub load_stale_after: Duration,
    /// Emulated signalling delay range for handovers, in milliseconds
    pub handover_delay_ms: Option<(u64, u64)>,
    /// Read timeout on inbound command connections
    pub read_timeout: Duration,
}

/// Outcome of an attach/detach request for one UE
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UeCommandResult {
    pub ue_id: UeId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Orchestrator state and operations
pub struct Orchestrator {
    control: Arc<dyn ControlPlane>,
    registry: RwLock<Vec<VbbuDescriptor>>,
    assignments: RwLock<BTreeMap<UeId, Assignment>>,
    loads: RwLock<HashMap<IpAddr, LoadSample>>,
    redirects: RwLock<HashMap<Endpoint, Endpoint>>,
    ue_states: RwLock<BTreeMap<UeId, UeLinkState>>,
    /// Next migration target index; also serialises migrations
    next_target: Mutex<usize>,
    migration_prefix: String,
    load_stale_after: Duration,
    handover_delay_ms: Option<(u64, u64)>,
}

impl Orchestrator {
    /// Create an orchestrator over the configured pool
    pub fn new(config: &OrchestratorConfig, control: Arc<dyn ControlPlane>) -> Self {
        let ue_states = (1..=config.ue_count)
            .map(|n| (UeId(n), UeLinkState::Disconnected))
            .collect();

        info!(
            "Orchestrator managing {} vBBUs and {} UEs",
            config.vbbus.len(),
            config.ue_count
        );

        Self {
            control,
            registry: RwLock::new(config.vbbus.clone()),
            assignments: RwLock::new(BTreeMap::new()),
            loads: RwLock::new(HashMap::new()),
            redirects: RwLock::new(HashMap::new()),
            ue_states: RwLock::new(ue_states),
            next_target: Mutex::new(config.migration_start),
            migration_prefix: config.migration_prefix.clone(),
            load_stale_after: config.load_stale_after,
            handover_delay_ms: config.handover_delay_ms,
        }
    }

    /// Look up a vBBU descriptor by name
    pub fn vbbu(&self, name: &str) -> Option<VbbuDescriptor> {
        self.registry.read().iter().find(|v| v.name == name).cloned()
    }

    /// Rebind one UE and forward the binding to the proxy
    ///
    /// The local write always happens; the push is best-effort.
    pub async fn handover(&self, request: HandoverRequest) -> HandoverReply {
        if let Some(delay) = self.sample_handover_delay() {
            debug!("Emulating {:?} signalling delay for {}", delay, request.ue_id);
            tokio::time::sleep(delay).await;
        }

        let target = request.target();
        self.assignments
            .write()
            .insert(request.ue_id, Assignment::from(target));

        self.push(&ProxyCommand::Handover(request)).await;

        let message = format!("Handover {} -> {}", request.ue_id, target);
        info!("{}", message);

        HandoverReply {
            status: ReplyStatus::Ok,
            message,
            ue_id: request.ue_id,
            vbbu_ip: target.ip,
            vbbu_port: target.port,
        }
    }

    fn sample_handover_delay(&self) -> Option<Duration> {
        let (min, max) = self.handover_delay_ms?;
        let ms = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        Some(Duration::from_millis(ms))
    }

    /// Move every UE bound to `from` onto the next vBBU of the pool
    pub async fn migrate(&self, from: Endpoint) -> Result<MigrationReport, NodeError> {
        let mut next_target = self.next_target.lock().await;
        let index = *next_target;
        *next_target += 1;

        let target_name = format!("{}{}", self.migration_prefix, index);
        let target = self.vbbu(&target_name).ok_or_else(|| {
            warn!("Migration from {} failed: {} is not in the pool", from, target_name);
            NodeError::TargetUnavailable(format!(
                "Target vBBU {} not available or limit reached",
                target_name
            ))
        })?;

        let target_endpoint = target.endpoint();
        if target_endpoint == from {
            warn!("Migration from {} failed: {} is the source itself", from, target_name);
            return Err(NodeError::TargetUnavailable(format!(
                "Target vBBU {} is the migration source",
                target_name
            )));
        }

        info!(
            "Migrating from {} to {} ({})",
            from, target_name, target_endpoint
        );

        let needs_activation = {
            let mut registry = self.registry.write();
            match registry.iter_mut().find(|v| v.name == target_name) {
                Some(descriptor) if !descriptor.active => {
                    descriptor.active = true;
                    true
                }
                _ => false,
            }
        };

        if needs_activation {
            match self
                .control
                .vbbu_control(target_endpoint, VbbuAction::Activate)
                .await
            {
                Ok(()) => info!("{} ({}) activated", target_name, target_endpoint),
                Err(e) => warn!("Activation call to {} failed: {}", target_name, e),
            }
        } else {
            debug!("{} already active, skipping activation call", target_name);
        }

        self.redirects.write().insert(from, target_endpoint);
        self.push(&ProxyCommand::UpdateRedirect {
            from_vbbu: from,
            to_vbbu: target_endpoint,
        })
        .await;

        let migrated: Vec<UeId> = {
            let mut assignments = self.assignments.write();
            let moved: Vec<UeId> = assignments
                .iter()
                .filter(|(_, a)| a.endpoint() == from)
                .map(|(ue, _)| *ue)
                .collect();
            for ue in &moved {
                assignments.insert(*ue, Assignment::from(target_endpoint));
            }
            moved
        };

        for ue in &migrated {
            self.push(&ProxyCommand::Handover(HandoverRequest::new(*ue, target_endpoint)))
                .await;
            info!("Handover {} -> {}", ue, target_endpoint);
        }

        let message = format!(
            "Migration process initiated for {} UEs from {} to {} (using {})",
            migrated.len(),
            from,
            target_endpoint,
            target_name
        );
        info!("{}", message);

        Ok(MigrationReport {
            status: ReplyStatus::Ok,
            message,
            migrated_ues_count: migrated.len(),
            migrated_ue_ids: migrated,
            new_vbbu_target: target_endpoint,
            activated_vbbu_name: target_name,
        })
    }

    /// Store a load sample keyed by the reporting vBBU address
    pub fn report_load(&self, report: LoadReport, peer: IpAddr) {
        let vbbu_ip = report.vbbu_ip.unwrap_or(peer);
        self.loads.write().insert(
            vbbu_ip,
            LoadSample {
                cpu: report.cpu,
                connections: report.connections,
                timestamp: unix_timestamp(),
            },
        );
        debug!(
            "Load from {}: cpu={} connections={}",
            vbbu_ip, report.cpu, report.connections
        );
    }

    /// Overwrite assignments with the ones applied by the proxy
    pub fn report_assignments(&self, reports: &[AssignmentReport]) -> AssignmentsApplied {
        {
            let mut assignments = self.assignments.write();
            for report in reports {
                assignments.insert(report.ue_id, Assignment::from(report.endpoint()));
            }
        }
        debug!("Received {} UE assignments from RRH", reports.len());

        AssignmentsApplied {
            status: ReplyStatus::Ok,
            applied: reports.len(),
        }
    }

    pub fn get_assignments(&self) -> BTreeMap<UeId, Assignment> {
        self.assignments.read().clone()
    }

    pub fn get_loads(&self) -> BTreeMap<IpAddr, LoadSample> {
        self.loads.read().iter().map(|(ip, s)| (*ip, *s)).collect()
    }

    pub fn get_redirects(&self) -> HashMap<Endpoint, Endpoint> {
        self.redirects.read().clone()
    }

    /// Registry joined with the latest fresh load sample of each vBBU
    pub fn get_vbbus(&self) -> BTreeMap<String, VbbuView> {
        let now = unix_timestamp();
        let max_age = self.load_stale_after.as_secs_f64();
        let loads = self.loads.read();

        self.registry
            .read()
            .iter()
            .map(|v| {
                let fresh = loads.get(&v.ip).filter(|s| s.is_fresh(now, max_age));
                let view = VbbuView {
                    ip: v.ip,
                    port: v.port,
                    is_active: v.active,
                    cpu: fresh.map(|s| s.cpu),
                    connections: fresh.map(|s| s.connections),
                };
                (v.name.clone(), view)
            })
            .collect()
    }

    /// Activate or deactivate a named vBBU
    ///
    /// Returns `false` without any call when the vBBU is already in the
    /// requested state. The flag only flips after a successful control call.
    pub async fn set_activation(&self, name: &str, action: VbbuAction) -> Result<bool, NodeError> {
        let descriptor = self
            .vbbu(name)
            .ok_or_else(|| NodeError::UnknownVbbu(name.to_string()))?;

        if descriptor.active == action.target_state() {
            debug!("{} already in requested state", name);
            return Ok(false);
        }

        self.control.vbbu_control(descriptor.endpoint(), action).await?;

        if let Some(d) = self.registry.write().iter_mut().find(|v| v.name == name) {
            d.active = action.target_state();
        }
        info!(
            "{} marked {}",
            name,
            if action.target_state() { "active" } else { "inactive" }
        );
        Ok(true)
    }

    /// Validate UE numbers against the managed range
    pub fn resolve_ue_ids(&self, ids: &[u8]) -> Result<Vec<UeId>, NodeError> {
        let states = self.ue_states.read();
        let invalid: Vec<String> = ids
            .iter()
            .filter(|n| !states.contains_key(&UeId(**n)))
            .map(|n| n.to_string())
            .collect();

        if !invalid.is_empty() {
            return Err(NodeError::InvalidUeId(invalid.join(", ")));
        }
        Ok(ids.iter().map(|n| UeId(*n)).collect())
    }

    /// Every managed UE
    pub fn all_ue_ids(&self) -> Vec<UeId> {
        self.ue_states.read().keys().copied().collect()
    }

    /// Attach UEs to the RRH
    pub async fn ue_add(&self, ues: &[UeId]) -> Vec<UeCommandResult> {
        let mut results = Vec::with_capacity(ues.len());
        for ue in ues {
            results.push(self.set_ue_link(*ue, UeLinkState::Connected).await);
        }
        results
    }

    /// Detach UEs from the RRH
    pub async fn ue_remove(&self, ues: &[UeId]) -> Vec<UeCommandResult> {
        let mut results = Vec::with_capacity(ues.len());
        for ue in ues {
            results.push(self.set_ue_link(*ue, UeLinkState::Disconnected).await);
        }
        results
    }

    pub fn ue_list(&self) -> BTreeMap<UeId, UeLinkState> {
        self.ue_states.read().clone()
    }

    async fn set_ue_link(&self, ue: UeId, wanted: UeLinkState) -> UeCommandResult {
        let current = self.ue_states.read().get(&ue).copied();
        let failed = |reason: String| UeCommandResult {
            ue_id: ue,
            success: false,
            reason: Some(reason),
        };

        match current {
            None => return failed(NodeError::InvalidUeId(ue.to_string()).to_string()),
            Some(state) if state == wanted => {
                warn!("{} already {:?}", ue, wanted);
                return failed(NodeError::AlreadyInState(format!("{} is {:?}", ue, wanted)).to_string());
            }
            Some(_) => {}
        }

        let (action, notify) = if wanted.is_connected() {
            (UeAction::Add, ProxyCommand::UeConnect { ue_id: ue })
        } else {
            (UeAction::Remove, ProxyCommand::UeDisconnect { ue_id: ue })
        };

        if let Err(e) = self.control.ue_manage(ue, action).await {
            warn!("{} did not acknowledge {:?}: {}", ue, action, e);
            return failed(e.to_string());
        }

        self.ue_states.write().insert(ue, wanted);
        info!("{} acknowledged {:?}", ue, action);
        self.push(&notify).await;

        UeCommandResult {
            ue_id: ue,
            success: true,
            reason: None,
        }
    }

    async fn push(&self, command: &ProxyCommand) {
        if let Err(e) = self.control.push_to_proxy(command).await {
            warn!("RRH unreachable or error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interfaces::InterfaceError;
    use parking_lot::Mutex as SyncMutex;

    /// Records every outbound call; optionally fails them
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub pushes: SyncMutex<Vec<ProxyCommand>>,
        pub vbbu_calls: SyncMutex<Vec<(Endpoint, VbbuAction)>>,
        pub ue_calls: SyncMutex<Vec<(UeId, UeAction)>>,
        pub fail_proxy: bool,
        pub fail_http: bool,
    }

    #[async_trait]
    impl ControlPlane for Recorder {
        async fn push_to_proxy(&self, command: &ProxyCommand) -> Result<(), InterfaceError> {
            // Give concurrent callers a chance to interleave
            tokio::task::yield_now().await;
            self.pushes.lock().push(command.clone());
            if self.fail_proxy {
                return Err(InterfaceError::Timeout("proxy".into()));
            }
            Ok(())
        }

        async fn vbbu_control(&self, vbbu: Endpoint, action: VbbuAction) -> Result<(), InterfaceError> {
            self.vbbu_calls.lock().push((vbbu, action));
            if self.fail_http {
                return Err(InterfaceError::Rejected("503".into()));
            }
            Ok(())
        }

        async fn ue_manage(&self, ue: UeId, action: UeAction) -> Result<(), InterfaceError> {
            self.ue_calls.lock().push((ue, action));
            if self.fail_http {
                return Err(InterfaceError::Rejected("500".into()));
            }
            Ok(())
        }
    }

    pub(crate) fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            api_addr: None,
            vbbus: vec![
                VbbuDescriptor {
                    name: "vbbu1".into(),
                    ip: "10.0.0.201".parse().unwrap(),
                    port: 8080,
                    active: true,
                },
                VbbuDescriptor {
                    name: "vbbu2".into(),
                    ip: "10.0.0.202".parse().unwrap(),
                    port: 8081,
                    active: false,
                },
            ],
            migration_prefix: "vbbu".into(),
            migration_start: 2,
            ue_count: 10,
            load_stale_after: Duration::from_secs(15),
            handover_delay_ms: None,
            read_timeout: Duration::from_secs(1),
        }
    }

    fn orchestrator(recorder: Arc<Recorder>) -> Orchestrator {
        Orchestrator::new(&test_config(), recorder)
    }

    fn ep(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_handover_writes_and_pushes() {
        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(recorder.clone());

        let request = HandoverRequest::new(UeId(3), ep("10.0.0.202:8081"));
        let reply = orch.handover(request).await;

        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(
            orch.get_assignments().get(&UeId(3)).map(|a| a.endpoint()),
            Some(ep("10.0.0.202:8081"))
        );
        assert_eq!(*recorder.pushes.lock(), vec![ProxyCommand::Handover(request)]);
    }

    #[tokio::test]
    async fn test_handover_survives_unreachable_proxy() {
        let recorder = Arc::new(Recorder {
            fail_proxy: true,
            ..Default::default()
        });
        let orch = orchestrator(recorder);

        orch.handover(HandoverRequest::new(UeId(1), ep("10.0.0.201:8080")))
            .await;
        assert!(orch.get_assignments().contains_key(&UeId(1)));
    }

    #[tokio::test]
    async fn test_migrate_moves_exactly_matching_ues() {
        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(recorder.clone());

        orch.report_assignments(&[
            AssignmentReport {
                ue_id: UeId(3),
                vbbu_ip: "10.0.0.201".parse().unwrap(),
                vbbu_port: 8080,
            },
            AssignmentReport {
                ue_id: UeId(4),
                vbbu_ip: "10.0.0.201".parse().unwrap(),
                vbbu_port: 9999,
            },
        ]);

        let report = orch.migrate(ep("10.0.0.201:8080")).await.unwrap();
        assert_eq!(report.migrated_ues_count, 1);
        assert_eq!(report.migrated_ue_ids, vec![UeId(3)]);
        assert_eq!(report.activated_vbbu_name, "vbbu2");
        assert_eq!(report.new_vbbu_target, ep("10.0.0.202:8081"));

        let assignments = orch.get_assignments();
        assert_eq!(assignments[&UeId(3)].endpoint(), ep("10.0.0.202:8081"));
        assert_eq!(assignments[&UeId(4)].endpoint(), ep("10.0.0.201:9999"));

        assert!(orch.vbbu("vbbu2").unwrap().active);
        assert_eq!(
            *recorder.vbbu_calls.lock(),
            vec![(ep("10.0.0.202:8081"), VbbuAction::Activate)]
        );
        assert_eq!(
            orch.get_redirects().get(&ep("10.0.0.201:8080")),
            Some(&ep("10.0.0.202:8081"))
        );

        let pushes = recorder.pushes.lock();
        assert_eq!(
            pushes[0],
            ProxyCommand::UpdateRedirect {
                from_vbbu: ep("10.0.0.201:8080"),
                to_vbbu: ep("10.0.0.202:8081"),
            }
        );
        assert_eq!(
            pushes[1],
            ProxyCommand::Handover(HandoverRequest::new(UeId(3), ep("10.0.0.202:8081")))
        );
    }

    #[tokio::test]
    async fn test_migrate_exhausts_pool() {
        let orch = orchestrator(Arc::new(Recorder::default()));

        orch.migrate(ep("10.0.0.201:8080")).await.unwrap();
        let err = orch.migrate(ep("10.0.0.202:8081")).await.unwrap_err();
        assert!(matches!(err, NodeError::TargetUnavailable(msg) if msg.contains("vbbu3")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_migrations_pick_distinct_targets() {
        let mut config = test_config();
        config.vbbus.push(VbbuDescriptor {
            name: "vbbu3".into(),
            ip: "10.0.0.203".parse().unwrap(),
            port: 8082,
            active: false,
        });
        let orch = Orchestrator::new(&config, Arc::new(Recorder::default()));

        let report = |ue: u8, ip: &str, port: u16| AssignmentReport {
            ue_id: UeId(ue),
            vbbu_ip: ip.parse().unwrap(),
            vbbu_port: port,
        };
        orch.report_assignments(&[
            report(1, "10.0.0.201", 8080),
            report(2, "10.0.0.201", 8080),
            report(3, "10.0.0.201", 8080),
            report(4, "10.0.0.210", 8090),
            report(5, "10.0.0.210", 8090),
        ]);

        let (first, second) = tokio::join!(
            orch.migrate(ep("10.0.0.201:8080")),
            orch.migrate(ep("10.0.0.210:8090"))
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        let mut names = vec![
            first.activated_vbbu_name.clone(),
            second.activated_vbbu_name.clone(),
        ];
        names.sort();
        assert_eq!(names, vec!["vbbu2", "vbbu3"]);

        assert_eq!(first.migrated_ue_ids, vec![UeId(1), UeId(2), UeId(3)]);
        assert_eq!(second.migrated_ue_ids, vec![UeId(4), UeId(5)]);

        let assignments = orch.get_assignments();
        for (report, ues) in [(&first, 1..=3u8), (&second, 4..=5u8)] {
            for ue in ues {
                assert_eq!(
                    assignments.get(&UeId(ue)).map(|a| a.endpoint()),
                    Some(report.new_vbbu_target)
                );
            }
        }
        assert!(orch.vbbu("vbbu2").unwrap().active);
        assert!(orch.vbbu("vbbu3").unwrap().active);
    }

    #[tokio::test]
    async fn test_migrate_rejects_target_equal_to_source() {
        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(recorder.clone());

        let err = orch.migrate(ep("10.0.0.202:8081")).await.unwrap_err();
        assert!(matches!(err, NodeError::TargetUnavailable(_)));
        assert!(recorder.pushes.lock().is_empty());
        assert!(!orch.vbbu("vbbu2").unwrap().active);
    }

    #[tokio::test]
    async fn test_report_load_and_vbbu_view() {
        let orch = orchestrator(Arc::new(Recorder::default()));
        let peer: IpAddr = "10.0.0.201".parse().unwrap();

        orch.report_load(
            LoadReport {
                vbbu_ip: None,
                cpu: 40.0,
                connections: 4,
            },
            peer,
        );

        let loads = orch.get_loads();
        assert_eq!(loads[&peer].cpu, 40.0);
        assert_eq!(loads[&peer].connections, 4);
        assert!(loads[&peer].timestamp > 0.0);

        let vbbus = orch.get_vbbus();
        assert_eq!(vbbus["vbbu1"].cpu, Some(40.0));
        assert_eq!(vbbus["vbbu1"].connections, Some(4));
        assert_eq!(vbbus["vbbu2"].cpu, None);
        assert!(!vbbus["vbbu2"].is_active);
    }

    #[tokio::test]
    async fn test_activation_flips_only_on_success() {
        let failing = Arc::new(Recorder {
            fail_http: true,
            ..Default::default()
        });
        let orch = orchestrator(failing);
        assert!(orch.set_activation("vbbu2", VbbuAction::Activate).await.is_err());
        assert!(!orch.vbbu("vbbu2").unwrap().active);

        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(recorder.clone());
        assert!(orch.set_activation("vbbu2", VbbuAction::Activate).await.unwrap());
        assert!(!orch.set_activation("vbbu2", VbbuAction::Activate).await.unwrap());
        assert!(orch.vbbu("vbbu2").unwrap().active);
        assert_eq!(recorder.vbbu_calls.lock().len(), 1);

        assert!(matches!(
            orch.set_activation("vbbu9", VbbuAction::Activate).await,
            Err(NodeError::UnknownVbbu(_))
        ));
    }

    #[tokio::test]
    async fn test_ue_add_and_remove() {
        let recorder = Arc::new(Recorder::default());
        let orch = orchestrator(recorder.clone());

        let results = orch.ue_add(&[UeId(1), UeId(2)]).await;
        assert!(results.iter().all(|r| r.success));
        assert_eq!(orch.ue_list()[&UeId(1)], UeLinkState::Connected);

        let again = orch.ue_add(&[UeId(1)]).await;
        assert!(!again[0].success);
        assert_eq!(recorder.ue_calls.lock().len(), 2);

        let removed = orch.ue_remove(&[UeId(2)]).await;
        assert!(removed[0].success);
        assert_eq!(orch.ue_list()[&UeId(2)], UeLinkState::Disconnected);
        assert!(recorder
            .pushes
            .lock()
            .contains(&ProxyCommand::UeDisconnect { ue_id: UeId(2) }));

        assert!(orch.resolve_ue_ids(&[1, 11]).is_err());
    }

    #[tokio::test]
    async fn test_ue_add_failure_keeps_state() {
        let orch = orchestrator(Arc::new(Recorder {
            fail_http: true,
            ..Default::default()
        }));

        let results = orch.ue_add(&[UeId(5)]).await;
        assert!(!results[0].success);
        assert_eq!(orch.ue_list()[&UeId(5)], UeLinkState::Disconnected);
    }
}
