//! vBBU Agent
//!
//! Serves UE requests while active, keeps a window of recently seen UEs and
//! reports the resulting load to the orchestrator.

mod http;
mod reporter;

pub use http::router;
pub use reporter::LoadReporter;

use crate::NodeError;
use common::types::ActivationState;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{debug, info};

/// vBBU agent configuration
#[derive(Debug, Clone)]
pub struct VbbuConfig {
    /// Identity echoed in acknowledgements
    pub name: String,
    /// HTTP listen address
    pub listen_addr: SocketAddr,
    /// Address reported as `vbbu_ip`; the orchestrator uses the peer address when unset
    pub advertised_ip: Option<IpAddr>,
    pub initial_state: ActivationState,
    /// UEs served at 100% utilization
    pub capacity: u32,
    /// Orchestrator command channel
    pub orchestrator_addr: SocketAddr,
    pub report_period: Duration,
    pub report_timeout: Duration,
    /// Age after which a UE no longer counts as a connection
    pub activity_window: Duration,
}

/// UEs seen recently, keyed by numeric UE id
#[derive(Debug, Default)]
pub struct ActivityWindow {
    last_seen: HashMap<u32, Instant>,
}

impl ActivityWindow {
    pub fn record(&mut self, ue_id: u32, now: Instant) {
        self.last_seen.insert(ue_id, now);
    }

    /// Drop entries older than `window` and return how many remain
    pub fn purge(&mut self, now: Instant, window: Duration) -> usize {
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        self.last_seen.len()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// Activation state and activity of one vBBU
pub struct VbbuAgent {
    name: String,
    capacity: u32,
    state: RwLock<ActivationState>,
    activity: Mutex<ActivityWindow>,
}

impl VbbuAgent {
    pub fn new(config: &VbbuConfig) -> Self {
        Self {
            name: config.name.clone(),
            capacity: config.capacity.max(1),
            state: RwLock::new(config.initial_state),
            activity: Mutex::new(ActivityWindow::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ActivationState {
        *self.state.read()
    }

    /// Apply an activation command; idempotent
    pub fn set_state(&self, state: ActivationState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            info!(
                "{} is now {:?} ({} UEs in activity window)",
                self.name,
                state,
                self.activity.lock().len()
            );
        } else {
            debug!("{} already {:?}", self.name, state);
        }
    }

    /// Account for a UE request and return the acknowledgement text
    ///
    /// The state guard is held while recording, so no UE is recorded once a
    /// deactivation has been applied.
    pub fn serve(&self, ue_id: u32, value: u64, now: Instant) -> Result<String, NodeError> {
        let state = self.state.read();
        if !state.is_active() {
            return Err(NodeError::ServiceInactive);
        }
        self.activity.lock().record(ue_id, now);
        drop(state);
        debug!("Value {} received from UE{}", value, ue_id);
        Ok(format!("Acknowledgement #{}", value))
    }

    /// Purge the window and compute `(connections, utilization %)`
    pub fn sample_load(&self, now: Instant, window: Duration) -> (u32, f64) {
        let connections = self.activity.lock().purge(now, window) as u32;
        let utilization = connections as f64 * 100.0 / self.capacity as f64;
        (connections, utilization)
    }

    /// Serve HTTP and report load until the listener fails
    pub async fn run(self: Arc<Self>, config: &VbbuConfig) -> Result<(), NodeError> {
        let reporter = LoadReporter::new(self.clone(), config);
        tokio::spawn(reporter.run());

        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(
            "vBBU {} listening on {} ({:?}, capacity {})",
            self.name,
            listener.local_addr()?,
            self.state(),
            self.capacity
        );
        axum::serve(listener, router(self)).await?;
        Ok(())
    }
}
