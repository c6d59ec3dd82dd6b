//! UE Traffic Generator
//!
//! Emulated UE: a management endpoint (`/add`, `/remove`) toggles attachment to
//! the RRH, and while attached a loop sends numbered requests through the proxy.

use crate::NodeError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use common::types::UeId;
use interfaces::InterfaceError;
use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// UE configuration
#[derive(Debug, Clone)]
pub struct UeConfig {
    pub ue_id: UeId,
    /// Management endpoint listen address
    pub mgmt_addr: SocketAddr,
    /// RRH proxy data path
    pub rrh_addr: SocketAddr,
    /// Pause between requests, in milliseconds
    pub interval_ms: (u64, u64),
    pub request_timeout: Duration,
}

/// Result of one traffic iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not attached to the RRH
    Detached,
    /// Request acknowledged by a vBBU
    Acknowledged { vbbu_id: String, value: u64 },
    /// The RRH answered with a non-success status
    Refused(u16),
    /// The RRH could not be reached
    Unreachable,
}

#[derive(Debug, Deserialize)]
struct Acknowledgement {
    vbbu_id: String,
}

#[derive(Debug, Default)]
struct Session {
    attached: bool,
    value: u64,
    rrh_reachable: bool,
}

/// Emulated UE
pub struct UeClient {
    ue_id: UeId,
    rrh_url: String,
    interval_ms: (u64, u64),
    client: reqwest::Client,
    session: Mutex<Session>,
}

impl UeClient {
    pub fn new(config: &UeConfig) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| InterfaceError::MalformedMessage(e.to_string()))?;

        Ok(Self {
            ue_id: config.ue_id,
            rrh_url: format!("http://{}/", config.rrh_addr),
            interval_ms: config.interval_ms,
            client,
            session: Mutex::new(Session::default()),
        })
    }

    pub fn is_attached(&self) -> bool {
        self.session.lock().attached
    }

    /// Attach or detach; detaching resets the request counter
    pub fn set_attached(&self, attached: bool) {
        let mut session = self.session.lock();
        if session.attached == attached {
            return;
        }
        session.attached = attached;
        session.rrh_reachable = attached;
        if !attached {
            session.value = 0;
        }
        info!(
            "{} {}",
            self.ue_id,
            if attached { "switched to RRH" } else { "disconnected from RRH" }
        );
    }

    /// Send one request if attached
    pub async fn step(&self) -> StepOutcome {
        let value = {
            let session = self.session.lock();
            if !session.attached {
                return StepOutcome::Detached;
            }
            session.value
        };

        let sent = self
            .client
            .get(&self.rrh_url)
            .query(&[("ue_id", self.ue_id.value().to_string()), ("value", value.to_string())])
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let mut session = self.session.lock();
                if session.rrh_reachable {
                    warn!("{}: RRH unreachable at value {}: {}", self.ue_id, session.value, e);
                }
                session.rrh_reachable = false;
                session.value = 0;
                return StepOutcome::Unreachable;
            }
        };

        self.session.lock().rrh_reachable = true;
        let status = response.status();
        if !status.is_success() {
            debug!("{}: request {} refused with {}", self.ue_id, value, status);
            return StepOutcome::Refused(status.as_u16());
        }

        match response.json::<Acknowledgement>().await {
            Ok(ack) => {
                self.session.lock().value = value + 1;
                debug!("{}: Ack#{} from {}", self.ue_id, value, ack.vbbu_id);
                StepOutcome::Acknowledged {
                    vbbu_id: ack.vbbu_id,
                    value,
                }
            }
            Err(e) => {
                warn!("{}: unreadable acknowledgement: {}", self.ue_id, e);
                StepOutcome::Refused(status.as_u16())
            }
        }
    }

    fn next_pause(&self) -> Duration {
        let (min, max) = self.interval_ms;
        let ms = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        Duration::from_millis(ms)
    }

    /// Generate traffic forever
    pub async fn run_traffic(self: Arc<Self>) {
        loop {
            self.step().await;
            tokio::time::sleep(self.next_pause()).await;
        }
    }

    /// Serve the management endpoint and generate traffic
    pub async fn run(self: Arc<Self>, mgmt_addr: SocketAddr) -> Result<(), NodeError> {
        let listener = TcpListener::bind(mgmt_addr).await?;
        info!(
            "Starting UE client {}, management on {}, RRH at {}",
            self.ue_id,
            listener.local_addr()?,
            self.rrh_url
        );

        let app = router(self.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("UE management endpoint stopped: {}", e);
            }
        });

        self.run_traffic().await;
        Ok(())
    }
}

/// Management router: `/add` and `/remove`
pub fn router(ue: Arc<UeClient>) -> Router {
    Router::new()
        .route("/add", get(add))
        .route("/remove", get(remove))
        .with_state(ue)
}

async fn add(State(ue): State<Arc<UeClient>>) -> StatusCode {
    ue.set_attached(true);
    StatusCode::OK
}

async fn remove(State(ue): State<Arc<UeClient>>) -> StatusCode {
    ue.set_attached(false);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::Json;
    use serde_json::json;
    use std::collections::HashMap;

    async fn spawn_rrh_stub() -> SocketAddr {
        let app = Router::new().route(
            "/",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let value = params.get("value").cloned().unwrap_or_default();
                Json(json!({
                    "vbbu_id": "vbbu1",
                    "acknowledgement": format!("Acknowledgement #{}", value)
                }))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn config(rrh_addr: SocketAddr) -> UeConfig {
        UeConfig {
            ue_id: UeId(3),
            mgmt_addr: "127.0.0.1:0".parse().unwrap(),
            rrh_addr,
            interval_ms: (1500, 3000),
            request_timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn test_counter_advances_on_ack() {
        let rrh = spawn_rrh_stub().await;
        let ue = UeClient::new(&config(rrh)).unwrap();

        assert_eq!(ue.step().await, StepOutcome::Detached);

        ue.set_attached(true);
        assert_eq!(
            ue.step().await,
            StepOutcome::Acknowledged {
                vbbu_id: "vbbu1".into(),
                value: 0
            }
        );
        assert_eq!(
            ue.step().await,
            StepOutcome::Acknowledged {
                vbbu_id: "vbbu1".into(),
                value: 1
            }
        );

        ue.set_attached(false);
        ue.set_attached(true);
        assert!(matches!(ue.step().await, StepOutcome::Acknowledged { value: 0, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_rrh_resets_counter() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap();
        drop(listener);

        let ue = UeClient::new(&config(dead)).unwrap();
        ue.set_attached(true);
        assert_eq!(ue.step().await, StepOutcome::Unreachable);
        assert_eq!(ue.session.lock().value, 0);
    }

    #[tokio::test]
    async fn test_management_endpoint() {
        let ue = Arc::new(UeClient::new(&config("127.0.0.1:9".parse().unwrap())).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(ue.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let response = reqwest::get(format!("http://{}/add", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(ue.is_attached());

        reqwest::get(format!("http://{}/remove", addr)).await.unwrap();
        assert!(!ue.is_attached());

        let missing = reqwest::get(format!("http://{}/other", addr)).await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
