//! HTTP Control Calls
//!
//! The orchestrator drives vBBU activation through `GET /control` and UE
//! attachment through the UE management endpoint.

use crate::InterfaceError;
use common::types::Endpoint;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

/// vBBU control action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VbbuAction {
    Activate,
    Deactivate,
}

impl VbbuAction {
    /// Query parameter selecting the action
    pub fn query(&self) -> (&'static str, &'static str) {
        match self {
            Self::Activate => ("activate", "1"),
            Self::Deactivate => ("deactivate", "1"),
        }
    }

    pub fn target_state(&self) -> bool {
        matches!(self, Self::Activate)
    }
}

/// UE management action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeAction {
    Add,
    Remove,
}

impl UeAction {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Add => "/add",
            Self::Remove => "/remove",
        }
    }
}

/// Client for the HTTP control surfaces
#[derive(Debug, Clone)]
pub struct HttpControlClient {
    client: reqwest::Client,
}

impl HttpControlClient {
    pub fn new(timeout: Duration) -> Result<Self, InterfaceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InterfaceError::MalformedMessage(e.to_string()))?;
        Ok(Self { client })
    }

    /// Issue an activation or deactivation call to a vBBU
    ///
    /// Only a 2xx response counts as success.
    pub async fn vbbu_control(&self, vbbu: Endpoint, action: VbbuAction) -> Result<(), InterfaceError> {
        let url = format!("{}/control", vbbu.http_url());
        debug!("vBBU control {:?} -> {}", action, url);

        let response = self
            .client
            .get(&url)
            .query(&[action.query()])
            .send()
            .await
            .map_err(|e| map_transport_error(&url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(InterfaceError::Rejected(format!("{} returned {}", url, status)))
        }
    }

    /// Ask a UE to attach or detach
    ///
    /// Only a 200 response counts as success.
    pub async fn ue_manage(&self, ue_ip: IpAddr, port: u16, action: UeAction) -> Result<(), InterfaceError> {
        let url = format!("{}{}", Endpoint::new(ue_ip, port).http_url(), action.path());
        debug!("UE management {:?} -> {}", action, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_transport_error(&url, e))?;

        if response.status() == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(InterfaceError::Rejected(format!("{} returned {}", url, response.status())))
        }
    }
}

fn map_transport_error(url: &str, e: reqwest::Error) -> InterfaceError {
    if e.is_timeout() {
        InterfaceError::Timeout(url.to_string())
    } else {
        InterfaceError::PeerUnreachable {
            peer: url.to_string(),
            reason: e.to_string(),
        }
    }
}
