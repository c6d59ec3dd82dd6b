//! Control Plane Seam
//!
//! Outbound calls made by the orchestrator: routing pushes to the RRH proxy,
//! activation calls to vBBUs and attach/detach calls to UEs.

use async_trait::async_trait;
use common::types::{Endpoint, UeId};
use common::utils::UeAddressing;
use interfaces::channel::CommandClient;
use interfaces::http_control::{HttpControlClient, UeAction, VbbuAction};
use interfaces::message_types::ProxyCommand;
use interfaces::InterfaceError;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Outbound control interface of the orchestrator
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Push a routing command to the proxy control channel
    async fn push_to_proxy(&self, command: &ProxyCommand) -> Result<(), InterfaceError>;

    /// Activate or deactivate a vBBU
    async fn vbbu_control(&self, vbbu: Endpoint, action: VbbuAction) -> Result<(), InterfaceError>;

    /// Attach or detach a UE
    async fn ue_manage(&self, ue: UeId, action: UeAction) -> Result<(), InterfaceError>;
}

/// Control plane speaking to real peers over TCP and HTTP
pub struct RemoteControlPlane {
    proxy: CommandClient,
    http: HttpControlClient,
    ue_addressing: UeAddressing,
    ue_mgmt_port: u16,
}

impl RemoteControlPlane {
    pub fn new(
        proxy_control: SocketAddr,
        push_timeout: Duration,
        control_timeout: Duration,
        ue_addressing: UeAddressing,
        ue_mgmt_port: u16,
    ) -> Result<Self, InterfaceError> {
        Ok(Self {
            proxy: CommandClient::new(proxy_control, push_timeout),
            http: HttpControlClient::new(control_timeout)?,
            ue_addressing,
            ue_mgmt_port,
        })
    }
}

#[async_trait]
impl ControlPlane for RemoteControlPlane {
    async fn push_to_proxy(&self, command: &ProxyCommand) -> Result<(), InterfaceError> {
        let reply = self.proxy.request_value(command).await?;
        debug!("Proxy replied: {}", reply);
        Ok(())
    }

    async fn vbbu_control(&self, vbbu: Endpoint, action: VbbuAction) -> Result<(), InterfaceError> {
        self.http.vbbu_control(vbbu, action).await
    }

    async fn ue_manage(&self, ue: UeId, action: UeAction) -> Result<(), InterfaceError> {
        let ip = IpAddr::V4(self.ue_addressing.ip_for(ue));
        self.http.ue_manage(ip, self.ue_mgmt_port, action).await
    }
}
