//! Proxy control channel service

use super::{router, AssignmentReporter, RrhConfig, RrhProxy};
use crate::NodeError;
use async_trait::async_trait;
use common::types::UeLinkState;
use interfaces::channel::{CommandHandler, CommandServer};
use interfaces::message_types::{Ack, ProxyCommand, ProxyHandoverReply, ReplyStatus};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Applies routing commands pushed by the orchestrator
pub struct RrhService {
    proxy: Arc<RrhProxy>,
}

impl RrhService {
    pub fn new(proxy: Arc<RrhProxy>) -> Self {
        Self { proxy }
    }

    /// Serve the data path, the control channel and the assignment reporter
    pub async fn run(self, config: &RrhConfig) -> Result<(), NodeError> {
        let control = CommandServer::bind(config.control_addr, config.read_timeout).await?;
        info!("RRH command listener started on {}", control.local_addr()?);

        let reporter = AssignmentReporter::new(self.proxy.clone(), config);
        tokio::spawn(reporter.run());

        let listener = TcpListener::bind(config.data_addr).await?;
        info!("RRH proxy started on {}", listener.local_addr()?);
        let app = router(self.proxy.clone());
        tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
            if let Err(e) = served {
                error!("RRH data path stopped: {}", e);
            }
        });

        control.run(Arc::new(self)).await?;
        Ok(())
    }

    fn apply(&self, command: ProxyCommand, peer: SocketAddr) -> Result<Value, serde_json::Error> {
        let addressing = self.proxy.addressing();
        match command {
            ProxyCommand::Handover(request) => {
                let ue_ip = addressing.ip_for(request.ue_id);
                let target = request.target();
                self.proxy.set_route(ue_ip, target);
                info!("Handover from {}: {} -> {}", peer.ip(), request.ue_id, target);

                serde_json::to_value(ProxyHandoverReply {
                    status: ReplyStatus::Ok,
                    ue_id: request.ue_id,
                    ue_ip,
                    new_target: target,
                    from: peer.ip(),
                })
            }
            ProxyCommand::UpdateRedirect { from_vbbu, to_vbbu } => {
                self.proxy.set_redirect(from_vbbu, to_vbbu);
                info!("Redirect rule: {} -> {}", from_vbbu, to_vbbu);
                serde_json::to_value(Ack::ok("Redirect rule updated"))
            }
            ProxyCommand::UeConnect { ue_id } => {
                self.proxy.set_link(addressing.ip_for(ue_id), UeLinkState::Connected);
                info!("{} connected", ue_id);
                serde_json::to_value(Ack::ok("UE connected"))
            }
            ProxyCommand::UeDisconnect { ue_id } => {
                self.proxy
                    .set_link(addressing.ip_for(ue_id), UeLinkState::Disconnected);
                info!("{} disconnected", ue_id);
                serde_json::to_value(Ack::ok("UE disconnected"))
            }
        }
    }
}

#[async_trait]
impl CommandHandler for RrhService {
    type Command = ProxyCommand;

    async fn handle(&self, command: ProxyCommand, peer: SocketAddr) -> Value {
        self.apply(command, peer).unwrap_or_else(|e| {
            error!("Failed to encode reply: {}", e);
            serde_json::json!({"status": "error", "message": "Internal failure"})
        })
    }
}
