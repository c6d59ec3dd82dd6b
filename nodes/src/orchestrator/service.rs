//! Orchestrator command channel service

use super::{api, Orchestrator, OrchestratorConfig};
use crate::NodeError;
use async_trait::async_trait;
use interfaces::channel::{CommandHandler, CommandServer};
use interfaces::message_types::{Ack, OrchestratorCommand};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Dispatches decoded orchestrator commands
pub struct OrchestratorService {
    orchestrator: Arc<Orchestrator>,
}

impl OrchestratorService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Serve the command channel, and the HTTP mirror when configured
    pub async fn run(self, config: &OrchestratorConfig) -> Result<(), NodeError> {
        let server = CommandServer::bind(config.listen_addr, config.read_timeout).await?;
        info!("Orchestrator listening on {}", server.local_addr()?);

        if let Some(api_addr) = config.api_addr {
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                if let Err(e) = api::serve(api_addr, orchestrator).await {
                    error!("HTTP mirror stopped: {}", e);
                }
            });
        }

        server.run(Arc::new(self)).await?;
        Ok(())
    }
}

fn to_reply<T: Serialize>(result: Result<T, NodeError>) -> Value {
    let encoded = match result {
        Ok(value) => serde_json::to_value(value),
        Err(e) => serde_json::to_value(Ack::error(e.to_string())),
    };
    encoded.unwrap_or_else(|e| {
        error!("Failed to encode reply: {}", e);
        serde_json::json!({"status": "error", "message": "Internal failure"})
    })
}

#[async_trait]
impl CommandHandler for OrchestratorService {
    type Command = OrchestratorCommand;

    async fn handle(&self, command: OrchestratorCommand, peer: SocketAddr) -> Value {
        let orch = &self.orchestrator;
        match command {
            OrchestratorCommand::Handover(request) => to_reply(Ok(orch.handover(request).await)),
            OrchestratorCommand::Migrate { from_vbbu } => to_reply(orch.migrate(from_vbbu).await),
            OrchestratorCommand::ReportLoad(report) => {
                orch.report_load(report, peer.ip());
                to_reply(Ok(Ack::ok("Load received")))
            }
            OrchestratorCommand::ReportAssignments { assignments } => {
                to_reply(Ok(orch.report_assignments(&assignments)))
            }
            OrchestratorCommand::GetAssignments => to_reply(Ok(orch.get_assignments())),
            OrchestratorCommand::GetLoads => to_reply(Ok(orch.get_loads())),
            OrchestratorCommand::GetVbbus => to_reply(Ok(orch.get_vbbus())),
        }
    }
}
