//! Periodic assignment reporting to the orchestrator

use super::{RrhConfig, RrhProxy};
use interfaces::channel::CommandClient;
use interfaces::message_types::OrchestratorCommand;
use interfaces::InterfaceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Pushes the connected UEs' routes on a fixed period
pub struct AssignmentReporter {
    proxy: Arc<RrhProxy>,
    orchestrator: CommandClient,
    period: Duration,
}

impl AssignmentReporter {
    pub fn new(proxy: Arc<RrhProxy>, config: &RrhConfig) -> Self {
        Self {
            proxy,
            orchestrator: CommandClient::new(config.orchestrator_addr, config.report_timeout),
            period: config.report_period,
        }
    }

    /// Send one report
    pub async fn report_once(&self) -> Result<usize, InterfaceError> {
        let assignments = self.proxy.connected_assignments();
        let count = assignments.len();
        self.orchestrator
            .request_value(&OrchestratorCommand::ReportAssignments { assignments })
            .await?;
        Ok(count)
    }

    /// Report immediately, then every period; failures wait for the next tick
    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.report_once().await {
                Ok(count) => debug!("Sent {} UE assignments to orchestrator", count),
                Err(e) => warn!("Failed to report assignments: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrh::tests::test_config;
    use common::types::{UeId, UeLinkState};
    use interfaces::message_types::decode_command;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_report_contains_connected_ues_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config("10.0.0.201:8080".parse().unwrap());
        config.orchestrator_addr = listener.local_addr().unwrap();

        let proxy = Arc::new(RrhProxy::new(&config).unwrap());
        proxy.set_link(Ipv4Addr::new(127, 0, 0, 2), UeLinkState::Connected);
        let reporter = AssignmentReporter::new(proxy, &config);

        let orchestrator = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).await.unwrap();
            reader
                .get_mut()
                .write_all(b"{\"status\":\"ok\",\"applied\":1}\n")
                .await
                .unwrap();
            decode_command::<OrchestratorCommand>(&line).unwrap()
        });

        assert_eq!(reporter.report_once().await.unwrap(), 1);
        match orchestrator.await.unwrap() {
            OrchestratorCommand::ReportAssignments { assignments } => {
                assert_eq!(assignments.len(), 1);
                assert_eq!(assignments[0].ue_id, UeId(2));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_orchestrator_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config("10.0.0.201:8080".parse().unwrap());
        config.orchestrator_addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = Arc::new(RrhProxy::new(&config).unwrap());
        let reporter = AssignmentReporter::new(proxy, &config);
        assert!(reporter.report_once().await.unwrap_err().is_unreachable());
    }
}
