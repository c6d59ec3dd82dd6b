//! Periodic load reporting to the orchestrator

use super::{VbbuAgent, VbbuConfig};
use interfaces::channel::CommandClient;
use interfaces::message_types::{LoadReport, OrchestratorCommand};
use interfaces::InterfaceError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

pub struct LoadReporter {
    agent: Arc<VbbuAgent>,
    orchestrator: CommandClient,
    advertised_ip: Option<IpAddr>,
    period: Duration,
    window: Duration,
}

impl LoadReporter {
    pub fn new(agent: Arc<VbbuAgent>, config: &VbbuConfig) -> Self {
        Self {
            agent,
            orchestrator: CommandClient::new(config.orchestrator_addr, config.report_timeout),
            advertised_ip: config.advertised_ip,
            period: config.report_period,
            window: config.activity_window,
        }
    }

    /// Build the next report, or `None` while the agent is inactive
    pub fn next_report(&self, now: Instant) -> Option<LoadReport> {
        if !self.agent.state().is_active() {
            return None;
        }
        let (connections, utilization) = self.agent.sample_load(now, self.window);
        Some(LoadReport {
            vbbu_ip: self.advertised_ip,
            cpu: utilization,
            connections,
        })
    }

    async fn send(&self, report: LoadReport) -> Result<(), InterfaceError> {
        self.orchestrator
            .request_value(&OrchestratorCommand::ReportLoad(report))
            .await?;
        Ok(())
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(report) = self.next_report(Instant::now()) else {
                debug!("{} inactive, skipping load report", self.agent.name());
                continue;
            };
            match self.send(report).await {
                Ok(()) => debug!(
                    "Sent load: {} users ({:.1}% utilization)",
                    report.connections, report.cpu
                ),
                Err(e) => warn!("Failed to report load: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vbbu::tests::test_config;
    use common::types::ActivationState;

    #[test]
    fn test_no_report_while_inactive() {
        let config = test_config(ActivationState::Inactive);
        let agent = Arc::new(VbbuAgent::new(&config));
        let reporter = LoadReporter::new(agent.clone(), &config);

        assert!(reporter.next_report(Instant::now()).is_none());

        agent.set_state(ActivationState::Active);
        let report = reporter.next_report(Instant::now()).unwrap();
        assert_eq!(report.connections, 0);
        assert_eq!(report.vbbu_ip, Some("10.0.0.201".parse().unwrap()));
    }

    #[test]
    fn test_stale_ues_drop_out_of_report() {
        let config = test_config(ActivationState::Active);
        let agent = Arc::new(VbbuAgent::new(&config));
        let reporter = LoadReporter::new(agent.clone(), &config);

        let start = Instant::now();
        agent.serve(1, 0, start).unwrap();
        agent.serve(2, 0, start + Duration::from_secs(4)).unwrap();

        let report = reporter.next_report(start + Duration::from_secs(6)).unwrap();
        assert_eq!(report.connections, 1);
        assert_eq!(report.cpu, 10.0);
    }
}
