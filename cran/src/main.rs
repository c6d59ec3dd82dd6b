//! COMIC-RAN Mobility Emulator
//!
//! Single binary for every node of the emulated C-RAN: orchestrator, RRH proxy,
//! vBBU agent and UE traffic generator. The role is picked by subcommand.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::types::UeId;
use common::utils::UeAddressing;
use config::{CranConfig, VbbuOverrides};
use nodes::orchestrator::{Orchestrator, OrchestratorService, RemoteControlPlane};
use nodes::rrh::{RrhProxy, RrhService};
use nodes::ue::UeClient;
use nodes::vbbu::VbbuAgent;
use std::fs::OpenOptions;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// COMIC-RAN mobility emulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Run the orchestrator command channel and HTTP mirror
    Orchestrator,
    /// Run the RRH proxy
    Rrh,
    /// Run a vBBU agent
    Vbbu {
        /// Pool entry to run as
        #[arg(long)]
        name: Option<String>,
        /// HTTP port; selects the pool entry when no name is given
        #[arg(long)]
        port: Option<u16>,
        /// Start inactive regardless of the pool entry
        #[arg(long)]
        inactive: bool,
        /// UEs served at 100% utilization
        #[arg(long)]
        capacity: Option<u32>,
    },
    /// Run a UE traffic generator
    Ue {
        /// UE number (1-based)
        #[arg(long)]
        id: u8,
        /// RRH address override
        #[arg(long)]
        rrh: Option<IpAddr>,
    },
}

fn init_logging(level: &str, filename: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match filename {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .init();
        }
    }
    Ok(())
}

async fn run_orchestrator(config: &CranConfig) -> Result<()> {
    let orch_config = config.orchestrator_config();
    let control = RemoteControlPlane::new(
        config.rrh_control_endpoint(),
        Duration::from_millis(config.timeouts.push_ms),
        Duration::from_millis(config.timeouts.control_ms),
        UeAddressing::new(config.ue.subnet),
        config.ue.mgmt_port,
    )?;

    info!("vBBU pool:");
    for vbbu in &orch_config.vbbus {
        info!(
            "  {} at {}:{} ({})",
            vbbu.name,
            vbbu.ip,
            vbbu.port,
            if vbbu.active { "active" } else { "inactive" }
        );
    }

    let orchestrator = Arc::new(Orchestrator::new(&orch_config, Arc::new(control)));
    OrchestratorService::new(orchestrator).run(&orch_config).await?;
    Ok(())
}

async fn run_rrh(config: &CranConfig) -> Result<()> {
    let rrh_config = config.rrh_config();
    info!("Default vBBU: {}", rrh_config.default_vbbu);
    info!("Orchestrator: {}", rrh_config.orchestrator_addr);

    let proxy = Arc::new(RrhProxy::new(&rrh_config)?);
    RrhService::new(proxy).run(&rrh_config).await?;
    Ok(())
}

async fn run_vbbu(config: &CranConfig, overrides: &VbbuOverrides) -> Result<()> {
    let vbbu_config = config.vbbu_config(overrides)?;
    let agent = Arc::new(VbbuAgent::new(&vbbu_config));
    agent.run(&vbbu_config).await?;
    Ok(())
}

async fn run_ue(config: &CranConfig, id: u8, rrh: Option<IpAddr>) -> Result<()> {
    let ue_config = config.ue_config(UeId::new(id), rrh)?;
    let ue = Arc::new(UeClient::new(&ue_config)?);
    ue.run(ue_config.mgmt_addr).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, loaded) = CranConfig::from_toml_file(&args.config)?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.log.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let log_file = args.log_file.clone().or_else(|| config.log.filename.clone());
    init_logging(&level, log_file.as_deref())?;

    info!("Starting COMIC-RAN {:?}", args.role);
    if loaded {
        info!("Configuration file: {}", args.config);
    } else {
        warn!("Configuration file {} not found, using defaults", args.config);
    }

    let node = async {
        match &args.role {
            Role::Orchestrator => run_orchestrator(&config).await,
            Role::Rrh => run_rrh(&config).await,
            Role::Vbbu {
                name,
                port,
                inactive,
                capacity,
            } => {
                let overrides = VbbuOverrides {
                    name: name.clone(),
                    port: *port,
                    inactive: *inactive,
                    capacity: *capacity,
                };
                run_vbbu(&config, &overrides).await
            }
            Role::Ue { id, rrh } => run_ue(&config, *id, *rrh).await,
        }
    };

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = node => {
            result?;
            warn!("Node stopped unexpectedly");
        }
    }

    info!("COMIC-RAN shutdown complete");
    Ok(())
}
