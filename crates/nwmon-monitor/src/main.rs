//! CLI entry point for the nwmon monitor.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, EnvFilter};

use nwmon_store::{JsonFileStore, StateStore};

use nwmon_monitor::commands::ControlCommand;
use nwmon_monitor::config::MonitorConfig;
use nwmon_monitor::coordinator::Coordinator;
use nwmon_monitor::dispatch::ServiceDispatcher;
use nwmon_monitor::enrich::{HostEnricher, SystemEnricher};
use nwmon_monitor::probe::{IcmpProber, Probe, ProbeCapability};
use nwmon_monitor::scanner::Scanner;
use nwmon_monitor::scheduler::MonitorScheduler;

#[derive(Parser)]
#[command(name = "nwmon")]
#[command(about = "Host discovery and reachability monitor")]
struct Cli {
    /// Run one full scan on every instance, print the snapshots and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled scans and stdin commands.
    #[arg(long)]
    daemon: bool,

    /// Config file prefix (default: nwmon).
    #[arg(short, long, default_value = "nwmon")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    if !cli.once && !cli.daemon {
        anyhow::bail!("Specify --once (one-shot scan) or --daemon (scheduled monitoring)");
    }

    let config = load_monitor_config(&cli.config)?;
    config.validate()?;
    if config.instances.is_empty() {
        anyhow::bail!(
            "No instances configured: add [[monitor.instances]] to {}.toml",
            cli.config
        );
    }

    let capability = ProbeCapability::detect();
    let coordinators = build_coordinators(&config, &capability).await?;
    let dispatcher = Arc::new(ServiceDispatcher::new(coordinators));

    if cli.once {
        dispatcher.full_scan().await;
        println!("{}", serde_json::to_string_pretty(&dispatcher.snapshots())?);
    } else {
        run_daemon(dispatcher).await?;
    }

    Ok(())
}

fn load_monitor_config(file_prefix: &str) -> anyhow::Result<MonitorConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NWMON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<MonitorConfig>("monitor") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(MonitorConfig::default()),
        Err(e) => Err(e.into()),
    }
}

async fn build_coordinators(
    config: &MonitorConfig,
    capability: &ProbeCapability,
) -> anyhow::Result<Vec<Arc<Coordinator>>> {
    let enricher: Arc<dyn HostEnricher> = Arc::new(SystemEnricher::new(config.dns_timeout()));
    let mut coordinators = Vec::with_capacity(config.instances.len());

    for instance in &config.instances {
        let prober: Arc<dyn Probe> = Arc::new(IcmpProber::new(capability, instance.probe_timeout()));
        let scanner = Arc::new(Scanner::new(
            prober,
            enricher.clone(),
            config.max_concurrent_probes,
        ));
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(config.state_path(&instance.name)));

        let coordinator = Coordinator::new(
            instance,
            scanner,
            store,
            config.max_hosts_per_range,
            config.event_capacity,
        )?;
        coordinator.load().await;

        tracing::info!(
            instance = %coordinator.name(),
            addresses = coordinator.target_count(),
            full_scan_minutes = instance.full_scan_interval_minutes,
            quick_check_minutes = instance.quick_check_interval_minutes,
            "Instance ready"
        );
        coordinators.push(Arc::new(coordinator));
    }

    Ok(coordinators)
}

async fn run_daemon(dispatcher: Arc<ServiceDispatcher>) -> anyhow::Result<()> {
    for coordinator in dispatcher.instances() {
        spawn_event_logger(coordinator.clone());
    }
    let scheduler = MonitorScheduler::new(dispatcher.instances().to_vec());
    let loops = scheduler.spawn();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                tracing::info!("Shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_command_line(&dispatcher, &line),
                Ok(None) => {
                    tracing::debug!("stdin closed, commands disabled");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read command, commands disabled");
                    stdin_open = false;
                }
            },
        }
    }

    for handle in loops {
        handle.abort();
    }
    Ok(())
}

fn handle_command_line(dispatcher: &Arc<ServiceDispatcher>, line: &str) {
    let command = match ControlCommand::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring command");
            return;
        }
    };

    let dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        match command.execute(&dispatcher).await {
            Ok(output) => println!("{output}"),
            Err(e) => tracing::warn!(command = ?command, error = %e, "Command failed"),
        }
    });
}

fn spawn_event_logger(coordinator: Arc<Coordinator>) {
    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    event_id = %event.id.0,
                    instance = %event.instance,
                    event_type = event.payload.name(),
                    identifier = %event.payload.identifier(),
                    payload = %serde_json::to_string(&event.payload).unwrap_or_default(),
                    "Device event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(instance = %coordinator.name(), skipped, "Event logger lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
