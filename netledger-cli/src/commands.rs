use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use netledger_config::NetledgerConfig;
use netledger_telemetry::{EventLogger, MetricsRecorder};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file; defaults to config/netledger.yaml plus environment
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture from an interface, persist packets and serve the read API
    Run(RunArgs),
    /// Create the packet table if it does not exist, then exit
    InitSchema,
    /// List capture-capable interfaces
    Devices,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[arg(short, long)]
    pub interface: Option<String>,

    /// BPF filter expression; an empty string disables filtering
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Mirror every captured frame to this pcap file
    #[arg(short, long)]
    pub mirror: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut NetledgerConfig) {
        if let Some(interface) = &self.interface {
            config.capture.interface = interface.clone();
        }
        if let Some(filter) = &self.filter {
            config.capture.filter = filter.clone();
        }
        if let Some(mirror) = &self.mirror {
            config.capture.mirror_file = Some(mirror.display().to_string());
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<NetledgerConfig> {
    match path {
        Some(path) => NetledgerConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => NetledgerConfig::load().context("Failed to load configuration"),
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_ref())?;
    EventLogger::init(&config.telemetry.log_level);

    match cli.command {
        Commands::Run(args) => run(config, args).await,
        Commands::InitSchema => {
            netledger_engine::init_schema(&config).await?;
            info!(database = %config.storage.database, "Schema ready");
            Ok(())
        }
        Commands::Devices => {
            for device in netledger_capture::list_devices()? {
                if device.description.is_empty() {
                    println!("{}", device.name);
                } else {
                    println!("{}\t{}", device.name, device.description);
                }
            }
            Ok(())
        }
    }
}

async fn run(mut config: NetledgerConfig, args: RunArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let metrics = MetricsRecorder::new().context("Failed to register metrics")?;
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!("Cannot listen for ctrl-c: {e}"),
        }
        signal_cancel.cancel();
    });

    let summary = netledger_engine::run_production_mode(config, metrics, cancel).await?;
    info!(
        frames = summary.capture.frames_captured,
        persisted = summary.accumulator.packets_persisted,
        "Shutdown complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_overrides() {
        let cli = Cli::parse_from([
            "netledger",
            "--config",
            "prod.yaml",
            "run",
            "--interface",
            "enp18s0",
            "--filter",
            "tcp port 443",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("prod.yaml")));

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = NetledgerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.capture.interface, "enp18s0");
        assert_eq!(config.capture.filter, "tcp port 443");
        assert_eq!(config.capture.mirror_file, None);
    }

    #[test]
    fn empty_filter_override_disables_filtering() {
        let cli = Cli::parse_from(["netledger", "run", "--filter", "", "--mirror", "out.pcap"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = NetledgerConfig::default();
        args.apply(&mut config);
        assert_eq!(config.capture.filter, "");
        assert_eq!(config.capture.mirror_file.as_deref(), Some("out.pcap"));
    }

    #[test]
    fn parses_maintenance_commands() {
        assert!(matches!(
            Cli::parse_from(["netledger", "init-schema"]).command,
            Commands::InitSchema
        ));
        assert!(matches!(
            Cli::parse_from(["netledger", "devices"]).command,
            Commands::Devices
        ));
    }
}
