//! netadapter - OneWire NetAdapter discovery and connectivity tool
//!
//! Finds adapter hosts on the local segment, advertises one, or checks that
//! a host answers on its command stream.

mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use netadapter_connector::{handshake, Connector, ConnectorError, StreamConnector};
use netadapter_discovery::{collect, DiscoveryRecord, DiscoveryResponder};
use netadapter_protocol::Command;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netadapter")]
#[command(about = "Discover and probe OneWire NetAdapter hosts")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "NETADAPTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Multicast a beacon and list the adapter hosts that answer
    Discover {
        /// Print records as JSON
        #[arg(long)]
        json: bool,

        /// Reply wait in milliseconds (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Answer discovery beacons until Ctrl+C
    Respond {
        /// Port advertised to collectors (defaults to network.port)
        #[arg(short, long)]
        listen_port: Option<u16>,
    },

    /// Connect to an adapter host and send a ping
    Ping {
        /// Host address, `host` or `host:port`
        addr: String,
    },

    /// Print the effective configuration as YAML
    ShowConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Discover { json, timeout_ms } => discover(&config, json, timeout_ms).await,
        Commands::Respond { listen_port } => {
            respond(&config, listen_port.unwrap_or(config.network.port)).await
        }
        Commands::Ping { addr } => ping(&config, &addr).await,
        Commands::ShowConfig { output } => show_config(&config, output),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn discover(
    config: &Config,
    json: bool,
    timeout_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut collector = config.discovery.collector_config();
    if let Some(ms) = timeout_ms {
        collector = collector.with_timeout(Duration::from_millis(ms));
    }

    let records = collect(&collector).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No adapter hosts found".yellow());
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &DiscoveryRecord) {
    println!(
        "{} {} (port {})",
        "Found".green(),
        record.address.cyan(),
        record.listen_port
    );
}

async fn respond(config: &Config, listen_port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let responder =
        DiscoveryResponder::for_adapter_host(listen_port, config.discovery.responder_config());
    responder.start().await?;

    eprintln!(
        "{} port {} on {}:{}",
        "Advertising".green(),
        listen_port.to_string().cyan(),
        config.discovery.group,
        config.discovery.port
    );
    eprintln!("{}", "Press Ctrl+C to stop...".dimmed());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping responder...");
    responder.stop().await;
    Ok(())
}

async fn ping(config: &Config, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let connector_config = config.network.connector_config(addr);
    let started = Instant::now();

    let mut conn = StreamConnector::connect(&connector_config).await?;
    let result: Result<(), ConnectorError> = async {
        handshake::accept(&mut conn).await?;
        conn.write_command(Command::PingConnection).await?;
        conn.flush().await?;
        conn.expect_success().await
    }
    .await;
    let _ = conn.close().await;
    result?;

    println!(
        "{} from {} in {:?}",
        "PONG".green(),
        connector_config.addr.cyan(),
        started.elapsed()
    );
    Ok(())
}

fn show_config(config: &Config, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            config.save(&path)?;
            eprintln!("{} {}", "Wrote".green(), path.display().to_string().cyan());
        }
        None => print!("{}", serde_yaml::to_string(config)?),
    }
    Ok(())
}
