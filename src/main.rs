//! eventlink - resilient duplex WebSocket client
//!
//! Command-line entry point: watch a server's event stream or run one
//! request/response exchange against it.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use regex::Regex;
use tracing::{debug, info, warn};

use eventlink::client::{ClientEvent, DuplexClient};
use eventlink::config::{self, EventlinkConfig};
use eventlink::error::Error;
use eventlink::{logging, version, NOT_CONNECTED};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        std::process::exit(report(&err));
    }
}

/// Print a failure and pick the exit code
fn report(err: &anyhow::Error) -> i32 {
    let known = err
        .downcast_ref::<Error>()
        .or_else(|| err.downcast_ref::<Arc<Error>>().map(|e| e.as_ref()));

    match known {
        Some(e) => {
            eprint!("{}", e.format_for_terminal());
            e.exit_code()
        }
        None => {
            eprintln!("Error: {:#}", err);
            1
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that don't need full logging
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let config = EventlinkConfig::load(cli.config.as_deref())?;

    // Guards must outlive the runtime so file logs are flushed
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    debug!(version = %build.full_version(), target = %build.target, "Starting eventlink");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("eventlink")
        .build()
        .context("Failed to create async runtime")?;

    match cli.command {
        Commands::Watch { uri, heartbeat } => runtime.block_on(watch(config, uri, heartbeat)),
        Commands::Send {
            command,
            uri,
            expect,
            timeout_ms,
        } => runtime.block_on(send(config, command, uri, expect, timeout_ms)),
        Commands::Version | Commands::Config { .. } => unreachable!("handled before runtime start"),
    }
}

/// URI from the command line, else from configuration
fn resolve_uri(cli_uri: Option<String>, config: &EventlinkConfig) -> anyhow::Result<String> {
    let uri = cli_uri
        .or_else(|| config.session.uri.clone())
        .ok_or_else(|| anyhow!("No server URI: pass --uri or set [session] uri"))?;

    if !uri.starts_with("ws://") && !uri.starts_with("wss://") {
        return Err(Error::config_field_invalid("uri", "URI must start with ws:// or wss://").into());
    }
    Ok(uri)
}

/// The client's recorded failure, or a generic one
fn client_failure(client: &DuplexClient, fallback: &str) -> anyhow::Error {
    match client.last_error() {
        Some(err) => anyhow::Error::new(err),
        None => anyhow!(fallback.to_string()),
    }
}

/// Connect and print every inbound message until Ctrl-C
async fn watch(
    config: EventlinkConfig,
    uri: Option<String>,
    heartbeat: Option<String>,
) -> anyhow::Result<()> {
    let uri = resolve_uri(uri, &config)?;
    let heartbeat = heartbeat.or_else(|| config.session.heartbeat.clone());

    let client_config = config.client.to_client_config();
    let connect_timeout = client_config.connect_timeout;
    let auto_reconnect = client_config.auto_reconnect;

    let client = DuplexClient::new(client_config);
    client.set_cookies(config.session.cookies());
    let mut events = client.subscribe();

    if !client.connect(&uri, heartbeat.as_deref(), connect_timeout).await && !auto_reconnect {
        return Err(client_failure(&client, "Connection failed"));
    }

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ClientEvent::Response(text)) => println!("{}", text),
                Some(ClientEvent::StateChanged { is_connected, status }) => {
                    info!(connected = is_connected, status = %status, "Connection state changed");
                }
                Some(ClientEvent::ConnectionClosed { uri, .. }) => {
                    if auto_reconnect {
                        warn!(uri = %uri, "Connection lost; waiting for reconnect");
                    } else {
                        warn!(uri = %uri, "Connection lost");
                        break;
                    }
                }
                Some(ClientEvent::Error(text)) => warn!("{}", text),
                None => break,
            },
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Run one exchange and print the reply
async fn send(
    config: EventlinkConfig,
    command: String,
    uri: Option<String>,
    expect: Option<String>,
    timeout_ms: u64,
) -> anyhow::Result<()> {
    let uri = resolve_uri(uri, &config)?;
    let pattern = expect
        .map(|p| Regex::new(&p).with_context(|| format!("Invalid --expect pattern '{}'", p)))
        .transpose()?;

    // One exchange needs neither the background loop nor reconnects
    let mut client_config = config.client.to_client_config();
    client_config.auto_receive_interval = Duration::ZERO;
    client_config.auto_reconnect = false;
    let connect_timeout = client_config.connect_timeout;

    let client = DuplexClient::new(client_config);
    client.set_cookies(config.session.cookies());

    if !client.connect(&uri, None, connect_timeout).await {
        return Err(client_failure(&client, "Connection failed"));
    }

    let timeout = Duration::from_millis(timeout_ms);
    let reply = match &pattern {
        Some(pattern) => client.exchange_until_match(&command, pattern, timeout).await,
        None => client.exchange(&command, 0, timeout).await,
    };
    client.disconnect().await;

    if reply.is_empty() || reply == NOT_CONNECTED {
        return Err(client_failure(
            &client,
            &format!("No reply within {}ms", timeout_ms),
        ));
    }

    println!("{}", reply);
    Ok(())
}

fn handle_config_command(subcommand: ConfigSubcommand, path: Option<&str>) -> anyhow::Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = EventlinkConfig::load(path)?;
            println!("{}", toml::to_string_pretty(&cfg).map_err(Error::from)?);
        }
        ConfigSubcommand::Init {
            path: target,
            force,
        } => {
            let written = config::init_config(target.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate => {
            EventlinkConfig::load(path)?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
