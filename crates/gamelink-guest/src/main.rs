//! GameLink guest: entry point.
//!
//! Finds streaming hosts on the LAN, pairs with them through the external
//! streaming client, and launches a stream.
//!
//! # Usage
//!
//! ```text
//! gamelink-guest [OPTIONS] <COMMAND>
//!
//! Commands:
//!   discover                 List hosts (announcements, else subnet probe)
//!   resolve-pin <PIN>        Ask the LAN which host shows <PIN>
//!   connect <ADDRESS>        Pair if needed, then stream from <ADDRESS>
//!   connect-pin <PIN>        Resolve <PIN>, then connect to that host
//!   pair <ADDRESS>           Run one pairing attempt and print the PIN
//!
//! Options:
//!   --config <PATH>          Config file [env: GAMELINK_CONFIG]
//!   --client <PROGRAM>       Streaming client binary [env: GAMELINK_CLIENT]
//! ```
//!
//! IPv6 addresses may be bracketed and may carry a scope (`[fe80::1%eth0]`).
//! A bare link-local address is scoped to the default-route interface.
//!
//! Press Ctrl+C to cancel a connection in progress or to end a stream.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gamelink_core::StreamParams;
use gamelink_guest::application::connect::{
    ConnectOutcome, ConnectionContext, ConnectionController, ConnectionState, RetryPolicy,
};
use gamelink_guest::application::discover::DiscoverUseCase;
use gamelink_guest::application::stream_client::PinCallback;
use gamelink_guest::infrastructure::client::pairing::PairingSession;
use gamelink_guest::infrastructure::client::{CliStreamClient, CliTimeouts, ClientCommand};
use gamelink_guest::infrastructure::network::announcements::AvahiBrowser;
use gamelink_guest::infrastructure::network::interfaces;
use gamelink_guest::infrastructure::network::pin_resolver::{PinResolver, PinResolverConfig};
use gamelink_guest::infrastructure::network::subnet_probe::{ProbeConfig, SubnetProbe};
use gamelink_guest::infrastructure::storage::config::{self, GuestConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// GameLink guest: discover, pair with, and stream from a LAN host.
#[derive(Debug, Parser)]
#[command(name = "gamelink-guest", version)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "GAMELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Streaming client program, overriding `[client] program`.
    #[arg(long, env = "GAMELINK_CLIENT")]
    client: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List streaming hosts on the local network.
    Discover,

    /// Find the host displaying a PIN.
    ResolvePin {
        /// Six-digit PIN shown on the host.
        pin: String,
    },

    /// Connect to a host by address, pairing first if needed.
    Connect {
        /// IPv4 or IPv6 address, optionally bracketed and scoped.
        address: String,
        /// Host application to launch, overriding `[stream] app`.
        #[arg(long)]
        app: Option<String>,
    },

    /// Resolve a PIN and connect to the host that answered.
    ConnectPin {
        pin: String,
        #[arg(long)]
        app: Option<String>,
    },

    /// Run one pairing attempt and print the PIN to enter on the host.
    Pair {
        address: String,
    },
}

fn stream_params(cfg: &GuestConfig, app: Option<String>) -> StreamParams {
    let mut params = cfg.stream.clone();
    if let Some(app) = app {
        params.app = app;
    }
    params
}

fn client_command(cfg: &GuestConfig) -> ClientCommand {
    ClientCommand::new(cfg.client.program.clone(), cfg.client.args.clone())
}

fn print_pin() -> PinCallback {
    Arc::new(|pin: String| {
        println!("Enter PIN {pin} on the host to finish pairing.");
    })
}

fn build_controller(
    cfg: &GuestConfig,
    context: Arc<ConnectionContext>,
) -> Arc<ConnectionController> {
    let net = &cfg.network;
    let client = CliStreamClient::new(
        client_command(cfg),
        CliTimeouts {
            capability_probe: net.capability_probe_timeout(),
            launch_grace: net.launch_grace(),
            ..CliTimeouts::default()
        },
    );
    let controller = ConnectionController::new(Arc::new(client), context, print_pin())
        .with_retry_policy(RetryPolicy {
            attempts: net.pairing_retry_attempts,
            delay: net.pairing_retry_delay(),
        });
    Arc::new(controller)
}

fn pin_resolver(cfg: &GuestConfig) -> PinResolver {
    PinResolver::new(PinResolverConfig::lan(
        cfg.network.pin_port,
        cfg.network.pin_timeout(),
    ))
}

/// Ctrl+C cancels a sequence in progress, or stops a running stream.
fn install_interrupt_handler(controller: Arc<ConnectionController>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl+C signal: {e}");
                return;
            }
            if controller.context().state() == ConnectionState::Streaming {
                info!("received Ctrl+C, stopping stream");
                controller.disconnect();
            } else {
                info!("received Ctrl+C, cancelling connection");
                controller.cancel();
            }
        }
    });
}

/// Waits until the stream started by a successful connect has ended.
async fn wait_for_stream_end(controller: &ConnectionController) {
    let context = controller.context();
    while context.state() == ConnectionState::Streaming {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn finish_connect(
    controller: &ConnectionController,
    outcome: ConnectOutcome,
) -> anyhow::Result<()> {
    match outcome {
        ConnectOutcome::Streaming { pid } => {
            println!("Streaming (client pid {pid:?}). Press Ctrl+C to stop.");
            wait_for_stream_end(controller).await;
            println!("Stream ended.");
        }
        ConnectOutcome::AlreadyInProgress => println!("A connection is already in progress."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    let (mut cfg, config_error) = match loaded {
        Ok(cfg) => (cfg, None),
        Err(e) => (GuestConfig::default(), Some(e)),
    };
    if let Some(program) = cli.client {
        cfg.client.program = program;
    }

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level applies.
    let fallback_level = cfg.client.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level)),
        )
        .init();

    if let Some(e) = config_error {
        warn!("failed to load config ({e}); using defaults");
    }

    match cli.command {
        Command::Discover => {
            let net = &cfg.network;
            let probe = SubnetProbe::new(ProbeConfig {
                port: net.control_port,
                timeout: net.probe_timeout(),
                max_workers: net.probe_workers,
                prime_neighbor_cache: net.prime_neighbor_cache,
                ..ProbeConfig::default()
            });
            let use_case = DiscoverUseCase::new(
                Arc::new(AvahiBrowser::new(net.browse_timeout())),
                Arc::new(probe),
            );
            let result = use_case.discover().await;
            if result.candidates.is_empty() {
                println!("No hosts found.");
            }
            for host in &result.candidates {
                println!("{}\t{}\t{}", host.display_name(), host.address(), host.port());
            }
        }

        Command::ResolvePin { pin } => {
            match pin_resolver(&cfg).resolve(&pin).await? {
                Some(host) => println!("{}\t{}", host.name, host.address),
                None => println!("No host answered PIN {pin}."),
            }
        }

        Command::Connect { address, app } => {
            let host = interfaces::normalize(&address)
                .with_context(|| format!("invalid host address '{address}'"))?;
            let controller = build_controller(&cfg, Arc::new(ConnectionContext::new()));
            install_interrupt_handler(Arc::clone(&controller));
            let outcome = controller.connect(host, &stream_params(&cfg, app)).await?;
            finish_connect(&controller, outcome).await?;
        }

        Command::ConnectPin { pin, app } => {
            let controller = build_controller(&cfg, Arc::new(ConnectionContext::new()));
            install_interrupt_handler(Arc::clone(&controller));
            let resolver = pin_resolver(&cfg);
            let outcome = controller
                .connect_by_pin(&pin, &resolver, &stream_params(&cfg, app))
                .await?;
            finish_connect(&controller, outcome).await?;
        }

        Command::Pair { address } => {
            let host = interfaces::normalize(&address)
                .with_context(|| format!("invalid host address '{address}'"))?;
            let session = PairingSession::new(client_command(&cfg));
            let cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            });
            let report = session.run(&host, print_pin(), cancel).await?;
            println!("Pairing {:?}.", report.outcome);
        }
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
