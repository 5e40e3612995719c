//! GameLink host: entry point.
//!
//! Shows a six-digit PIN and answers guests that ask for it over UDP, so a
//! guest can find this machine by PIN alone.
//!
//! # Usage
//!
//! ```text
//! gamelink-host [OPTIONS]
//!
//! Options:
//!   --name <NAME>    Name sent to guests [env: GAMELINK_HOST_NAME]
//!   --pin <PIN>      PIN to answer (default: random) [env: GAMELINK_PIN]
//!   --port <PORT>    UDP port [env: GAMELINK_PIN_PORT] [default: 48010]
//!   --ipv4-only      Do not listen on IPv6
//! ```
//!
//! Runs until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use gamelink_core::{PinToken, PIN_EXCHANGE_PORT};
use gamelink_host::application::pin_code::generate_pin;
use gamelink_host::infrastructure::network::pin_announcer::{AnnouncerConfig, PinAnnouncer};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fallback name when the OS host name is unavailable.
const DEFAULT_HOST_NAME: &str = "GameLink Host";

/// GameLink host: answer PIN requests from guests on the LAN.
#[derive(Debug, Parser)]
#[command(name = "gamelink-host", version)]
struct Cli {
    /// Name guests see; defaults to the machine's host name.
    #[arg(long, env = "GAMELINK_HOST_NAME")]
    name: Option<String>,

    /// Six-digit PIN; a random one is generated when omitted.
    #[arg(long, env = "GAMELINK_PIN")]
    pin: Option<String>,

    #[arg(long, env = "GAMELINK_PIN_PORT", default_value_t = PIN_EXCHANGE_PORT)]
    port: u16,

    #[arg(long)]
    ipv4_only: bool,
}

fn host_name(explicit: Option<String>) -> String {
    explicit
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_HOST_NAME.to_string())
}

fn announcer_config(cli: &Cli) -> AnnouncerConfig {
    AnnouncerConfig {
        port: cli.port,
        enable_ipv6: !cli.ipv4_only,
        ..AnnouncerConfig::new(host_name(cli.name.clone()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let raw_pin = cli.pin.clone().unwrap_or_else(generate_pin);
    let pin = PinToken::parse(&raw_pin).with_context(|| format!("invalid PIN '{raw_pin}'"))?;
    let config = announcer_config(&cli);
    let name = config.host_name.clone();

    let announcer = PinAnnouncer::start(pin.clone(), config).context("starting PIN announcer")?;

    println!("PIN: {}", pin.as_str());
    info!(%name, port = announcer.ipv4_addr().port(), "Waiting for guests (Ctrl+C to quit)");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;

    info!("Shutting down");
    tokio::task::spawn_blocking(move || announcer.stop())
        .await
        .context("stopping PIN announcer")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
