//! TOML-based configuration for the guest.
//!
//! Read from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\GameLink\guest.toml`
//! - Linux:    `$XDG_CONFIG_HOME/gamelink/guest.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/GameLink/guest.toml`
//!
//! A missing file is not an error: every field has a default, so the guest
//! works on first run and with partially filled files.
//!
//! ```toml
//! [client]
//! program = "flatpak"
//! args = ["run", "com.moonlight_stream.Moonlight"]
//!
//! [network]
//! probe_timeout_ms = 800
//!
//! [stream]
//! app = "Steam"
//! width = 2560
//! height = 1440
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  Whole
//! sections fall back to their `Default` impl via `#[serde(default)]`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gamelink_core::{StreamParams, HOST_CONTROL_PORT, PIN_EXCHANGE_PORT};
use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level guest configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct GuestConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub stream: StreamParams,
}

/// How to invoke the external streaming client.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Program to execute (looked up on `PATH` when not absolute).
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the subcommand, e.g. a flatpak wrapper.
    #[serde(default)]
    pub args: Vec<String>,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ports, timeouts, and retry budgets.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP control port probed during subnet discovery.
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// UDP port of the PIN exchange.
    #[serde(default = "default_pin_port")]
    pub pin_port: u16,
    /// Per-address TCP connect timeout of the subnet probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Upper bound on concurrent probe workers.
    #[serde(default = "default_probe_workers")]
    pub probe_workers: usize,
    /// Whether the probe may flush and re-prime the IPv6 neighbor cache.
    #[serde(default = "default_true")]
    pub prime_neighbor_cache: bool,
    /// Per-family wait for an `I_HAVE_PIN` reply.
    #[serde(default = "default_pin_timeout_ms")]
    pub pin_timeout_ms: u64,
    /// Upper bound on one announcement browse.
    #[serde(default = "default_browse_timeout_ms")]
    pub browse_timeout_ms: u64,
    /// Capability probes attempted after a successful pairing.
    #[serde(default = "default_retry_attempts")]
    pub pairing_retry_attempts: u32,
    /// Delay between those probes.
    #[serde(default = "default_retry_delay_ms")]
    pub pairing_retry_delay_ms: u64,
    /// Upper bound on one capability probe.
    #[serde(default = "default_capability_timeout_ms")]
    pub capability_probe_timeout_ms: u64,
    /// A stream that exits within this window counts as a failed launch.
    #[serde(default = "default_launch_grace_ms")]
    pub launch_grace_ms: u64,
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
    pub fn pin_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_timeout_ms)
    }
    pub fn browse_timeout(&self) -> Duration {
        Duration::from_millis(self.browse_timeout_ms)
    }
    pub fn pairing_retry_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_retry_delay_ms)
    }
    pub fn capability_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_probe_timeout_ms)
    }
    pub fn launch_grace(&self) -> Duration {
        Duration::from_millis(self.launch_grace_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_program() -> String {
    "moonlight".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_control_port() -> u16 {
    HOST_CONTROL_PORT
}
fn default_pin_port() -> u16 {
    PIN_EXCHANGE_PORT
}
fn default_probe_timeout_ms() -> u64 {
    800
}
fn default_probe_workers() -> usize {
    256
}
fn default_pin_timeout_ms() -> u64 {
    3_000
}
fn default_browse_timeout_ms() -> u64 {
    5_000
}
fn default_retry_attempts() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_capability_timeout_ms() -> u64 {
    15_000
}
fn default_launch_grace_ms() -> u64 {
    3_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control_port: default_control_port(),
            pin_port: default_pin_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_workers: default_probe_workers(),
            prime_neighbor_cache: default_true(),
            pin_timeout_ms: default_pin_timeout_ms(),
            browse_timeout_ms: default_browse_timeout_ms(),
            pairing_retry_attempts: default_retry_attempts(),
            pairing_retry_delay_ms: default_retry_delay_ms(),
            capability_probe_timeout_ms: default_capability_timeout_ms(),
            launch_grace_ms: default_launch_grace_ms(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the full path to the guest config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("guest.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from the platform location, or defaults when absent.
pub fn load_config() -> Result<GuestConfig, ConfigError> {
    match config_file_path() {
        Ok(path) => load_config_from(&path),
        Err(ConfigError::NoPlatformConfigDir) => Ok(GuestConfig::default()),
        Err(e) => Err(e),
    }
}

/// Loads the config from `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<GuestConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GuestConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("GameLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("gamelink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("GameLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_well_known_ports() {
        // Arrange / Act
        let cfg = GuestConfig::default();

        // Assert
        assert_eq!(cfg.network.control_port, 47989);
        assert_eq!(cfg.network.pin_port, 48010);
    }

    #[test]
    fn test_default_timeouts() {
        let net = NetworkConfig::default();
        assert_eq!(net.probe_timeout(), Duration::from_millis(800));
        assert_eq!(net.pin_timeout(), Duration::from_secs(3));
        assert_eq!(net.capability_probe_timeout(), Duration::from_secs(15));
        assert_eq!(net.launch_grace(), Duration::from_secs(3));
        assert_eq!(net.pairing_retry_attempts, 5);
        assert_eq!(net.pairing_retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: GuestConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, GuestConfig::default());
    }

    #[test]
    fn test_partial_toml_fills_missing_fields() {
        // Arrange
        let text = r#"
            [client]
            program = "flatpak"
            args = ["run", "com.moonlight_stream.Moonlight"]

            [network]
            probe_timeout_ms = 250

            [stream]
            app = "Steam"
            fps = 120
        "#;

        // Act
        let cfg: GuestConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.client.program, "flatpak");
        assert_eq!(cfg.client.args.len(), 2);
        assert_eq!(cfg.client.log_level, "info");
        assert_eq!(cfg.network.probe_timeout_ms, 250);
        assert_eq!(cfg.network.pin_port, 48010);
        assert_eq!(cfg.stream.app, "Steam");
        assert_eq!(cfg.stream.fps, 120);
        assert_eq!(cfg.stream.width, 1920);
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join(format!("gamelink-missing-{}.toml", uuid::Uuid::new_v4()));
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg, GuestConfig::default());
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        // Arrange
        let path = std::env::temp_dir().join(format!("gamelink-bad-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[network\nprobe_timeout_ms = ").unwrap();

        // Act
        let result = load_config_from(&path);
        let _ = std::fs::remove_file(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
