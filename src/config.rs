//! Tunnel configuration loading.
//!
//! Values come from an optional TOML file, then `PIPETUNNEL_*`
//! environment variables, then command-line flags (applied by the
//! caller). A malformed or missing config source falls back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `PIPETUNNEL_CONFIG` | `pipetunnel.toml` | Config file path |
//! | `PIPETUNNEL_PRIVATE` | `geth.private.ipc` | Private endpoint name |
//! | `PIPETUNNEL_PUBLISHED` | `geth.ipc` | Published endpoint name |
//! | `PIPETUNNEL_SID` | unset | Security principal for the published endpoint |
//! | `PIPETUNNEL_CONNECT_TIMEOUT` | 10 | Private connect timeout (secs) |
//! | `PIPETUNNEL_RETRY_BACKOFF_MS` | 1000 | Listen-cycle restart backoff (millis) |
//! | `PIPETUNNEL_SHUTDOWN_TIMEOUT` | 30 | Session drain timeout (secs) |

use std::time::Duration;

use serde::Deserialize;

use crate::tunnel::TunnelError;

pub const DEFAULT_PRIVATE_NAME: &str = "geth.private.ipc";
pub const DEFAULT_PUBLIC_NAME: &str = "geth.ipc";
const DEFAULT_CONFIG_FILE: &str = "pipetunnel.toml";

/// Immutable tunnel configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Name of the endpoint the target process listens on.
    pub private_endpoint_name: String,
    /// Name the tunnel publishes for external callers.
    pub public_endpoint_name: String,
    /// Principal granted read-write on the published endpoint; `None`
    /// grants the authenticated-users group.
    pub security_principal: Option<String>,
    /// Timeout for dialing the private endpoint per session.
    pub connect_timeout: Duration,
    /// Delay before restarting a failed listen cycle.
    pub retry_backoff: Duration,
    /// How long shutdown waits for live sessions to drain.
    pub shutdown_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            private_endpoint_name: DEFAULT_PRIVATE_NAME.to_string(),
            public_endpoint_name: DEFAULT_PUBLIC_NAME.to_string(),
            security_principal: None,
            connect_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl TunnelConfig {
    /// The private and published names must differ (case-insensitive);
    /// a conflict would tunnel the endpoint into itself.
    pub fn validate(&self) -> Result<(), TunnelError> {
        if self
            .private_endpoint_name
            .eq_ignore_ascii_case(&self.public_endpoint_name)
        {
            return Err(TunnelError::ConfigConflict {
                name: self.private_endpoint_name.clone(),
            });
        }
        Ok(())
    }

    /// One-line summary for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "-private:{} -published:{} -sid:{}",
            self.private_endpoint_name,
            self.public_endpoint_name,
            self.security_principal
                .as_deref()
                .unwrap_or("[AuthenticatedUsers]")
        )
    }
}

/// On-disk layout of the optional config file. All fields optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    private_endpoint_name: Option<String>,
    public_endpoint_name: Option<String>,
    security_principal: Option<String>,
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn read_config_file() -> ConfigFile {
    let path =
        std::env::var("PIPETUNNEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return ConfigFile::default(),
    };

    match toml::from_str(&contents) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(path, error = %e, "malformed config file, using defaults");
            ConfigFile::default()
        }
    }
}

/// Load configuration: defaults, then config file, then environment.
///
/// Missing or invalid values fall back without panicking. Timeout
/// values have floors so a zero can never busy-loop the listener.
pub fn load() -> TunnelConfig {
    let mut config = TunnelConfig::default();
    let file = read_config_file();

    if let Some(name) = file.private_endpoint_name {
        config.private_endpoint_name = name;
    }
    if let Some(name) = file.public_endpoint_name {
        config.public_endpoint_name = name;
    }
    if let Some(principal) = file.security_principal {
        config.security_principal = Some(principal);
    }

    if let Ok(name) = std::env::var("PIPETUNNEL_PRIVATE") {
        config.private_endpoint_name = name;
    }
    if let Ok(name) = std::env::var("PIPETUNNEL_PUBLISHED") {
        config.public_endpoint_name = name;
    }
    if let Ok(principal) = std::env::var("PIPETUNNEL_SID") {
        config.security_principal = Some(principal);
    }

    let connect_secs = parse_u64("PIPETUNNEL_CONNECT_TIMEOUT", 10).max(1);
    let backoff_ms = parse_u64("PIPETUNNEL_RETRY_BACKOFF_MS", 1000).max(100);
    let shutdown_secs = parse_u64("PIPETUNNEL_SHUTDOWN_TIMEOUT", 30).max(1);

    config.connect_timeout = Duration::from_secs(connect_secs);
    config.retry_backoff = Duration::from_millis(backoff_ms);
    config.shutdown_timeout = Duration::from_secs(shutdown_secs);

    config
}
