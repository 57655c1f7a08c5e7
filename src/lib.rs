//! pipetunnel
//!
//! Re-exposes a privately-named local IPC endpoint under a different
//! public name with its own access control, relaying bytes
//! bidirectionally between the two. The process that owns the private
//! endpoint is never modified; external callers connect to the published
//! name and each accepted connection is bridged to a fresh private
//! connection.
//!
//! The relay is a transparent, protocol-agnostic pipe: no framing, no
//! interpretation, no TLS. Integrity is the local IPC transport's job.
//!
//! # Components
//!
//! - [`tunnel::AccessControlBuilder`] — grant set for the published endpoint
//! - [`tunnel::TunnelListener`] — supervising accept loop with fixed backoff
//! - [`tunnel::RelaySession`] — per-connection duplex byte copy
//! - [`Tunnel`] — host-supervisor surface (`start`/`stop`)

pub mod config;
pub mod shutdown;
pub mod telemetry;
pub mod tunnel;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use config::TunnelConfig;
use shutdown::{DrainResult, SessionTracker};
use tunnel::TunnelListener;
pub use tunnel::TunnelError;

/// The tunnel instance a host supervisor drives.
///
/// [`Tunnel::start`] launches the listener asynchronously and returns
/// promptly; [`Tunnel::stop`] is best-effort and drains in-flight
/// sessions when asked to.
pub struct Tunnel {
    listener: Arc<TunnelListener>,
    sessions: Arc<SessionTracker>,
    shutdown: CancellationToken,
    config: Arc<TunnelConfig>,
    task: Option<JoinHandle<Result<(), TunnelError>>>,
}

impl Tunnel {
    /// Validate the configuration and assemble the tunnel.
    ///
    /// An identical private/published name is fatal here: the tunnel
    /// must never listen with a conflicting configuration.
    pub fn new(config: TunnelConfig) -> Result<Self, TunnelError> {
        config.validate()?;

        let config = Arc::new(config);
        let sessions = Arc::new(SessionTracker::new());
        let shutdown = CancellationToken::new();
        let listener = Arc::new(TunnelListener::new(
            config.clone(),
            sessions.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            listener,
            sessions,
            shutdown,
            config,
            task: None,
        })
    }

    /// Launch the listener task. Returns immediately; the accept loop
    /// runs until [`Tunnel::stop`].
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let listener = self.listener.clone();
        self.task = Some(tokio::spawn(async move { listener.run().await }));
    }

    /// Stop accepting new connections. With `is_shutdown`, wait up to
    /// the configured drain timeout for live sessions to finish.
    pub async fn stop(&mut self, is_shutdown: bool) -> DrainResult {
        self.shutdown.cancel();

        let result = if is_shutdown {
            self.sessions.drain(self.config.shutdown_timeout).await
        } else {
            DrainResult::Complete
        };

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "listener exited with error"),
                Err(e) => tracing::error!(error = %e, "listener task panicked"),
            }
        }

        result
    }

    /// Number of sessions accepted so far.
    pub fn sessions_accepted(&self) -> u64 {
        self.listener.sessions_accepted()
    }

    /// Number of sessions currently relaying.
    pub fn live_sessions(&self) -> u32 {
        self.sessions.live_count()
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }
}
