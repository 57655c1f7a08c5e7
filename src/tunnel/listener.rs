//! Supervising accept loop for the published endpoint.
//!
//! One control task owns the loop: build a fresh access descriptor, bind
//! the published endpoint, then accept connections and dispatch each to
//! a spawned relay session. Any fault on the listen/accept path tears
//! the cycle down, waits a fixed backoff, and starts a fresh cycle, so
//! the tunnel never permanently stops accepting short of explicit
//! shutdown. Session-level faults stay inside their session task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use interprocess::local_socket::tokio::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::shutdown::SessionTracker;

use super::acl::AccessControlBuilder;
use super::endpoint;
use super::error::TunnelError;
use super::relay::RelaySession;

pub struct TunnelListener {
    config: Arc<TunnelConfig>,
    sessions: Arc<SessionTracker>,
    shutdown: CancellationToken,
    /// Process-wide session sequence. Monotonically increasing, never
    /// reused; the only mutable state shared across cycles.
    sequence: AtomicU64,
}

impl TunnelListener {
    pub fn new(
        config: Arc<TunnelConfig>,
        sessions: Arc<SessionTracker>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            sessions,
            shutdown,
            sequence: AtomicU64::new(0),
        }
    }

    /// Number of sessions accepted so far, across all listen cycles.
    pub fn sessions_accepted(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Run listen cycles until shutdown.
    ///
    /// Returns early only for the startup-fatal name conflict; every
    /// transient fault is logged and retried after the configured
    /// backoff.
    pub async fn run(&self) -> Result<(), TunnelError> {
        if let Err(e) = self.config.validate() {
            tracing::error!(error = %e, "configuration conflict, tunnel will not listen");
            return Err(e);
        }

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            match self.listen_cycle().await {
                // The cycle only returns Ok when shutdown was requested.
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        backoff = ?self.config.retry_backoff,
                        "listen cycle failed, restarting after backoff"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_backoff) => {}
            }
        }

        tracing::info!("tunnel listener stopped");
        Ok(())
    }

    /// One cycle: fresh descriptor, fresh bind, then accept until a
    /// fault or shutdown.
    async fn listen_cycle(&self) -> Result<(), TunnelError> {
        let descriptor =
            AccessControlBuilder::new(self.config.security_principal.clone()).build()?;
        let listener = endpoint::public_listener(&self.config.public_endpoint_name, &descriptor)?;

        tracing::info!(
            public = %self.config.public_endpoint_name,
            private = %self.config.private_endpoint_name,
            "published endpoint listening"
        );

        loop {
            let stream = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                accepted = listener.accept() => accepted.map_err(TunnelError::Accept)?,
            };

            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

            let Some(guard) = self.sessions.track() else {
                // Draining: stop accepting, drop the late connection.
                tracing::info!(sequence, "rejecting connection, tunnel is shutting down");
                return Ok(());
            };

            tracing::info!(sequence, "accepted public connection");

            let session = RelaySession::new(
                sequence,
                stream,
                self.config.private_endpoint_name.clone(),
                self.config.connect_timeout,
            );

            tokio::spawn(async move {
                let _guard = guard;
                match session.run().await {
                    Ok(outcome) => tracing::info!(
                        sequence,
                        ended_by = %outcome.direction,
                        bytes = outcome.bytes,
                        "session finished"
                    ),
                    Err(e) => tracing::warn!(sequence, error = %e, "session failed"),
                }
            });
        }
    }
}
