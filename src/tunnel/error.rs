//! Error taxonomy for the tunnel engine.
//!
//! `ConfigConflict` is fatal at startup; every other kind is transient and
//! funnels into the listener's log-backoff-restart policy (or, for
//! session-level faults, into teardown of that one session).

use thiserror::Error;

use super::relay::Direction;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("private and published endpoint names are the same: {name}")]
    ConfigConflict { name: String },

    #[error("cannot resolve security principal '{name}': {reason}")]
    PrincipalResolution { name: String, reason: String },

    #[error("failed to bind published endpoint '{name}': {source}")]
    Bind {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to accept on published endpoint: {0}")]
    Accept(#[source] std::io::Error),

    #[error("failed to connect to private endpoint '{name}': {reason}")]
    PrivateConnect { name: String, reason: String },

    #[error("relay I/O error ({direction}): {source}")]
    RelayIo {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },
}

impl TunnelError {
    /// True for the one startup-fatal kind; transient kinds return false.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelError::ConfigConflict { .. })
    }
}
