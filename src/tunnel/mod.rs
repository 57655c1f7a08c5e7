//! The tunnel engine: access-control descriptor construction, endpoint
//! creation, the supervising accept loop, and the per-connection duplex
//! relay.

mod acl;
mod endpoint;
mod error;
mod listener;
mod relay;

pub use acl::{
    AccessControlBuilder, AccessDescriptor, AccessGrant, PermissionLevel, Principal,
    AUTHENTICATED_USERS,
};
pub use endpoint::{connect, public_listener};
#[cfg(unix)]
pub use endpoint::socket_dir;
pub use error::TunnelError;
pub use listener::TunnelListener;
pub use relay::{Direction, RelayOutcome, RelaySession, RELAY_BUFFER_SIZE};
