//! OS endpoint construction for both sides of the tunnel.
//!
//! Local sockets (Unix domain sockets / Windows named pipes) via the
//! `interprocess` tokio integration. On Unix the published endpoint is a
//! filesystem socket so the access descriptor can be applied as
//! permission bits and group ownership; on Windows the endpoint lives in
//! the named-pipe namespace.

use std::io;

use interprocess::local_socket::tokio::{prelude::*, Listener, Stream};
use interprocess::local_socket::ListenerOptions;
#[cfg(unix)]
use interprocess::local_socket::{GenericFilePath, ToFsName};
#[cfg(windows)]
use interprocess::local_socket::{GenericNamespaced, ToNsName};

use super::acl::AccessDescriptor;
use super::error::TunnelError;

/// Directory holding Unix socket files, overridable for tests and
/// packaging.
#[cfg(unix)]
pub fn socket_dir() -> String {
    std::env::var("PIPETUNNEL_SOCKET_DIR").unwrap_or_else(|_| "/tmp".to_string())
}

#[cfg(unix)]
fn endpoint_path(name: &str) -> String {
    format!("{}/{}", socket_dir(), name)
}

/// Bind the published endpoint and apply the access descriptor.
///
/// The endpoint is duplex and byte-stream oriented; the listener serves
/// an unbounded number of accepted connections over its lifetime.
pub fn public_listener(
    name: &str,
    descriptor: &AccessDescriptor,
) -> Result<Listener, TunnelError> {
    let bind_err = |source: io::Error| TunnelError::Bind {
        name: name.to_string(),
        source,
    };

    #[cfg(unix)]
    {
        let path = endpoint_path(name);
        remove_stale_socket(&path).map_err(bind_err)?;

        let sock_name = path.clone().to_fs_name::<GenericFilePath>().map_err(bind_err)?;
        let listener = ListenerOptions::new()
            .name(sock_name)
            .create_tokio()
            .map_err(bind_err)?;

        apply_descriptor(&path, descriptor);
        Ok(listener)
    }

    #[cfg(windows)]
    {
        if descriptor.granted_gid().is_some() || !descriptor.grants_authenticated_users() {
            tracing::warn!(
                endpoint = name,
                "specific principal grants are not applied on this platform; \
                 the pipe uses default security"
            );
        }
        let sock_name = name.to_ns_name::<GenericNamespaced>().map_err(bind_err)?;
        ListenerOptions::new()
            .name(sock_name)
            .create_tokio()
            .map_err(bind_err)
    }
}

/// Connect a duplex client to a named local endpoint. Local machine
/// only; the connecting identity is not impersonated.
pub async fn connect(name: &str) -> io::Result<Stream> {
    #[cfg(unix)]
    {
        let sock_name = endpoint_path(name).to_fs_name::<GenericFilePath>()?;
        Stream::connect(sock_name).await
    }

    #[cfg(windows)]
    {
        let sock_name = name.to_ns_name::<GenericNamespaced>()?;
        Stream::connect(sock_name).await
    }
}

/// A socket file left behind by a previous process blocks the bind.
#[cfg(unix)]
fn remove_stale_socket(path: &str) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::warn!(path, "removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Translate the grant set into permission bits and ownership.
///
/// Authenticated-users grant: world-connectable. Specific user/group
/// grant: group ownership plus group-only access; a chown needs root or
/// membership in the target group, so failure is logged rather than
/// fatal.
#[cfg(unix)]
fn apply_descriptor(path: &str, descriptor: &AccessDescriptor) {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;

    let mode = if descriptor.grants_authenticated_users() {
        0o666
    } else if descriptor.granted_gid().is_some() {
        0o660
    } else {
        0o600
    };

    if let Err(e) = std::fs::set_permissions(path, Permissions::from_mode(mode)) {
        tracing::warn!(path, mode = format!("{mode:o}"), error = %e, "failed to set socket permissions");
    }

    if let Some(gid) = descriptor.granted_gid() {
        if let Err(e) = nix::unistd::chown(path, None, Some(nix::unistd::Gid::from_raw(gid))) {
            tracing::warn!(path, gid, error = %e, "failed to change socket group ownership");
        }
    }
}
