//! Access-control descriptor construction for the published endpoint.
//!
//! The descriptor is a platform-neutral set of (principal, permission)
//! grants. It always carries the owning process with full control, plus
//! either the configured principal (resolved to a local user or group)
//! or the built-in authenticated-users group with read-write. How the
//! grants are applied to the OS endpoint is the factory's concern
//! (permission bits on Unix socket files).

use super::error::TunnelError;

/// Literal principal name that selects the built-in group, matched
/// case-insensitively. An unset or blank principal selects it as well.
pub const AUTHENTICATED_USERS: &str = "AuthenticatedUsers";

/// Permission level attached to a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    FullControl,
    ReadWrite,
}

/// A security identity a grant refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The identity of the running process.
    ProcessOwner,
    /// All authenticated local users.
    AuthenticatedUsers,
    /// A named local user, resolved at build time.
    User { name: String, uid: u32, gid: u32 },
    /// A named local group, resolved at build time.
    Group { name: String, gid: u32 },
}

/// One (principal, permission) pair on the published endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub principal: Principal,
    pub level: PermissionLevel,
}

/// The full grant set for one listen cycle. Rebuilt fresh on every bind
/// of the published endpoint, never cached across cycles.
#[derive(Debug, Clone)]
pub struct AccessDescriptor {
    grants: Vec<AccessGrant>,
}

impl AccessDescriptor {
    pub fn grants(&self) -> &[AccessGrant] {
        &self.grants
    }

    /// Whether the descriptor opens the endpoint to all authenticated
    /// local users.
    pub fn grants_authenticated_users(&self) -> bool {
        self.grants
            .iter()
            .any(|g| g.principal == Principal::AuthenticatedUsers)
    }

    /// The group id the endpoint should be owned by, if a specific
    /// user/group principal was granted. A user principal maps to its
    /// primary group.
    pub fn granted_gid(&self) -> Option<u32> {
        self.grants.iter().find_map(|g| match g.principal {
            Principal::User { gid, .. } | Principal::Group { gid, .. } => Some(gid),
            _ => None,
        })
    }
}

/// Builds an [`AccessDescriptor`] from the configured principal name.
pub struct AccessControlBuilder {
    security_principal: Option<String>,
}

impl AccessControlBuilder {
    pub fn new(security_principal: Option<String>) -> Self {
        Self { security_principal }
    }

    /// Construct the grant set. Fails with
    /// [`TunnelError::PrincipalResolution`] when a configured name
    /// resolves to neither a user nor a group. No side effects beyond
    /// the identity lookups.
    pub fn build(&self) -> Result<AccessDescriptor, TunnelError> {
        let mut grants = vec![AccessGrant {
            principal: Principal::ProcessOwner,
            level: PermissionLevel::FullControl,
        }];

        match self.security_principal.as_deref() {
            None | Some("") => grants.push(AccessGrant {
                principal: Principal::AuthenticatedUsers,
                level: PermissionLevel::ReadWrite,
            }),
            Some(name) if name.trim().is_empty() => grants.push(AccessGrant {
                principal: Principal::AuthenticatedUsers,
                level: PermissionLevel::ReadWrite,
            }),
            Some(name) if name.eq_ignore_ascii_case(AUTHENTICATED_USERS) => {
                grants.push(AccessGrant {
                    principal: Principal::AuthenticatedUsers,
                    level: PermissionLevel::ReadWrite,
                })
            }
            Some(name) => grants.push(AccessGrant {
                principal: resolve_principal(name)?,
                level: PermissionLevel::ReadWrite,
            }),
        }

        Ok(AccessDescriptor { grants })
    }
}

/// Resolve a principal name to a local user or group identity.
#[cfg(unix)]
pub fn resolve_principal(name: &str) -> Result<Principal, TunnelError> {
    use nix::unistd::{Group, User};

    match User::from_name(name) {
        Ok(Some(user)) => {
            return Ok(Principal::User {
                name: name.to_string(),
                uid: user.uid.as_raw(),
                gid: user.gid.as_raw(),
            })
        }
        Ok(None) => {}
        Err(e) => {
            return Err(TunnelError::PrincipalResolution {
                name: name.to_string(),
                reason: format!("user lookup failed: {e}"),
            })
        }
    }

    match Group::from_name(name) {
        Ok(Some(group)) => Ok(Principal::Group {
            name: name.to_string(),
            gid: group.gid.as_raw(),
        }),
        Ok(None) => Err(TunnelError::PrincipalResolution {
            name: name.to_string(),
            reason: "no such local user or group".to_string(),
        }),
        Err(e) => Err(TunnelError::PrincipalResolution {
            name: name.to_string(),
            reason: format!("group lookup failed: {e}"),
        }),
    }
}

/// Principal lookup is not implemented on this platform; the
/// authenticated-users default needs no resolution and works unmodified.
#[cfg(windows)]
pub fn resolve_principal(name: &str) -> Result<Principal, TunnelError> {
    Err(TunnelError::PrincipalResolution {
        name: name.to_string(),
        reason: "principal lookup is not supported on this platform".to_string(),
    })
}
