//! Access-control behavior of the published endpoint.

use pipetunnel::tunnel::{
    AccessControlBuilder, PermissionLevel, Principal, TunnelError, AUTHENTICATED_USERS,
};

#[test]
fn test_grant_set_always_includes_process_owner_full_control() {
    for principal in [None, Some(AUTHENTICATED_USERS.to_string())] {
        let descriptor = AccessControlBuilder::new(principal).build().unwrap();
        let owner = descriptor
            .grants()
            .iter()
            .find(|g| g.principal == Principal::ProcessOwner)
            .expect("process owner grant missing");
        assert_eq!(owner.level, PermissionLevel::FullControl);
    }
}

#[test]
fn test_unset_principal_falls_back_to_authenticated_users() {
    let descriptor = AccessControlBuilder::new(None).build().unwrap();
    assert!(descriptor.grants_authenticated_users());
    assert_eq!(descriptor.granted_gid(), None);
}

#[test]
fn test_literal_matches_any_case() {
    for spelling in ["authenticatedUsers", "AUTHENTICATEDusers"] {
        let descriptor = AccessControlBuilder::new(Some(spelling.to_string()))
            .build()
            .unwrap();
        assert!(descriptor.grants_authenticated_users());
    }
}

#[test]
fn test_unknown_principal_is_a_build_error() {
    let result = AccessControlBuilder::new(Some("pipetunnel-nonexistent-principal".to_string()))
        .build();
    match result {
        Err(TunnelError::PrincipalResolution { name, .. }) => {
            assert_eq!(name, "pipetunnel-nonexistent-principal");
        }
        other => panic!("expected principal resolution failure, got {other:?}"),
    }
}

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::PermissionsExt;

    use pipetunnel::tunnel::{self, AccessControlBuilder};

    fn unique_name(tag: &str) -> String {
        format!("pipetunnel-acl-{}-{}", tag, std::process::id())
    }

    fn socket_mode(name: &str) -> u32 {
        let path = format!("{}/{}", tunnel::socket_dir(), name);
        std::fs::metadata(&path)
            .expect("socket file must exist after bind")
            .permissions()
            .mode()
            & 0o777
    }

    #[tokio::test]
    async fn test_authenticated_users_endpoint_is_world_connectable() {
        let name = unique_name("world");
        let descriptor = AccessControlBuilder::new(None).build().unwrap();
        let _listener = tunnel::public_listener(&name, &descriptor).unwrap();
        assert_eq!(socket_mode(&name), 0o666);
    }

    #[tokio::test]
    async fn test_principal_endpoint_is_group_only() {
        // The current user always resolves, and chown to the caller's
        // own primary group always succeeds.
        let me = nix::unistd::User::from_uid(nix::unistd::getuid())
            .unwrap()
            .unwrap();

        let name = unique_name("group");
        let descriptor = AccessControlBuilder::new(Some(me.name.clone()))
            .build()
            .unwrap();
        assert_eq!(descriptor.granted_gid(), Some(me.gid.as_raw()));

        let _listener = tunnel::public_listener(&name, &descriptor).unwrap();
        assert_eq!(socket_mode(&name), 0o660);

        let path = format!("{}/{}", tunnel::socket_dir(), name);
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(std::os::unix::fs::MetadataExt::gid(&meta), me.gid.as_raw());
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let name = unique_name("stale");
        let path = format!("{}/{}", tunnel::socket_dir(), name);
        std::fs::write(&path, b"").unwrap();

        let descriptor = AccessControlBuilder::new(None).build().unwrap();
        let _listener = tunnel::public_listener(&name, &descriptor)
            .expect("stale file must not block the bind");

        // The leftover regular file was replaced by a live socket.
        let meta = std::fs::metadata(&path).unwrap();
        assert!(std::os::unix::fs::FileTypeExt::is_socket(&meta.file_type()));
    }
}
