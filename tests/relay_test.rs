//! End-to-end tunnel tests over real local sockets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use interprocess::local_socket::tokio::prelude::*;
use interprocess::local_socket::tokio::Stream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use pipetunnel::tunnel::{self, AccessControlBuilder};
use pipetunnel::{Tunnel, TunnelConfig};

static NAME_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Endpoint names unique per test and per process run.
fn unique_name(tag: &str) -> String {
    format!(
        "pipetunnel-test-{}-{}-{}",
        tag,
        std::process::id(),
        NAME_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn test_config(private: &str, public: &str) -> TunnelConfig {
    TunnelConfig {
        private_endpoint_name: private.to_string(),
        public_endpoint_name: public.to_string(),
        security_principal: None,
        connect_timeout: Duration::from_secs(2),
        retry_backoff: Duration::from_millis(100),
        shutdown_timeout: Duration::from_secs(5),
    }
}

/// Echo server standing in for the process that owns the private
/// endpoint.
fn spawn_echo_server(name: &str) {
    let descriptor = AccessControlBuilder::new(None).build().unwrap();
    let listener = tunnel::public_listener(name, &descriptor).unwrap();
    tokio::spawn(async move {
        loop {
            let Ok(conn) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = conn.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
}

async fn connect_with_retry(name: &str) -> Stream {
    for _ in 0..200 {
        if let Ok(stream) = tunnel::connect(name).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("endpoint {name} never became connectable");
}

#[tokio::test]
async fn test_round_trip_transparency() {
    let private = unique_name("rt-private");
    let public = unique_name("rt-public");
    spawn_echo_server(&private);

    let mut tunnel = Tunnel::new(test_config(&private, &public)).unwrap();
    tunnel.start();

    let client = connect_with_retry(&public).await;
    let (mut reader, mut writer) = client.split();

    // Spans multiple relay chunks and exercises every byte value.
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 256) as u8).collect();

    let expected = payload.clone();
    let write_task = tokio::spawn(async move {
        writer.write_all(&expected).await.unwrap();
        writer.flush().await.unwrap();
        writer
    });

    let mut echoed = vec![0u8; payload.len()];
    reader.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload, "bytes must round-trip verbatim and in order");

    let writer = write_task.await.unwrap();
    drop(writer);
    drop(reader);

    tunnel.stop(true).await;
}

#[tokio::test]
async fn test_sequential_clients_get_increasing_sequences_and_isolated_sessions() {
    let private = unique_name("seq-private");
    let public = unique_name("seq-public");
    spawn_echo_server(&private);

    let mut tunnel = Tunnel::new(test_config(&private, &public)).unwrap();
    tunnel.start();

    for (i, payload) in [b"first client payload".as_slice(), b"second one"].iter().enumerate() {
        let mut client = connect_with_retry(&public).await;
        client.write_all(payload).await.unwrap();
        client.flush().await.unwrap();

        let mut echoed = vec![0u8; payload.len()];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, payload, "client {i} must only see its own bytes");
        drop(client);
    }

    assert_eq!(
        tunnel.sessions_accepted(),
        2,
        "each accepted connection gets the next sequence number"
    );

    tunnel.stop(true).await;
}

#[tokio::test]
async fn test_concurrent_clients_do_not_cross_talk() {
    let private = unique_name("iso-private");
    let public = unique_name("iso-public");
    spawn_echo_server(&private);

    let mut tunnel = Tunnel::new(test_config(&private, &public)).unwrap();
    tunnel.start();

    let mut handles = Vec::new();
    for i in 0u8..4 {
        let public = public.clone();
        handles.push(tokio::spawn(async move {
            let mut client = connect_with_retry(&public).await;
            let payload = vec![i; 4096];
            client.write_all(&payload).await.unwrap();
            client.flush().await.unwrap();

            let mut echoed = vec![0u8; payload.len()];
            client.read_exact(&mut echoed).await.unwrap();
            assert_eq!(echoed, payload, "client {i} received another session's bytes");
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(tunnel.sessions_accepted(), 4);
    tunnel.stop(true).await;
}

#[tokio::test]
async fn test_absent_private_endpoint_fails_session_but_listener_survives() {
    let private = unique_name("gone-private");
    let public = unique_name("gone-public");

    let mut config = test_config(&private, &public);
    config.connect_timeout = Duration::from_millis(300);

    let mut tunnel = Tunnel::new(config).unwrap();
    tunnel.start();

    // First client: session fails (nothing owns the private endpoint);
    // the client must get EOF or an error, never relayed bytes.
    let mut client = connect_with_retry(&public).await;
    client.write_all(b"never delivered").await.unwrap();
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("received {n} bytes through a session with no private side"),
        Err(_) => panic!("session was not torn down after the connect timeout"),
    }
    drop(client);

    // The listener must still accept within the backoff window.
    let second = connect_with_retry(&public).await;
    drop(second);

    // And once the private endpoint appears, relaying recovers.
    spawn_echo_server(&private);
    let mut third = connect_with_retry(&public).await;
    third.write_all(b"hello again").await.unwrap();
    third.flush().await.unwrap();
    let mut echoed = [0u8; 11];
    third.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"hello again");
    drop(third);

    tunnel.stop(true).await;
}

#[tokio::test]
async fn test_conflicting_names_never_listen() {
    let name = unique_name("conflict");

    let result = Tunnel::new(test_config(&name, &name));
    assert!(matches!(
        result,
        Err(pipetunnel::TunnelError::ConfigConflict { .. })
    ));

    // Case-insensitive conflict too.
    let upper = name.to_uppercase();
    assert!(Tunnel::new(test_config(&name, &upper)).is_err());

    // No public endpoint came into existence.
    assert!(tunnel::connect(&name).await.is_err());
}

#[tokio::test]
async fn test_stop_without_sessions_is_prompt() {
    let private = unique_name("stop-private");
    let public = unique_name("stop-public");

    let mut tunnel = Tunnel::new(test_config(&private, &public)).unwrap();
    tunnel.start();

    // Listener must be up before we tear it down.
    let probe = connect_with_retry(&public).await;
    drop(probe);

    let result = tokio::time::timeout(Duration::from_secs(5), tunnel.stop(true)).await;
    assert!(result.is_ok(), "stop must not hang without live sessions");
}
