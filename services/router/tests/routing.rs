
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use harness::{dead_endpoint, handshake, routes, EchoBackend, RouterHandle};
use mcproxy_router::{Endpoint, ListenerStats, RouteTable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Send a handshake plus `payload` and read back the echo of both.
async fn roundtrip(
    router: &RouterHandle,
    server_address: &str,
    payload: &[u8],
) -> std::io::Result<Vec<u8>> {
    let packet = handshake(server_address);
    let mut stream = TcpStream::connect(router.listen_addr).await?;
    stream.write_all(&packet).await?;

    let mut echoed = vec![0u8; packet.len()];
    stream.read_exact(&mut echoed).await?;
    assert_eq!(echoed, packet, "backend should echo the forwarded handshake");

    stream.write_all(payload).await?;
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Wait until the router closes `stream` without sending anything.
async fn assert_closed(mut stream: TcpStream) {
    let mut buf = [0u8; 16];
    match timeout(TEST_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("Expected close, got {} bytes", n),
        Err(_) => panic!("Connection was not closed"),
    }
}

async fn wait_for_stat(stats: &ListenerStats, read: impl Fn(&ListenerStats) -> u64, expected: u64) {
    for _ in 0..250 {
        if read(stats) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("stat never reached {}, last value {}", expected, read(stats));
}

#[tokio::test]
async fn routes_by_server_address() {
    let mut backend_a = EchoBackend::spawn().await.unwrap();
    let mut backend_b = EchoBackend::spawn().await.unwrap();

    let router = RouterHandle::spawn(routes(&[
        ("a.example.test", backend_a.endpoint()),
        ("b.example.test", backend_b.endpoint()),
    ]))
    .await
    .unwrap();

    let echoed = timeout(TEST_TIMEOUT, roundtrip(&router, "a.example.test", b"ping-a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, b"ping-a");
    assert_eq!(
        backend_a.next_first_chunk().await.unwrap(),
        handshake("a.example.test"),
        "backend must see the client's handshake verbatim"
    );

    let echoed = timeout(TEST_TIMEOUT, roundtrip(&router, "b.example.test", b"ping-b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, b"ping-b");
    assert_eq!(
        backend_b.next_first_chunk().await.unwrap(),
        handshake("b.example.test")
    );

    assert_eq!(backend_a.connection_count(), 1);
    assert_eq!(backend_b.connection_count(), 1);
}

#[tokio::test]
async fn unknown_host_uses_default_route() {
    let backend_a = EchoBackend::spawn().await.unwrap();
    let mut fallback = EchoBackend::spawn().await.unwrap();

    let router = RouterHandle::spawn(routes(&[
        ("a.example.test", backend_a.endpoint()),
        ("default", fallback.endpoint()),
    ]))
    .await
    .unwrap();

    let echoed = timeout(TEST_TIMEOUT, roundtrip(&router, "unknown.example.test", b"hi"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, b"hi");
    assert_eq!(
        fallback.next_first_chunk().await.unwrap(),
        handshake("unknown.example.test")
    );
    assert_eq!(backend_a.connection_count(), 0);
}

#[tokio::test]
async fn host_matching_is_case_sensitive() {
    let backend_a = EchoBackend::spawn().await.unwrap();
    let fallback = EchoBackend::spawn().await.unwrap();

    let router = RouterHandle::spawn(routes(&[
        ("a.example.test", backend_a.endpoint()),
        ("default", fallback.endpoint()),
    ]))
    .await
    .unwrap();

    timeout(TEST_TIMEOUT, roundtrip(&router, "A.Example.Test", b"x"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(backend_a.connection_count(), 0);
    assert_eq!(fallback.connection_count(), 1);
}

#[tokio::test]
async fn no_route_and_no_default_closes_connection() {
    let backend_a = EchoBackend::spawn().await.unwrap();
    let router = RouterHandle::spawn(routes(&[("a.example.test", backend_a.endpoint())]))
        .await
        .unwrap();

    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    stream
        .write_all(&handshake("unknown.example.test"))
        .await
        .unwrap();
    assert_closed(stream).await;

    let stats = router.listener.stats();
    wait_for_stat(stats, |s| s.routes_missing.load(Ordering::Relaxed), 1).await;
    wait_for_stat(stats, |s| s.connections_failed.load(Ordering::Relaxed), 1).await;
    assert_eq!(backend_a.connection_count(), 0);
}

#[tokio::test]
async fn non_handshake_packet_is_rejected() {
    let backend = EchoBackend::spawn().await.unwrap();
    let router = RouterHandle::spawn(routes(&[("default", backend.endpoint())]))
        .await
        .unwrap();

    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    // Length 1, packet id 0x01.
    stream.write_all(&[0x01, 0x01]).await.unwrap();
    assert_closed(stream).await;

    wait_for_stat(
        router.listener.stats(),
        |s| s.handshakes_rejected.load(Ordering::Relaxed),
        1,
    )
    .await;
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn truncated_handshake_is_rejected() {
    let backend = EchoBackend::spawn().await.unwrap();
    let router = RouterHandle::spawn(routes(&[("default", backend.endpoint())]))
        .await
        .unwrap();

    let packet = handshake("play.example.test");
    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    stream.write_all(&packet[..6]).await.unwrap();
    assert_closed(stream).await;

    wait_for_stat(
        router.listener.stats(),
        |s| s.handshakes_rejected.load(Ordering::Relaxed),
        1,
    )
    .await;
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn dial_failure_closes_client_and_keeps_accepting() {
    let backend = EchoBackend::spawn().await.unwrap();
    let router = RouterHandle::spawn(routes(&[
        ("down.example.test", dead_endpoint().await),
        ("up.example.test", backend.endpoint()),
    ]))
    .await
    .unwrap();

    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    stream
        .write_all(&handshake("down.example.test"))
        .await
        .unwrap();
    assert_closed(stream).await;

    wait_for_stat(
        router.listener.stats(),
        |s| s.backend_failed.load(Ordering::Relaxed),
        1,
    )
    .await;

    // The accept loop is unaffected by the failed connection.
    let echoed = timeout(TEST_TIMEOUT, roundtrip(&router, "up.example.test", b"still up"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, b"still up");
}

#[tokio::test]
async fn empty_connection_closes_cleanly() {
    let backend = EchoBackend::spawn().await.unwrap();
    let router = RouterHandle::spawn(routes(&[("default", backend.endpoint())]))
        .await
        .unwrap();

    let stream = TcpStream::connect(router.listen_addr).await.unwrap();
    drop(stream);

    let stats = router.listener.stats();
    wait_for_stat(stats, |s| s.connections_closed.load(Ordering::Relaxed), 1).await;
    assert_eq!(stats.connections_failed.load(Ordering::Relaxed), 0);
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn unloaded_route_table_fails_connection() {
    let router = RouterHandle::spawn_with_table(Arc::new(RouteTable::new()))
        .await
        .unwrap();

    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    stream.write_all(&handshake("a.example.test")).await.unwrap();
    assert_closed(stream).await;

    wait_for_stat(
        router.listener.stats(),
        |s| s.connections_failed.load(Ordering::Relaxed),
        1,
    )
    .await;
}

#[tokio::test]
async fn route_update_applies_to_new_connections() {
    let old_backend = EchoBackend::spawn().await.unwrap();
    let new_backend = EchoBackend::spawn().await.unwrap();

    let router = RouterHandle::spawn(routes(&[("a.example.test", old_backend.endpoint())]))
        .await
        .unwrap();

    timeout(TEST_TIMEOUT, roundtrip(&router, "a.example.test", b"1"))
        .await
        .unwrap()
        .unwrap();

    router
        .route_table
        .update(routes(&[("a.example.test", new_backend.endpoint())]));

    timeout(TEST_TIMEOUT, roundtrip(&router, "a.example.test", b"2"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(old_backend.connection_count(), 1);
    assert_eq!(new_backend.connection_count(), 1);
}

#[tokio::test]
async fn client_close_tears_down_backend_connection() {
    let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = oneshot::channel();

    // Backend that never writes and reports when its side sees EOF.
    tokio::spawn(async move {
        let (mut stream, _) = backend_listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    let router = RouterHandle::spawn(routes(&[(
        "a.example.test",
        Endpoint::new(backend_addr.to_string()),
    )]))
    .await
    .unwrap();

    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    stream.write_all(&handshake("a.example.test")).await.unwrap();
    stream.write_all(b"some game traffic").await.unwrap();

    let stats = router.listener.stats();
    wait_for_stat(stats, |s| s.backend_connected.load(Ordering::Relaxed), 1).await;
    drop(stream);

    timeout(TEST_TIMEOUT, closed_rx)
        .await
        .expect("backend connection was not closed")
        .unwrap();

    wait_for_stat(stats, |s| s.connections_active.load(Ordering::Relaxed), 0).await;
    wait_for_stat(stats, |s| s.connections_closed.load(Ordering::Relaxed), 1).await;
}

#[tokio::test]
async fn backend_close_tears_down_client_connection() {
    let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend_listener.local_addr().unwrap();

    // Backend that reads the handshake, replies once and hangs up.
    let packet = handshake("any.example.test");
    let expected_len = packet.len();
    tokio::spawn(async move {
        let (mut stream, _) = backend_listener.accept().await.unwrap();
        let mut buf = vec![0u8; expected_len];
        let _ = stream.read_exact(&mut buf).await;
        let _ = stream.write_all(b"bye").await;
    });

    let router = RouterHandle::spawn(routes(&[(
        "default",
        Endpoint::new(backend_addr.to_string()),
    )]))
    .await
    .unwrap();

    let mut stream = TcpStream::connect(router.listen_addr).await.unwrap();
    stream.write_all(&packet).await.unwrap();

    let mut buf = [0u8; 3];
    timeout(TEST_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"bye");

    assert_closed(stream).await;
}
