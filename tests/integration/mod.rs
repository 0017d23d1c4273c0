#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for Portway
//!
//! These tests run real servers, clients, and backends on loopback sockets.

mod cascade_test;
mod client_wire_test;

use portway_common::config::{ClientConfig, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};

static NEXT_PORT: std::sync::atomic::AtomicU16 = std::sync::atomic::AtomicU16::new(30000);

pub fn get_free_port() -> u16 {
    use std::sync::atomic::Ordering;
    loop {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
    }
}

pub fn loopback(port: u16) -> SocketAddr {
    ([127, 0, 0, 1], port).into()
}

/// A disjoint set of ports for one test's server, client, and backend.
pub struct TestPorts {
    pub user: u16,
    pub tunnel: u16,
    pub manager: u16,
    pub backend: u16,
}

impl TestPorts {
    pub fn new() -> Self {
        Self {
            user: get_free_port(),
            tunnel: get_free_port(),
            manager: get_free_port(),
            backend: get_free_port(),
        }
    }
}

pub fn server_config(ports: &TestPorts) -> ServerConfig {
    ServerConfig {
        tunnel_listen: loopback(ports.tunnel),
        user_listen: loopback(ports.user),
        manager_listen: loopback(ports.manager),
        print_payloads: false,
    }
}

/// Client config pointed at the test's ports. The heartbeat period is long
/// so beats never pollute frame-level assertions; tests that watch the
/// heartbeat shorten it explicitly.
pub fn client_config(ports: &TestPorts) -> ClientConfig {
    ClientConfig {
        server_addr: format!("127.0.0.1:{}", ports.tunnel),
        backend_addr: format!("127.0.0.1:{}", ports.backend),
        connect_timeout: Duration::from_secs(1),
        heartbeat_ticks: 60,
        print_payloads: false,
    }
}

/// Wait for a listener to start accepting connections.
pub async fn wait_for_server(addr: SocketAddr, limit: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Echo service standing in for the real backend.
pub async fn spawn_echo_backend(port: u16) {
    let listener = TcpListener::bind(loopback(port)).await.unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
}

/// Connect to the user port and prove the relay works by echoing `token`.
///
/// Retries until the tunnel client has attached; the tunnel being ready is
/// not observable from the outside, only from a successful round trip.
pub async fn establish_echo_session(user_addr: SocketAddr, token: &[u8]) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        assert!(Instant::now() < deadline, "relay did not become ready");
        if let Ok(mut stream) = TcpStream::connect(user_addr).await {
            if stream.write_all(token).await.is_ok() {
                let mut buf = vec![0u8; token.len()];
                if let Ok(Ok(_)) =
                    timeout(Duration::from_secs(2), stream.read_exact(&mut buf)).await
                {
                    assert_eq!(buf, token);
                    return stream;
                }
            }
        }
        sleep(Duration::from_millis(100)).await;
    }
}
