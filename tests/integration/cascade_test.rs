//! Tunnel-loss behavior: every user session dies with the tunnel

use crate::{
    client_config, establish_echo_session, loopback, server_config, spawn_echo_backend,
    wait_for_server, TestPorts,
};
use portway_core::{ProxyServer, TunnelClient};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

#[tokio::test]
async fn tunnel_loss_closes_every_user_connection() {
    let ports = TestPorts::new();
    spawn_echo_backend(ports.backend).await;

    tokio::spawn(ProxyServer::new(server_config(&ports)).run());
    assert!(wait_for_server(loopback(ports.user), Duration::from_secs(5)).await);
    let client = tokio::spawn(TunnelClient::new(client_config(&ports)).run());

    let user_addr = loopback(ports.user);
    let mut users = [
        establish_echo_session(user_addr, b"one").await,
        establish_echo_session(user_addr, b"two").await,
        establish_echo_session(user_addr, b"three").await,
    ];

    // Kill the tunnel client; the server must cascade.
    client.abort();

    for user in &mut users {
        let mut buf = [0u8; 8];
        match timeout(Duration::from_secs(5), user.read(&mut buf))
            .await
            .expect("user connection not closed after tunnel loss")
        {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("unexpected {n} bytes after tunnel loss"),
        }
    }
}
