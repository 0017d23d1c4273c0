//! Wire-level client behavior, observed by a test double speaking the
//! framing protocol on the tunnel port.

use crate::{client_config, loopback, spawn_echo_backend, TestPorts};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use portway_core::TunnelClient;
use portway_protocol::{Event, SessionId, WireCodec};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_util::codec::Framed;

async fn accept_tunnel(listener: &TcpListener) -> Framed<TcpStream, WireCodec> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client did not connect")
        .unwrap();
    Framed::new(stream, WireCodec::new())
}

async fn next_event(tunnel: &mut Framed<TcpStream, WireCodec>) -> Event {
    timeout(Duration::from_secs(5), tunnel.next())
        .await
        .expect("no frame from client")
        .expect("tunnel closed")
        .expect("frame error")
}

#[tokio::test]
async fn relays_between_tunnel_and_backend() {
    let ports = TestPorts::new();
    spawn_echo_backend(ports.backend).await;
    let listener = TcpListener::bind(loopback(ports.tunnel)).await.unwrap();
    tokio::spawn(TunnelClient::new(client_config(&ports)).run());
    let mut tunnel = accept_tunnel(&listener).await;

    let id = SessionId::new(3);
    tunnel.send(Event::Connect(id)).await.unwrap();
    tunnel
        .send(Event::Message {
            id,
            data: Bytes::from_static(b"hello"),
        })
        .await
        .unwrap();

    // The echo backend bounces the payload straight back.
    assert_eq!(
        next_event(&mut tunnel).await,
        Event::Message {
            id,
            data: Bytes::from_static(b"hello"),
        }
    );
}

#[tokio::test]
async fn unreachable_backend_reports_exactly_one_disconnect() {
    let ports = TestPorts::new();
    // Nothing listens on the backend port.
    let listener = TcpListener::bind(loopback(ports.tunnel)).await.unwrap();
    tokio::spawn(TunnelClient::new(client_config(&ports)).run());
    let mut tunnel = accept_tunnel(&listener).await;

    let id = SessionId::new(7);
    tunnel.send(Event::Connect(id)).await.unwrap();
    assert_eq!(next_event(&mut tunnel).await, Event::Disconnect(id));

    // Traffic for the dead session is dropped, not forwarded and not
    // answered; the heartbeat is far away, so the line stays silent.
    tunnel
        .send(Event::Message {
            id,
            data: Bytes::from_static(b"ping"),
        })
        .await
        .unwrap();
    let silence = timeout(Duration::from_millis(1500), tunnel.next()).await;
    assert!(silence.is_err(), "unexpected frame: {silence:?}");
}

#[tokio::test]
async fn backend_disconnect_reports_the_session_dead() {
    let ports = TestPorts::new();
    // A backend that drops every connection after the first read.
    let backend = TcpListener::bind(loopback(ports.backend)).await.unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = backend.accept().await else {
                return;
            };
            tokio::spawn(async move {
                use tokio::io::AsyncReadExt;
                let mut buf = [0u8; 64];
                let _ = stream.read(&mut buf).await;
            });
        }
    });

    let listener = TcpListener::bind(loopback(ports.tunnel)).await.unwrap();
    tokio::spawn(TunnelClient::new(client_config(&ports)).run());
    let mut tunnel = accept_tunnel(&listener).await;

    let id = SessionId::new(11);
    tunnel.send(Event::Connect(id)).await.unwrap();
    tunnel
        .send(Event::Message {
            id,
            data: Bytes::from_static(b"bye"),
        })
        .await
        .unwrap();

    assert_eq!(next_event(&mut tunnel).await, Event::Disconnect(id));
}

#[tokio::test]
async fn heartbeat_waits_a_full_period_then_repeats() {
    let ports = TestPorts::new();
    let listener = TcpListener::bind(loopback(ports.tunnel)).await.unwrap();
    let mut config = client_config(&ports);
    config.heartbeat_ticks = 1;
    tokio::spawn(TunnelClient::new(config).run());

    let start = Instant::now();
    let mut tunnel = accept_tunnel(&listener).await;

    assert_eq!(next_event(&mut tunnel).await, Event::Alive);
    assert!(
        start.elapsed() >= Duration::from_millis(500),
        "first heartbeat must wait a full period"
    );
    assert_eq!(next_event(&mut tunnel).await, Event::Alive);
}
