//! Server role: the proxy multiplexer
//!
//! Three listeners feed one event queue: the public user port, the tunnel
//! port for the single trusted client, and the management port. A single
//! loop drains the queue and owns all state (the session table and the
//! current tunnel link), so every create/remove/forward happens on one task
//! and connection removal never races the I/O side.

use crate::net::{conn, Acceptor, SocketEvent};
use crate::tunnel::session::SessionTable;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use kanal::AsyncSender;
use portway_common::config::ServerConfig;
use portway_common::constants::EVENT_QUEUE_DEPTH;
use portway_common::Result;
use portway_protocol::{Event, SessionId, WireCodec};
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Everything the event loop can be woken up with.
enum ServerEvent {
    UserAccepted(TcpStream, SocketAddr),
    TunnelAccepted(TcpStream, SocketAddr),
    ManagerAccepted(TcpStream, SocketAddr),
    User(SocketEvent),
    /// Decoded frame from the tunnel connection of the given epoch.
    Tunnel { epoch: u64, event: Event },
    TunnelClosed { epoch: u64 },
    /// Bytes arrived on a management connection.
    Shutdown,
}

impl From<SocketEvent> for ServerEvent {
    fn from(event: SocketEvent) -> Self {
        Self::User(event)
    }
}

pub struct ProxyServer {
    config: ServerConfig,
}

impl ProxyServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Bind all three listeners and serve until the management port orders a
    /// shutdown. Any bind failure aborts startup.
    pub async fn run(self) -> Result<()> {
        let user = Acceptor::bind(self.config.user_listen).await?;
        let tunnel = Acceptor::bind(self.config.tunnel_listen).await?;
        let manager = Acceptor::bind(self.config.manager_listen).await?;
        info!(
            "proxy server listening: users on {}, tunnel client on {}, manager on {}",
            user.local_addr()?,
            tunnel.local_addr()?,
            manager.local_addr()?,
        );

        let (events_tx, events_rx) = kanal::bounded_async::<ServerEvent>(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        user.spawn_into(events_tx.clone(), shutdown_rx.clone(), ServerEvent::UserAccepted);
        tunnel.spawn_into(
            events_tx.clone(),
            shutdown_rx.clone(),
            ServerEvent::TunnelAccepted,
        );
        manager.spawn_into(events_tx.clone(), shutdown_rx, ServerEvent::ManagerAccepted);

        let mut state = ServerState {
            sessions: SessionTable::new(),
            tunnel: None,
            epoch: 0,
            events: events_tx,
            print_payloads: self.config.print_payloads,
        };

        while let Ok(event) = events_rx.recv().await {
            match event {
                ServerEvent::Shutdown => {
                    info!("shutdown requested on manager port");
                    break;
                }
                other => state.handle(other).await,
            }
        }

        let _ = shutdown_tx.send(true);
        state.teardown();
        info!("proxy server stopped");
        Ok(())
    }
}

/// The single tunnel connection, as seen by the event loop.
struct TunnelLink {
    frames: AsyncSender<Event>,
    abort_tx: watch::Sender<bool>,
    peer: SocketAddr,
}

impl TunnelLink {
    fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }

    async fn tell(&self, event: Event) {
        if self.frames.send(event).await.is_err() {
            warn!("tell to tunnel client failed");
        }
    }
}

struct ServerState {
    sessions: SessionTable,
    tunnel: Option<TunnelLink>,
    /// Bumped for every attached tunnel; events from replaced tunnels carry
    /// a stale epoch and are discarded.
    epoch: u64,
    events: AsyncSender<ServerEvent>,
    print_payloads: bool,
}

impl ServerState {
    async fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::UserAccepted(stream, peer) => self.on_user_accepted(stream, peer).await,
            ServerEvent::TunnelAccepted(stream, peer) => self.on_tunnel_accepted(stream, peer),
            ServerEvent::ManagerAccepted(stream, peer) => self.on_manager_accepted(stream, peer),
            ServerEvent::User(SocketEvent::Data { id, bytes }) => {
                self.on_user_data(id, bytes).await;
            }
            ServerEvent::User(SocketEvent::Closed { id }) => self.on_user_closed(id).await,
            ServerEvent::Tunnel { epoch, event } if epoch == self.epoch => {
                self.on_tunnel_event(event).await;
            }
            ServerEvent::Tunnel { .. } => {}
            ServerEvent::TunnelClosed { epoch } => self.on_tunnel_closed(epoch),
            ServerEvent::Shutdown => {}
        }
    }

    async fn on_user_accepted(&mut self, stream: TcpStream, peer: SocketAddr) {
        // No tunnel client, no backend: the user connection is aborted on
        // the spot by dropping it.
        let Some(tunnel) = &self.tunnel else {
            info!("user {} rejected: no tunnel client attached", peer);
            return;
        };

        let id = self.sessions.allocate();
        let handle = conn::spawn(id, stream, self.events.clone());
        self.sessions.insert(id, handle);
        info!(
            "user {} connected as session {} ({} active)",
            peer,
            id,
            self.sessions.len()
        );
        tunnel.tell(Event::Connect(id)).await;
    }

    async fn on_user_data(&mut self, id: SessionId, bytes: Bytes) {
        if !self.sessions.contains(id) {
            return;
        }
        if self.print_payloads {
            info!("user session {} sent {} bytes", id, bytes.len());
            info!("{}", String::from_utf8_lossy(&bytes));
        }
        if let Some(tunnel) = &self.tunnel {
            tunnel.tell(Event::Message { id, data: bytes }).await;
        }
    }

    async fn on_user_closed(&mut self, id: SessionId) {
        if self.sessions.remove(id).is_some() {
            info!(
                "user session {} disconnected ({} active)",
                id,
                self.sessions.len()
            );
            if let Some(tunnel) = &self.tunnel {
                tunnel.tell(Event::Disconnect(id)).await;
            }
        }
    }

    fn on_tunnel_accepted(&mut self, stream: TcpStream, peer: SocketAddr) {
        // Only one tunnel client at a time; a newcomer replaces the old
        // connection without touching the live user sessions.
        if let Some(old) = self.tunnel.take() {
            info!("tunnel client {} replaced by {}", old.peer, peer);
            old.abort();
        }
        self.epoch += 1;
        info!("tunnel client {} attached", peer);
        self.tunnel = Some(spawn_tunnel(stream, peer, self.epoch, self.events.clone()));
    }

    fn on_manager_accepted(&self, stream: TcpStream, peer: SocketAddr) {
        info!("manager connection from {}", peer);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            let mut buf = [0u8; 64];
            // Any received bytes trigger shutdown; a silent close does not.
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => {}
                Ok(_) => {
                    let _ = events.send(ServerEvent::Shutdown).await;
                }
            }
        });
    }

    async fn on_tunnel_event(&mut self, event: Event) {
        match event {
            Event::Message { id, data } => {
                if self.print_payloads {
                    info!("backend sent {} bytes for session {}", data.len(), id);
                    info!("{}", String::from_utf8_lossy(&data));
                }
                // Unknown ids are dropped without a word.
                if let Some(sender) = self.sessions.sender(id) {
                    if sender.send(data).await.is_err() {
                        debug!("session {} writer is gone", id);
                    }
                }
            }
            Event::Disconnect(id) => {
                if let Some(handle) = self.sessions.remove(id) {
                    info!("tunnel client dropped session {}", id);
                    handle.abort();
                }
            }
            Event::Alive => info!("tunnel client alive"),
            // The client never announces sessions; ignore.
            Event::Connect(_) => {}
        }
    }

    fn on_tunnel_closed(&mut self, epoch: u64) {
        if epoch != self.epoch {
            return;
        }
        self.tunnel = None;
        let dropped = self.sessions.drain();
        for (_, handle) in &dropped {
            handle.abort();
        }
        info!(
            "tunnel client disconnected; dropped {} user sessions",
            dropped.len()
        );
    }

    fn teardown(&mut self) {
        if let Some(tunnel) = self.tunnel.take() {
            tunnel.abort();
        }
        for (_, handle) in self.sessions.drain() {
            handle.abort();
        }
    }
}

/// Spawn the read and write tasks for a freshly accepted tunnel connection.
fn spawn_tunnel(
    stream: TcpStream,
    peer: SocketAddr,
    epoch: u64,
    events: AsyncSender<ServerEvent>,
) -> TunnelLink {
    let (read_half, write_half) = stream.into_split();
    let (frame_tx, frame_rx) = kanal::unbounded_async::<Event>();
    let (abort_tx, mut abort_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut sink = FramedWrite::new(write_half, WireCodec::new());
        while let Ok(event) = frame_rx.recv().await {
            if let Err(e) = sink.send(event).await {
                warn!("tunnel write failed: {}", e);
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut frames = FramedRead::new(read_half, WireCodec::new());
        loop {
            tokio::select! {
                _ = abort_rx.changed() => break,
                next = frames.next() => match next {
                    Some(Ok(event)) => {
                        if events
                            .send(ServerEvent::Tunnel { epoch, event })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("tunnel read failed: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }
        let _ = events.send(ServerEvent::TunnelClosed { epoch }).await;
    });

    TunnelLink {
        frames: frame_tx,
        abort_tx,
        peer,
    }
}
