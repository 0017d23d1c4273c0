//! Client role: the tunnel demultiplexer
//!
//! Connects to the server's tunnel port and relays each announced session to
//! the backend service. The per-session state lives in one select loop over
//! decoded tunnel frames, backend socket events, and the heartbeat tick.

use crate::net::{conn, socket_tuning, SocketEvent};
use crate::tunnel::heartbeat::Heartbeat;
use crate::tunnel::session::SessionTable;
use futures::{SinkExt, StreamExt};
use kanal::AsyncSender;
use portway_common::config::ClientConfig;
use portway_common::constants::{EVENT_QUEUE_DEPTH, HEARTBEAT_TICK, RECONNECT_DELAY};
use portway_common::Result;
use portway_protocol::{Event, WireCodec};
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

pub struct TunnelClient {
    config: ClientConfig,
}

impl TunnelClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Connect to the server and relay forever.
    ///
    /// A failed connect is retried after a fixed delay; a lost session is
    /// followed by an immediate reconnect. There is no backoff.
    pub async fn run(self) -> Result<()> {
        info!(
            "tunnel client starting: server {}, backend {}, connect timeout {:?}, heartbeat every {}s",
            self.config.server_addr,
            self.config.backend_addr,
            self.config.connect_timeout,
            self.config.heartbeat_ticks,
        );

        // Held at its grace value whenever the tunnel is down, so the first
        // beat after a reconnect is never immediate.
        let mut heartbeat = Heartbeat::new(self.config.heartbeat_ticks);

        loop {
            match TcpStream::connect(&self.config.server_addr).await {
                Ok(stream) => {
                    socket_tuning::configure_silent(&stream);
                    info!("connected to proxy server {}", self.config.server_addr);
                    heartbeat.reset();
                    self.serve(stream, &mut heartbeat).await;
                    info!("reconnecting to proxy server...");
                }
                Err(e) => {
                    warn!(
                        "connect to proxy server {} failed: {}; retrying",
                        self.config.server_addr, e
                    );
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Relay over one established tunnel connection until it drops.
    async fn serve(&self, stream: TcpStream, heartbeat: &mut Heartbeat) {
        let (read_half, write_half) = stream.into_split();
        let mut frames = FramedRead::new(read_half, WireCodec::new());

        let (frame_tx, frame_rx) = kanal::unbounded_async::<Event>();
        tokio::spawn(async move {
            let mut sink = FramedWrite::new(write_half, WireCodec::new());
            while let Ok(event) = frame_rx.recv().await {
                if let Err(e) = sink.send(event).await {
                    warn!("tunnel write failed: {}", e);
                    break;
                }
            }
        });

        let (sock_tx, sock_rx) = kanal::bounded_async::<SocketEvent>(EVENT_QUEUE_DEPTH);
        let backends = SessionTable::new();
        let mut tick = interval_at(Instant::now() + HEARTBEAT_TICK, HEARTBEAT_TICK);
        // The countdown pauses while the loop is held up (e.g. inside a
        // backend connect wait) instead of replaying missed ticks.
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = frames.next() => match next {
                    Some(Ok(event)) => self.on_tunnel_event(event, &backends, &frame_tx, &sock_tx).await,
                    Some(Err(e)) => {
                        warn!("tunnel read failed: {}", e);
                        break;
                    }
                    None => {
                        info!("proxy server closed the tunnel");
                        break;
                    }
                },
                socket = sock_rx.recv() => match socket {
                    Ok(event) => self.on_backend_event(event, &backends, &frame_tx).await,
                    Err(_) => break,
                },
                _ = tick.tick() => {
                    if heartbeat.on_tick() {
                        debug!("sending heartbeat");
                        tell(&frame_tx, Event::Alive).await;
                    }
                }
            }
        }

        // The tunnel is gone: every backend conversation dies with it.
        let dropped = backends.drain();
        for (_, handle) in &dropped {
            handle.abort();
        }
        if !dropped.is_empty() {
            info!("dropped {} backend connections", dropped.len());
        }
    }

    async fn on_tunnel_event(
        &self,
        event: Event,
        backends: &SessionTable,
        frame_tx: &AsyncSender<Event>,
        sock_tx: &AsyncSender<SocketEvent>,
    ) {
        match event {
            Event::Connect(id) => {
                info!(
                    "session {} announced; connecting backend {}",
                    id, self.config.backend_addr
                );
                // Bounded wait; on any failure the server is told the
                // session is dead and the attempt is never retried.
                match timeout(
                    self.config.connect_timeout,
                    TcpStream::connect(&self.config.backend_addr),
                )
                .await
                {
                    Ok(Ok(stream)) => {
                        socket_tuning::configure_silent(&stream);
                        let handle = conn::spawn(id, stream, sock_tx.clone());
                        if let Some(old) = backends.insert(id, handle) {
                            old.abort();
                        }
                        info!("backend connected for session {}", id);
                    }
                    Ok(Err(e)) => {
                        warn!("cannot connect to backend for session {}: {}", id, e);
                        tell(frame_tx, Event::Disconnect(id)).await;
                    }
                    Err(_) => {
                        warn!("backend connect timed out for session {}", id);
                        tell(frame_tx, Event::Disconnect(id)).await;
                    }
                }
            }
            Event::Message { id, data } => {
                if self.config.print_payloads {
                    info!("session {} sent {} bytes", id, data.len());
                    info!("{}", String::from_utf8_lossy(&data));
                }
                if let Some(sender) = backends.sender(id) {
                    if sender.send(data).await.is_err() {
                        debug!("backend writer for session {} is gone", id);
                    }
                }
            }
            Event::Disconnect(id) => {
                if let Some(handle) = backends.remove(id) {
                    info!("session {} closed by server", id);
                    handle.abort();
                }
            }
            // The server has no heartbeat of its own; tolerated.
            Event::Alive => {}
        }
    }

    async fn on_backend_event(
        &self,
        event: SocketEvent,
        backends: &SessionTable,
        frame_tx: &AsyncSender<Event>,
    ) {
        match event {
            SocketEvent::Data { id, bytes } => {
                if !backends.contains(id) {
                    return;
                }
                if self.config.print_payloads {
                    info!("backend sent {} bytes for session {}", bytes.len(), id);
                    info!("{}", String::from_utf8_lossy(&bytes));
                }
                tell(frame_tx, Event::Message { id, data: bytes }).await;
            }
            SocketEvent::Closed { id } => {
                if backends.remove(id).is_some() {
                    info!("backend dropped session {}", id);
                    tell(frame_tx, Event::Disconnect(id)).await;
                }
            }
        }
    }
}

async fn tell(frame_tx: &AsyncSender<Event>, event: Event) {
    if frame_tx.send(event).await.is_err() {
        warn!("tell to proxy server failed");
    }
}
