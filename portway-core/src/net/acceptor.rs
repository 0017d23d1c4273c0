//! Listening socket feeding accepted connections into a role's event queue

use crate::net::socket_tuning;
use kanal::AsyncSender;
use portway_common::Result;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bound listener for one of the server's ports.
///
/// Bind failures surface at the call site; the server treats them as fatal
/// to startup. Accept failures are logged and the loop keeps going.
pub struct Acceptor {
    listener: TcpListener,
}

impl Acceptor {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until `shutdown` fires, wrapping each accepted
    /// connection with `wrap` and pushing it onto the shared event queue.
    ///
    /// The listening handle is dropped (closed) when the loop exits.
    pub fn spawn_into<E, F>(
        self,
        events: AsyncSender<E>,
        mut shutdown: watch::Receiver<bool>,
        wrap: F,
    ) -> JoinHandle<()>
    where
        E: Send + 'static,
        F: Fn(TcpStream, SocketAddr) -> E + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    result = self.listener.accept() => match result {
                        Ok((stream, peer)) => {
                            socket_tuning::configure_silent(&stream);
                            if events.send(wrap(stream, peer)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    },
                }
            }
            debug!("listener closed");
        })
    }
}
