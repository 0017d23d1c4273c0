//! Per-connection read/write tasks
//!
//! Each spawned connection gets a dedicated read task and a dedicated write
//! task. The read task forwards arbitrary byte chunks into the owner's event
//! queue and reports `Closed` exactly once, whether the peer hung up, the
//! stream failed, or the owner aborted. The write task drains a
//! fire-and-forget queue; a failed write is logged and ends the task, it is
//! never retried or escalated.

use bytes::{Bytes, BytesMut};
use kanal::{AsyncReceiver, AsyncSender};
use portway_protocol::SessionId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Lifecycle and data notifications for one spawned connection.
#[derive(Debug)]
pub enum SocketEvent {
    /// A chunk of bytes arrived; chunk boundaries carry no meaning.
    Data { id: SessionId, bytes: Bytes },
    /// The connection is gone. Fired exactly once per connection.
    Closed { id: SessionId },
}

/// Owner's grip on a spawned connection: queue bytes for writing, or abort.
///
/// Dropping the handle closes the write side once queued bytes have been
/// flushed; [`ConnHandle::abort`] additionally stops the read task. Both are
/// safe to invoke any number of times.
#[derive(Debug)]
pub struct ConnHandle {
    data_tx: AsyncSender<Bytes>,
    abort_tx: watch::Sender<bool>,
}

impl ConnHandle {
    /// Clone of the write queue for this connection.
    pub fn sender(&self) -> AsyncSender<Bytes> {
        self.data_tx.clone()
    }

    /// Force-disconnect. Idempotent; the `Closed` event still fires once.
    pub fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }
}

/// Spawn the read and write tasks for `stream`.
///
/// Events are tagged with `id` and delivered to `events`; `E` lets each role
/// wrap [`SocketEvent`] in its own event type.
pub fn spawn<S, E>(id: SessionId, stream: S, events: AsyncSender<E>) -> ConnHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    E: From<SocketEvent> + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (data_tx, data_rx) = kanal::unbounded_async::<Bytes>();
    let (abort_tx, abort_rx) = watch::channel(false);

    tokio::spawn(write_loop(id, write_half, data_rx));
    tokio::spawn(read_loop(id, read_half, events, abort_rx));

    ConnHandle { data_tx, abort_tx }
}

async fn write_loop<S>(id: SessionId, mut half: WriteHalf<S>, data_rx: AsyncReceiver<Bytes>)
where
    S: AsyncWrite + Send + 'static,
{
    while let Ok(bytes) = data_rx.recv().await {
        if let Err(e) = half.write_all(&bytes).await {
            warn!("write to connection {} failed: {}", id, e);
            break;
        }
    }
    let _ = half.shutdown().await;
}

async fn read_loop<S, E>(
    id: SessionId,
    mut half: ReadHalf<S>,
    events: AsyncSender<E>,
    mut abort_rx: watch::Receiver<bool>,
) where
    S: AsyncRead + Send + 'static,
    E: From<SocketEvent> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        tokio::select! {
            _ = abort_rx.changed() => break,
            result = half.read_buf(&mut buf) => match result {
                Ok(0) => break,
                Ok(_) => {
                    let bytes = buf.split().freeze();
                    if events
                        .send(SocketEvent::Data { id, bytes }.into())
                        .await
                        .is_err()
                    {
                        // Owner is gone; nobody is left to tell.
                        return;
                    }
                    buf.reserve(READ_BUFFER_SIZE);
                }
                Err(e) => {
                    debug!("read from connection {} failed: {}", id, e);
                    break;
                }
            },
        }
    }
    let _ = events.send(SocketEvent::Closed { id }.into()).await;
}
