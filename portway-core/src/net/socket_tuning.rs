//! Socket tuning for relay connections
//!
//! Applies `TCP_NODELAY` (relayed chunks are latency-sensitive) and TCP
//! keepalive so dead tunnel peers are noticed without protocol-level probes.

use socket2::SockRef;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

const KEEPALIVE_TIME: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn configure(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;

    let socket = SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    socket.set_tcp_keepalive(&keepalive)?;

    Ok(())
}

pub fn configure_silent(stream: &TcpStream) {
    let _ = configure(stream);
}
