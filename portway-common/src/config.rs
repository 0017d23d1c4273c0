//! Typed configuration for the two roles

use crate::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEARTBEAT_SECS};
use crate::settings::Settings;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Server-side configuration (`listen/*` keys).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener for the single tunnel client.
    pub tunnel_listen: SocketAddr,
    /// Public-facing listener for end users.
    pub user_listen: SocketAddr,
    /// Management listener; any received bytes shut the server down.
    pub manager_listen: SocketAddr,
    /// Log relayed payloads at info level.
    pub print_payloads: bool,
}

impl ServerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tunnel_listen: any_addr(settings.number("listen/client", 0)),
            user_listen: any_addr(settings.number("listen/user", 0)),
            manager_listen: any_addr(settings.number("listen/manager", 0)),
            print_payloads: false,
        }
    }

    #[must_use]
    pub fn with_print_payloads(mut self, enabled: bool) -> Self {
        self.print_payloads = enabled;
        self
    }
}

/// Client-side configuration (`real/*` and `virtual/*` keys).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Tunnel server address (`virtual/host:virtual/port`).
    pub server_addr: String,
    /// Backend service address (`real/host:real/port`).
    pub backend_addr: String,
    /// Bound wait for one backend connect attempt.
    pub connect_timeout: Duration,
    /// Heartbeat period in whole-second ticks.
    pub heartbeat_ticks: u32,
    /// Log relayed payloads at info level.
    pub print_payloads: bool,
}

impl ClientConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let real_host = settings.value("real/host", "0.0.0.0");
        let real_port: u16 = settings.number("real/port", 0);
        let virtual_host = settings.value("virtual/host", "0.0.0.0");
        let virtual_port: u16 = settings.number("virtual/port", 0);

        Self {
            server_addr: format!("{virtual_host}:{virtual_port}"),
            backend_addr: format!("{real_host}:{real_port}"),
            connect_timeout: Duration::from_millis(
                settings.number("real/connectTimeout", DEFAULT_CONNECT_TIMEOUT_MS),
            ),
            heartbeat_ticks: settings.number("virtual/heart", DEFAULT_HEARTBEAT_SECS),
            print_payloads: false,
        }
    }

    #[must_use]
    pub fn with_print_payloads(mut self, enabled: bool) -> Self {
        self.print_payloads = enabled;
        self
    }
}

fn any_addr(port: u16) -> SocketAddr {
    (Ipv4Addr::UNSPECIFIED, port).into()
}
