//! Timing and sizing defaults shared by the server and client.
//!
//! Use these constants instead of magic numbers so defaults stay consistent
//! across the core crates, CLI, and tests.

use std::time::Duration;

/// Default configuration file, looked up relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "portway.toml";

/// Delay before retrying a failed connect to the tunnel server.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Default bound wait for one backend connect attempt, in milliseconds
/// (`real/connectTimeout`).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// Default heartbeat period in seconds (`virtual/heart`).
pub const DEFAULT_HEARTBEAT_SECS: u32 = 10;

/// Scheduler tick driving the client's heartbeat countdown.
pub const HEARTBEAT_TICK: Duration = Duration::from_secs(1);

/// Depth of each role's shared event queue.
pub const EVENT_QUEUE_DEPTH: usize = 1024;
