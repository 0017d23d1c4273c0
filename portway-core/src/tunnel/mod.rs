pub mod client;
pub mod heartbeat;
pub mod server;
pub mod session;
