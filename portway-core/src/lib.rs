pub mod net;
pub mod tunnel;

// Re-export specific items for convenience
pub use tunnel::client::TunnelClient;
pub use tunnel::server::ProxyServer;
