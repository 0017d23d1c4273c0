//! Socket runtime: per-connection tasks, acceptors, socket tuning
//!
//! Lifecycle outcomes of every connection are delivered as [`SocketEvent`]s
//! on the owning role's single event queue; all session state is mutated in
//! that one consumer task.

pub mod acceptor;
pub mod conn;
pub mod socket_tuning;

pub use acceptor::Acceptor;
pub use conn::{ConnHandle, SocketEvent};
