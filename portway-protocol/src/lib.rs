//! Portway wire protocol
//!
//! Defines the textual framing used on the tunnel connection between the
//! Portway server and client, and the codec that parses it incrementally.

pub mod codec;
pub mod event;

pub use codec::WireCodec;
pub use event::{Event, SessionId};
