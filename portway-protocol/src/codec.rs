//! Incremental codec for the tunnel framing
//!
//! Grammar (`#` terminates every header; `:` and `;` separate fields):
//!
//! ```text
//! c:<id>#                         session <id> connected
//! d:<id>#                         session <id> disconnected
//! m:<id>;<len>#<len raw bytes>    relay <len> bytes for session <id>
//! a#                              heartbeat
//! ```
//!
//! The decoder is fed arbitrary byte chunks and emits events strictly in
//! arrival order. A frame may span many reads and one read may carry many
//! frames. Malformed headers (unknown tag, wrong field count, non-numeric
//! id or length, invalid UTF-8) are dropped without desyncing the stream.
//!
//! The declared `m` length is trusted with no upper bound: the tunnel peer
//! is the only sender, and an under-delivering peer simply stalls parsing
//! on its own connection.

use crate::event::{Event, SessionId};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Header terminator byte.
const TERMINATOR: u8 = b'#';

/// Stream parser for the tunnel connection.
///
/// Holds at most one in-flight payload; the protocol never interleaves two
/// payloads on one connection.
#[derive(Debug, Default)]
pub struct WireCodec {
    pending: Option<Pending>,
}

#[derive(Debug)]
struct Pending {
    id: SessionId,
    remaining: usize,
    buf: BytesMut,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parsed frame header, before any payload bytes.
enum Header {
    Connect(SessionId),
    Disconnect(SessionId),
    Payload { id: SessionId, len: usize },
    Alive,
}

/// Parse one header (the bytes between the previous frame and `#`).
///
/// Returns `None` for anything malformed; the caller drops the header and
/// keeps scanning.
fn parse_header(raw: &[u8]) -> Option<Header> {
    let text = std::str::from_utf8(raw).ok()?;
    let fields: Vec<&str> = text.split(':').collect();
    match fields.as_slice() {
        ["a"] => Some(Header::Alive),
        ["c", id] => id.parse().ok().map(Header::Connect),
        ["d", id] => id.parse().ok().map(Header::Disconnect),
        ["m", args] => {
            // m carries exactly two ;-separated arguments: sender id and
            // byte count. A third field leaves the length unparsable and
            // the frame is dropped.
            let (id, len) = args.split_once(';')?;
            Some(Header::Payload {
                id: id.parse().ok()?,
                len: len.parse().ok()?,
            })
        }
        _ => None,
    }
}

impl Decoder for WireCodec {
    type Item = Event;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Mid-payload: consume up to `remaining` bytes before any
            // header parsing resumes.
            if let Some(mut pending) = self.pending.take() {
                let take = pending.remaining.min(src.len());
                pending.buf.extend_from_slice(&src.split_to(take));
                pending.remaining -= take;
                if pending.remaining > 0 {
                    self.pending = Some(pending);
                    return Ok(None);
                }
                return Ok(Some(Event::Message {
                    id: pending.id,
                    data: pending.buf.freeze(),
                }));
            }

            // Header stream: wait for the terminator. Partial headers stay
            // in `src` and accumulate across reads.
            let Some(pos) = src.iter().position(|&b| b == TERMINATOR) else {
                return Ok(None);
            };
            let header = src.split_to(pos);
            src.advance(1);

            match parse_header(&header) {
                Some(Header::Connect(id)) => return Ok(Some(Event::Connect(id))),
                Some(Header::Disconnect(id)) => return Ok(Some(Event::Disconnect(id))),
                Some(Header::Alive) => return Ok(Some(Event::Alive)),
                Some(Header::Payload { id, len }) => {
                    // A zero-length m frame never enters payload mode and
                    // emits nothing.
                    if len > 0 {
                        self.pending = Some(Pending {
                            id,
                            remaining: len,
                            buf: BytesMut::new(),
                        });
                    }
                }
                // Malformed header: dropped, keep scanning.
                None => {}
            }
        }
    }

    /// A connection may die mid-frame; whatever is left in the buffer is
    /// not an error, just an unfinished frame.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let event = self.decode(src)?;
        if event.is_none() {
            src.clear();
        }
        Ok(event)
    }
}

impl Encoder<Event> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, event: Event, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match event {
            Event::Connect(id) => dst.put_slice(format!("c:{id}#").as_bytes()),
            Event::Disconnect(id) => dst.put_slice(format!("d:{id}#").as_bytes()),
            Event::Message { id, data } => {
                dst.reserve(data.len() + 24);
                dst.put_slice(format!("m:{id};{}#", data.len()).as_bytes());
                dst.put_slice(&data);
            }
            Event::Alive => dst.put_slice(b"a#"),
        }
        Ok(())
    }
}

/// Encode a single event to its exact wire bytes.
pub fn encode_event(event: Event) -> Bytes {
    let mut buf = BytesMut::new();
    #[allow(clippy::unwrap_used)]
    WireCodec::new().encode(event, &mut buf).unwrap();
    buf.freeze()
}
