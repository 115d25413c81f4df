//! HTTP-style range streaming over session storage.
//!
//! Every request is served as exactly one bounded chunk starting at the
//! requested offset. Players keep issuing range requests with advancing
//! offsets, so the server never streams the remainder of a file.

mod range;
mod streamer;

pub use range::{ByteRangeRequest, ChunkWindow};
pub use streamer::{ChunkBody, ChunkStream, RangeStreamer};
