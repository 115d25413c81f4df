//! Integration tests for Anyflix
//!
//! Drive the session manager end to end on the simulated swarm engine:
//! byte identity of streamed chunks, session dedup and teardown, request
//! cancellation and the HTTP surface.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/cancellation.rs"]
mod cancellation;
#[path = "integration/http_streaming.rs"]
mod http_streaming;
#[path = "integration/session_lifecycle.rs"]
mod session_lifecycle;
#[path = "integration/streaming_properties.rs"]
mod streaming_properties;
