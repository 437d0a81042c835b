//! Request/response correlation over one multiplexed connection.
//!
//! # Purpose
//! Many independent requests share a single QUIC connection. Each request
//! gets its own stream id, inbound events are routed back to the request
//! that owns the stream, and a per-stream state machine assembles the
//! response while the orchestrator enforces timeouts and retries.
//!
//! # Layout
//! - `stream`: id allocation, the routing table (demultiplexer) and the
//!   response assembler.
//! - `transport`: the `StreamTransport` seam and `MuxConnection`, which owns
//!   the routing state and the dispatcher task of one connection.
//! - `client`: the orchestrator (`request`), `fan_out`, the QUIC stream
//!   adapter and the pooled `Client`.
//! - `summary`: batch statistics for reports.
//!
//! # Design notes
//! Events for one connection are routed by a single dispatcher task, so
//! per-stream arrival order is preserved. Consumers receive on unbounded
//! per-stream channels so routing never waits on a slow request.
#[macro_use]
mod macros;

pub mod client;
pub mod config;
pub mod counters;
pub mod error;
pub mod request;
pub mod stream;
pub mod summary;
pub mod transport;
mod wire;

pub use client::{Client, QuicStreamTransport, RequestPolicy, fan_out, request};
pub use config::{ClientConfig, DEFAULT_USER_AGENT};
pub use counters::{StreamCounters, StreamCountersSnapshot};
pub use error::{ErrorKind, RequestError};
pub use request::{OutboundRequest, RequestOutcome, Response, Timing, throughput};
pub use stream::{InboundEvent, StreamId};
pub use summary::{Summary, summarize};
pub use transport::{EventFeed, MuxConnection, StreamTransport, event_feed};
