// Request orchestration, fan-out, and the pooled QUIC client.
#![allow(clippy::module_inception)]
pub mod client;
pub mod fanout;
pub mod orchestrator;
pub mod quic;

pub use client::Client;
pub use fanout::fan_out;
pub use orchestrator::{RequestPolicy, request};
pub use quic::QuicStreamTransport;
