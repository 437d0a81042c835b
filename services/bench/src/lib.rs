//! Benchmarks for the strand client: concurrent page loads over pooled QUIC
//! connections and sequential segment fetches over HTTP.
pub mod links;
pub mod page;
pub mod report;
pub mod segments;
