//! A load generator for HTTP key-value caches.
//!
//! Before the run, a fixed pool of unique keys and a pool of random printable values are
//! generated. Many concurrent virtual users then send requests back to back, each one a fresh
//! weighted coin flip between a write (`POST /put` with a random key and a random value) and a
//! read (`GET /get` with a random key). Keeping the key cardinality bounded makes cache hits
//! likely, so the test measures the cache under a realistic mix of hits and writes.
//!
//! The crate is split into the [`TrafficGenerator`], which only decides *what* to send, and the
//! [`LoadTest`] harness, which decides *when*: it paces virtual users, stops the run and collects
//! latency and throughput per request type. Requests go out through a [`Transport`], with
//! [`HttpTransport`] being the one talking to a real server.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod generator;
pub mod http;
pub mod observability;
pub mod pool;
pub mod runner;
pub mod stats;
pub mod transport;

pub use crate::generator::TrafficGenerator;
pub use crate::http::HttpTransport;
pub use crate::runner::LoadTest;
pub use crate::transport::Transport;
