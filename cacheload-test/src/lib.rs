//! Test utilities for cacheload.
//!
//! This crate provides an in-process cache server to run load tests against, and a tracing setup
//! for tests. See the modules for all available utilities.

pub mod server;
pub mod tracing;
