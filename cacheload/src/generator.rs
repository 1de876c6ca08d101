//! The traffic generator deciding which request to send next.

use rand::Rng;
use rand::distr::{Bernoulli, Distribution};
use thiserror::Error;

use crate::pool::Pools;
use crate::transport::{Outcome, RequestName, Transport};

/// Errors raised when creating a [`TrafficGenerator`].
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The write ratio is not a probability.
    #[error("write ratio must be within [0, 1], got {0}")]
    InvalidWriteRatio(f64),
}

/// A single request against the cache, borrowing its key and value from the pools.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheRequest<'a> {
    /// Store `value` under `key`.
    Put {
        /// The key to write.
        key: &'a str,
        /// The value to write.
        value: &'a str,
    },
    /// Look up `key`.
    Get {
        /// The key to read.
        key: &'a str,
    },
}

impl<'a> CacheRequest<'a> {
    /// The name statistics for this request are recorded under.
    pub fn name(&self) -> RequestName {
        match self {
            CacheRequest::Put { .. } => RequestName::Put,
            CacheRequest::Get { .. } => RequestName::Get,
        }
    }

    /// The key this request addresses.
    pub fn key(&self) -> &'a str {
        match *self {
            CacheRequest::Put { key, .. } | CacheRequest::Get { key } => key,
        }
    }
}

/// Produces a random mix of reads and writes over fixed key and value pools.
///
/// The generator holds no mutable state. Share it between virtual users with an `Arc`, every user
/// brings its own RNG.
#[derive(Debug)]
pub struct TrafficGenerator {
    pools: Pools,
    write_ratio: f64,
    write_mix: Bernoulli,
}

impl TrafficGenerator {
    /// Creates a generator issuing writes with probability `write_ratio`.
    pub fn new(pools: Pools, write_ratio: f64) -> Result<Self, GeneratorError> {
        let write_mix =
            Bernoulli::new(write_ratio).map_err(|_| GeneratorError::InvalidWriteRatio(write_ratio))?;

        Ok(Self {
            pools,
            write_ratio,
            write_mix,
        })
    }

    /// The pools requests are drawn from.
    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// The probability of a request being a write.
    pub fn write_ratio(&self) -> f64 {
        self.write_ratio
    }

    /// Draws the next request without sending it.
    ///
    /// Every call is independent: a fresh coin flip decides between write and read, and key and
    /// value of a write are drawn separately.
    pub fn next_request<R: Rng + ?Sized>(&self, rng: &mut R) -> CacheRequest<'_> {
        if self.write_mix.sample(rng) {
            CacheRequest::Put {
                key: self.pools.keys().choose(rng),
                value: self.pools.values().choose(rng),
            }
        } else {
            CacheRequest::Get {
                key: self.pools.keys().choose(rng),
            }
        }
    }

    /// Draws the next request and sends it through `transport`.
    ///
    /// This is one unit of work: exactly one request goes out. The outcome is passed through
    /// untouched for the caller to record.
    pub async fn generate_request<R, T>(&self, rng: &mut R, transport: &T) -> Outcome
    where
        R: Rng + ?Sized,
        T: Transport + ?Sized,
    {
        let request = self.next_request(rng);
        transport.send(request).await
    }
}
