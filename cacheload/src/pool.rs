//! Fixed pools of keys and values that requests are built from.
//!
//! Both pools are generated once before the load test starts and never change afterwards. All
//! randomness during the run is in *selecting* from the pools, which bounds the key cardinality
//! and makes cache hits likely.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::IndexedRandom;
use thiserror::Error;

/// The characters values are drawn from.
///
/// Digits, ASCII letters, punctuation and whitespace: 100 characters in total, all of them single
/// bytes.
pub const PRINTABLE: &[u8] = b"0123456789\
    abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\
    !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ \t\n\r\x0b\x0c";

/// Errors raised while generating pools.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A pool needs at least one entry to select from.
    #[error("pool size must be at least 1")]
    Empty,
}

/// The unique keys requests are addressed to.
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
}

impl KeyPool {
    /// Generates `size` distinct random UUIDv4 keys.
    pub fn generate<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::Empty);
        }

        let mut seen = HashSet::with_capacity(size);
        let mut keys = Vec::with_capacity(size);
        while keys.len() < size {
            let uuid = uuid::Builder::from_random_bytes(rng.random()).into_uuid();
            if seen.insert(uuid) {
                keys.push(uuid.hyphenated().to_string());
            }
        }

        Ok(Self { keys })
    }

    /// Picks a key uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        // never empty, see `generate`
        self.keys.choose(rng).map(String::as_str).unwrap_or_default()
    }

    /// Returns `true` if `key` is part of this pool.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// The number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always `false`, pools are never empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates the keys in generation order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

/// The values written to the cache.
///
/// Values are not tied to keys: every write picks a key and a value independently.
#[derive(Debug)]
pub struct ValuePool {
    values: Vec<String>,
    value_length: usize,
}

impl ValuePool {
    /// Generates `size` random values of exactly `value_length` printable characters each.
    ///
    /// Unlike keys, values are allowed to repeat.
    pub fn generate<R: Rng + ?Sized>(
        size: usize,
        value_length: usize,
        rng: &mut R,
    ) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::Empty);
        }

        let values = (0..size)
            .map(|_| {
                (0..value_length)
                    .map(|_| char::from(PRINTABLE[rng.random_range(0..PRINTABLE.len())]))
                    .collect()
            })
            .collect();

        Ok(Self {
            values,
            value_length,
        })
    }

    /// Picks a value uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.values.choose(rng).map(String::as_str).unwrap_or_default()
    }

    /// Returns `true` if `value` is part of this pool.
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// The length in characters of every value.
    pub fn value_length(&self) -> usize {
        self.value_length
    }

    /// The number of values in the pool.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always `false`, pools are never empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates the values in generation order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

/// A key pool and a value pool of the same size.
#[derive(Debug)]
pub struct Pools {
    keys: KeyPool,
    values: ValuePool,
}

impl Pools {
    /// Generates both pools with `size` entries each.
    pub fn generate<R: Rng + ?Sized>(
        size: usize,
        value_length: usize,
        rng: &mut R,
    ) -> Result<Self, PoolError> {
        let keys = KeyPool::generate(size, rng)?;
        let values = ValuePool::generate(size, value_length, rng)?;
        tracing::debug!(size, value_length, "generated key and value pools");

        Ok(Self { keys, values })
    }

    /// Keys to read and write.
    pub fn keys(&self) -> &KeyPool {
        &self.keys
    }

    /// Values to write.
    pub fn values(&self) -> &ValuePool {
        &self.values
    }

    /// The number of entries in each pool.
    pub fn size(&self) -> usize {
        self.keys.len()
    }
}
