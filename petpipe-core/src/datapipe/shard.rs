//! Sharding and shuffling stages
//!
//! Deterministic worker sharding and a seeded, buffered shuffle.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PetError, Result};

/// Which slice of a stream this worker owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    /// This worker's index
    pub worker_id: u32,
    /// Total number of workers
    pub num_workers: u32,
}

impl ShardSpec {
    /// Create a new shard specification
    pub fn new(worker_id: u32, num_workers: u32) -> Result<Self> {
        let spec = Self {
            worker_id,
            num_workers,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PetError::InvalidShardSpec {
                reason: "num_workers must be at least 1".into(),
            });
        }
        if self.worker_id >= self.num_workers {
            return Err(PetError::InvalidShardSpec {
                reason: format!(
                    "worker_id {} out of range for {} workers",
                    self.worker_id, self.num_workers
                ),
            });
        }
        Ok(())
    }

    /// Check if the item at `ordinal` belongs to this worker
    pub fn owns(&self, ordinal: u64) -> bool {
        ordinal % self.num_workers as u64 == self.worker_id as u64
    }
}

/// Keeps every `num_workers`-th item, starting at `worker_id`
///
/// Errors pass through and do not count as items.
pub struct ShardingFilter<I> {
    source: I,
    spec: ShardSpec,
    ordinal: u64,
}

impl<I> ShardingFilter<I> {
    pub fn new(source: I, spec: ShardSpec) -> Self {
        debug!(
            "Sharding stream for worker {}/{}",
            spec.worker_id, spec.num_workers
        );
        Self {
            source,
            spec,
            ordinal: 0,
        }
    }
}

impl<T, I> Iterator for ShardingFilter<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.source.next()?;
            if item.is_err() {
                return Some(item);
            }
            let ordinal = self.ordinal;
            self.ordinal += 1;
            if self.spec.owns(ordinal) {
                return Some(item);
            }
        }
    }
}

/// Simple deterministic generator (64-bit LCG)
#[derive(Debug, Clone)]
struct Lcg(u64);

impl Lcg {
    fn next_index(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        // High bits have the longest period
        ((self.0 >> 33) as usize) % bound
    }
}

/// Buffered shuffle with a fixed seed
///
/// Fills a buffer of `capacity` items, then emits a random buffered item for
/// every item pulled from the source. Same seed and input give the same order.
pub struct ShuffleBuffer<I, T> {
    source: I,
    buffer: Vec<T>,
    capacity: usize,
    rng: Lcg,
    source_done: bool,
}

impl<I, T> ShuffleBuffer<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    pub fn new(source: I, capacity: usize, seed: u64) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            rng: Lcg(seed),
            source_done: false,
        }
    }
}

impl<I, T> Iterator for ShuffleBuffer<I, T>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.source_done && self.buffer.len() < self.capacity {
            match self.source.next() {
                Some(Ok(item)) => self.buffer.push(item),
                Some(Err(e)) => return Some(Err(e)),
                None => self.source_done = true,
            }
        }

        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.next_index(self.buffer.len());
        Some(Ok(self.buffer.swap_remove(idx)))
    }
}
