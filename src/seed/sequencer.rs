//! SeedSequencer — the engine-level seed stream
//!
//! Seeds are issued as `start, start + 1, start + 2, ...` up to an inclusive
//! limit. The counter saturates at the limit: once the limit itself has been
//! issued every further request fails with `SeedExhausted` rather than
//! wrapping around and repeating a seed.

use crate::error::{ChainpoolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A per-task random seed, consumed exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(pub u64);

impl Seed {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic, strictly increasing seed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSequencer {
    /// Next seed to hand out; `None` once the limit has been issued
    next: Option<u64>,
    /// Largest seed this sequencer will ever issue
    limit: u64,
    /// Total seeds issued so far
    issued: u64,
}

impl SeedSequencer {
    /// Start a sequence at `start` with the full `u64` range available
    pub fn new(start: u64) -> Self {
        Self::with_limit(start, u64::MAX)
    }

    /// Start a sequence at `start` that never issues a seed above `limit`
    pub fn with_limit(start: u64, limit: u64) -> Self {
        Self {
            next: (start <= limit).then_some(start),
            limit,
            issued: 0,
        }
    }

    /// Issue the next seed
    pub fn next_seed(&mut self) -> Result<Seed> {
        let seed = self.next.ok_or(ChainpoolError::SeedExhausted {
            requested: 1,
            remaining: 0,
            limit: self.limit,
        })?;
        self.next = if seed < self.limit { Some(seed + 1) } else { None };
        self.issued += 1;
        Ok(Seed(seed))
    }

    /// Issue `n` consecutive seeds, or none at all if fewer than `n` remain
    pub fn reserve(&mut self, n: usize) -> Result<Vec<Seed>> {
        let requested = n as u64;
        let remaining = self.remaining();
        if requested > remaining {
            return Err(ChainpoolError::SeedExhausted {
                requested,
                remaining,
                limit: self.limit,
            });
        }
        (0..n).map(|_| self.next_seed()).collect()
    }

    /// How many seeds can still be issued (saturates at `u64::MAX`)
    pub fn remaining(&self) -> u64 {
        match self.next {
            Some(next) => (self.limit - next).saturating_add(1),
            None => 0,
        }
    }

    /// The seed the next call would return, without consuming it
    pub fn peek(&self) -> Option<Seed> {
        self.next.map(Seed)
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl Default for SeedSequencer {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_from_start() {
        let mut seq = SeedSequencer::new(7);
        assert_eq!(seq.next_seed().unwrap(), Seed(7));
        assert_eq!(seq.next_seed().unwrap(), Seed(8));
        assert_eq!(seq.reserve(3).unwrap(), vec![Seed(9), Seed(10), Seed(11)]);
        assert_eq!(seq.issued(), 5);
        assert_eq!(seq.peek(), Some(Seed(12)));
    }

    #[test]
    fn test_seeds_strictly_increasing() {
        let mut seq = SeedSequencer::default();
        let seeds: Vec<Seed> = (0..100).map(|_| seq.next_seed().unwrap()).collect();
        assert!(seeds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_limit_is_inclusive_and_saturates() {
        let mut seq = SeedSequencer::with_limit(3, 4);
        assert_eq!(seq.remaining(), 2);
        assert_eq!(seq.next_seed().unwrap(), Seed(3));
        assert_eq!(seq.next_seed().unwrap(), Seed(4));
        assert_eq!(seq.remaining(), 0);
        assert!(matches!(
            seq.next_seed(),
            Err(ChainpoolError::SeedExhausted { remaining: 0, limit: 4, .. })
        ));
        // still exhausted, never wraps back to 0
        assert!(seq.next_seed().is_err());
        assert_eq!(seq.peek(), None);
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut seq = SeedSequencer::with_limit(0, 4);
        assert!(seq.reserve(6).is_err());
        assert_eq!(seq.issued(), 0);
        assert_eq!(seq.reserve(5).unwrap().len(), 5);
        assert!(seq.reserve(1).is_err());
    }

    #[test]
    fn test_full_width_limit() {
        let mut seq = SeedSequencer::new(u64::MAX);
        assert_eq!(seq.remaining(), 1);
        assert_eq!(seq.next_seed().unwrap(), Seed(u64::MAX));
        assert!(seq.next_seed().is_err());
        assert_eq!(SeedSequencer::new(0).remaining(), u64::MAX);
    }

    #[test]
    fn test_start_above_limit_is_empty() {
        let mut seq = SeedSequencer::with_limit(10, 5);
        assert_eq!(seq.remaining(), 0);
        assert!(seq.reserve(0).unwrap().is_empty());
        assert!(seq.next_seed().is_err());
    }
}
