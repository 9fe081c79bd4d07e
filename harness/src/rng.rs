//! Run seed
//!
//! All harness randomness flows from one 64-bit seed. Each consumer gets its
//! own `StdRng` stream forked from it, so injectors never contend on a shared
//! generator and a run's decisions can be replayed from the logged seed.
//!
//! ```bash
//! STEEL_RAIN_SEED=0xa3f5c8e1b2d94706 steel-rain --network-size 3
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Environment variable consulted when no seed is configured.
pub const SEED_ENV: &str = "STEEL_RAIN_SEED";

/// Named RNG streams. Fixing the stream ids keeps replays stable when the set
/// of enabled injectors changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    Bootstrap = 1,
    RouterBouncer = 2,
    ListenerBouncer = 3,
    ConnectorBouncer = 4,
    ManagementProber = 5,
}

/// Parse a seed as `0x`-prefixed or bare hexadecimal.
pub fn parse_seed(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(hex, 16).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSource {
    seed: u64,
}

impl SeedSource {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Use the configured seed, else `STEEL_RAIN_SEED`, else a fresh random one.
    pub fn from_config_or_env(configured: Option<u64>) -> Self {
        let seed = configured
            .or_else(|| std::env::var(SEED_ENV).ok().and_then(|s| parse_seed(&s)))
            .unwrap_or_else(|| rand::thread_rng().gen());
        Self::with_seed(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Independent generator for `stream`.
    pub fn fork(&self, stream: Stream) -> StdRng {
        // splitmix64 finalizer spreads nearby stream ids across the seed space
        let mut z = self
            .seed
            .wrapping_add((stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        StdRng::seed_from_u64(z ^ (z >> 31))
    }
}
