use std::sync::atomic::{AtomicU64, Ordering};

use rand::{rngs::OsRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::error::{CkksError, Result};
use crate::util::basic::HE_PRNG_SEED_BYTES;

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct PRNGSeed(pub [u8; HE_PRNG_SEED_BYTES]);

impl Default for PRNGSeed {
    fn default() -> Self {
        PRNGSeed([0; HE_PRNG_SEED_BYTES])
    }
}

impl std::fmt::Debug for PRNGSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PRNGSeed(..)")
    }
}

impl AsMut<[u8]> for PRNGSeed {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl AsRef<[u8]> for PRNGSeed {
    fn as_ref(&self) -> &[u8] {&self.0}
}

enum SeedSource {
    Os,
    Fixed { seed: PRNGSeed, streams: AtomicU64 },
}

/**
Entropy provider owned by a key generator or encryptor.

With OS entropy every stream gets a fresh seed. With a fixed seed the n-th
stream is derived from the seed and n, so a factory built from the same seed
replays the same sequence of streams and no two streams of one factory repeat.
*/
pub struct BlakeRNGFactory {
    source: SeedSource,
}

impl Default for BlakeRNGFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BlakeRNGFactory {

    pub fn new() -> Self {
        Self { source: SeedSource::Os }
    }

    pub fn from_seed(seed: PRNGSeed) -> Self {
        Self { source: SeedSource::Fixed { seed, streams: AtomicU64::new(0) } }
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self.source, SeedSource::Fixed { .. })
    }

    pub fn get_rng(&self) -> Result<BlakeRNG> {
        let mut seed = PRNGSeed::default();
        match &self.source {
            SeedSource::Os => {
                let mut chacha = ChaCha20Rng::from_rng(OsRng)
                    .map_err(|e| CkksError::InsufficientEntropy(e.to_string()))?;
                chacha.try_fill_bytes(seed.as_mut())
                    .map_err(|e| CkksError::InsufficientEntropy(e.to_string()))?;
            }
            SeedSource::Fixed { seed: base, streams } => {
                let stream = streams.fetch_add(1, Ordering::Relaxed);
                let mut hasher = blake3::Hasher::new();
                hasher.update(base.as_ref());
                hasher.update(&stream.to_le_bytes());
                hasher.finalize_xof().fill(seed.as_mut());
            }
        }
        Ok(BlakeRNG::from_seed(seed))
    }

}

const BUFFER_SIZE: usize = 4096;

/// Counter-mode generator over the blake3 extendable output function.
pub struct BlakeRNG {
    buffer: [u8; BUFFER_SIZE],
    seed: PRNGSeed,
    counter: u64,
    buffer_current: usize,
}

impl SeedableRng for BlakeRNG {
    type Seed = PRNGSeed;

    fn from_seed(seed: Self::Seed) -> Self {
        Self {
            seed,
            counter: 0,
            buffer: [0; BUFFER_SIZE],
            buffer_current: BUFFER_SIZE,
        }
    }
}

impl BlakeRNG {

    fn refill_buffer(&mut self) {
        let mut hash = blake3::Hasher::new();
        hash.update(self.seed.as_ref());
        hash.update(&self.counter.to_le_bytes());
        hash.finalize_xof().fill(&mut self.buffer);
        self.buffer_current = 0;
        self.counter = self.counter.wrapping_add(1);
    }

    fn take<const K: usize>(&mut self) -> [u8; K] {
        if self.buffer_current + K > BUFFER_SIZE {
            self.refill_buffer();
        }
        let mut out = [0u8; K];
        out.copy_from_slice(&self.buffer[self.buffer_current..self.buffer_current + K]);
        self.buffer_current += K;
        out
    }

}

impl RngCore for BlakeRNG {

    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take::<4>())
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take::<8>())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut i = 0;
        while i < dest.len() {
            if self.buffer_current >= BUFFER_SIZE {
                self.refill_buffer();
            }
            let len = std::cmp::min(dest.len() - i, BUFFER_SIZE - self.buffer_current);
            dest[i..i + len].copy_from_slice(&self.buffer[self.buffer_current..self.buffer_current + len]);
            i += len;
            self.buffer_current += len;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake_rng() {
        let mut rng = BlakeRNG::from_seed(PRNGSeed([1; 64]));
        let mut rng2 = BlakeRNG::from_seed(PRNGSeed([1; 64]));
        for _ in 0..1000 {
            assert_eq!(rng.next_u32(), rng2.next_u32());
            assert_eq!(rng.next_u64(), rng2.next_u64());
        }
        let mut a = [0u8; 5000];
        let mut b = [0u8; 5000];
        rng.fill_bytes(&mut a);
        rng2.fill_bytes(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_seeded_factory_replays_streams() {
        let factory = BlakeRNGFactory::from_seed(PRNGSeed([1; 64]));
        let replay = BlakeRNGFactory::from_seed(PRNGSeed([1; 64]));
        assert!(factory.is_deterministic());
        let mut first = factory.get_rng().unwrap();
        let mut second = factory.get_rng().unwrap();
        let mut first_again = replay.get_rng().unwrap();
        let mut second_again = replay.get_rng().unwrap();
        let mut differ = false;
        for _ in 0..100 {
            let (x, y) = (first.next_u64(), second.next_u64());
            differ |= x != y;
            assert_eq!(x, first_again.next_u64());
            assert_eq!(y, second_again.next_u64());
        }
        assert!(differ);
    }

    #[test]
    fn test_os_factory() {
        let factory = BlakeRNGFactory::new();
        assert!(!factory.is_deterministic());
        let mut rng = factory.get_rng().unwrap();
        let mut rng2 = factory.get_rng().unwrap();
        let a: Vec<u64> = (0..8).map(|_| rng.next_u64()).collect();
        let b: Vec<u64> = (0..8).map(|_| rng2.next_u64()).collect();
        assert_ne!(a, b);
    }

}
