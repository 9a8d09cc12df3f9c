//! Deterministic random numbers for RND and RANDOMIZE.

const DEFAULT_SEED: u64 = 0x2545_F491_4F6C_DD1D;

/// xorshift64* generator.
#[derive(Debug, Clone)]
pub(crate) struct Rng {
    state: u64,
}

impl Default for Rng {
    fn default() -> Self {
        Self {
            state: DEFAULT_SEED,
        }
    }
}

impl Rng {
    pub(crate) fn reseed(&mut self, seed: i32) {
        // A zero state would stick at zero.
        self.state = (seed as i64 as u64) ^ DEFAULT_SEED;
        if self.state == 0 {
            self.state = DEFAULT_SEED;
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `[0, 1)`.
    pub(crate) fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}
