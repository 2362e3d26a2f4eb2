use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded uniform draws for the simulation. Every random decision in a run
/// goes through one of these, so a seed fully determines the run.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
    seed: u64,
    draws: u64,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
            draws: 0,
        }
    }

    /// Independent stream number `stream` derived from a run seed. Stream 0
    /// uses the seed as is.
    pub fn stream(seed: u64, stream: u64) -> Self {
        Self::new(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Uniform draw in `[0, 1)`.
    pub fn draw_uniform(&mut self) -> f64 {
        self.draws += 1;
        self.rng.random::<f64>()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of draws taken so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
