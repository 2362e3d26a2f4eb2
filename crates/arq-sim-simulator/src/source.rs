use crate::rng::RandomSource;

/// Length of the messages produced by [`AlphabetSource`].
pub const MESSAGE_LEN: usize = 20;

/// Produces the application messages fed to the sender.
pub trait MessageSource {
    /// Build message number `index` (0-based).
    fn produce(&mut self, index: u64) -> Vec<u8>;
}

impl<F> MessageSource for F
where
    F: FnMut(u64) -> Vec<u8>,
{
    fn produce(&mut self, index: u64) -> Vec<u8> {
        self(index)
    }
}

/// Message `i` is twenty copies of the `i mod 26`-th lowercase letter with a
/// trailing newline, so reordering and duplication are visible in the output.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlphabetSource;

impl MessageSource for AlphabetSource {
    fn produce(&mut self, index: u64) -> Vec<u8> {
        let letter = b'a' + (index % 26) as u8;
        let mut data = vec![letter; MESSAGE_LEN];
        data[MESSAGE_LEN - 1] = b'\n';
        data
    }
}

/// Paces application messages: gaps are uniform on `[0, 2 × interval]`.
#[derive(Debug)]
pub struct ArrivalProcess {
    interval: f64,
    budget: u64,
    produced: u64,
    rng: RandomSource,
}

impl ArrivalProcess {
    pub fn new(interval: f64, budget: u64, rng: RandomSource) -> Self {
        Self {
            interval,
            budget,
            produced: 0,
            rng,
        }
    }

    pub fn next_gap(&mut self) -> f64 {
        self.interval * 2.0 * self.rng.draw_uniform()
    }

    /// Claim the next message index, if the budget allows one.
    pub fn claim(&mut self) -> Option<u64> {
        (self.produced < self.budget).then(|| {
            self.produced += 1;
            self.produced - 1
        })
    }

    pub fn remaining(&self) -> u64 {
        self.budget - self.produced
    }
}
