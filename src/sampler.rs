use std::io::{self, BufWriter, Write};

use rand::{distributions::Uniform, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::errors::HarnessError;

/// Generates `count` pairs of distinct term ids, each drawn uniformly from `[0, upper_bound)`.
/// Pairs are independent of each other: duplicates and mirrored pairs can occur.
#[derive(Debug, Clone)]
pub struct RandomPairSampler<R> {
    rng: R,
    values: Uniform<u64>,
    remaining: usize,
}

impl RandomPairSampler<Xoshiro256PlusPlus> {
    pub fn seeded(count: usize, upper_bound: u64, seed: u64) -> Result<Self, HarnessError> {
        Self::try_new(count, upper_bound, Xoshiro256PlusPlus::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomPairSampler<R> {
    pub fn try_new(count: usize, upper_bound: u64, rng: R) -> Result<Self, HarnessError> {
        if upper_bound < 1 {
            return Err(HarnessError::InvalidArgument(format!(
                "upper bound must be greater than 0, got {}",
                upper_bound
            )));
        }
        // a single value can never form a pair of distinct terms
        if upper_bound == 1 && count > 0 {
            return Err(HarnessError::InvalidArgument(
                "upper bound 1 admits no pair of distinct values".to_string(),
            ));
        }
        Ok(Self {
            rng,
            values: Uniform::new(0, upper_bound),
            remaining: count,
        })
    }

    /// Stream all remaining pairs as `x\ty` lines, returns the number of lines written.
    pub fn write_to(self, writer: impl Write) -> io::Result<usize> {
        let mut out = BufWriter::new(writer);
        let mut lines = 0;
        for (x, y) in self {
            writeln!(out, "{}\t{}", x, y)?;
            lines += 1;
        }
        out.flush()?;
        Ok(lines)
    }
}

impl<R: Rng> Iterator for RandomPairSampler<R> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        loop {
            let x = self.rng.sample(self.values);
            let y = self.rng.sample(self.values);
            if x != y {
                return Some((x, y));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Rng> ExactSizeIterator for RandomPairSampler<R> {}
