//! Minimal subset samplers
use itertools::Itertools;
use log::trace;
use rand::{rngs::SmallRng, seq::index};

/// Draws minimal subsets of sample indices
pub(crate) enum Sampler {
    /// Uniform draws over the complete population
    Uniform { num_samples: usize },
    /// Quality ordered draws
    Prosac(ProsacSampler),
}

impl Sampler {
    /// Uniform [Sampler]
    pub fn uniform(num_samples: usize) -> Self {
        Self::Uniform { num_samples }
    }

    /// PROSAC [Sampler], `quality` holding one score per sample (higher is better).
    /// The pool reaches the whole population after `horizon` draws.
    pub fn prosac(quality: &[f64], subset_size: usize, horizon: usize) -> Self {
        Self::Prosac(ProsacSampler::new(quality, subset_size, horizon))
    }

    /// Draws a new subset of distinct indices into `subset`,
    /// which length defines the subset size.
    pub fn draw(&mut self, rng: &mut SmallRng, subset: &mut [usize]) {
        match self {
            Self::Uniform { num_samples } => {
                let drawn = index::sample(rng, *num_samples, subset.len());
                for (slot, index) in subset.iter_mut().zip(drawn.iter()) {
                    *slot = index;
                }
            },
            Self::Prosac(sampler) => sampler.draw(rng, subset),
        }
    }
}

/// Progressive sampler: subsets are drawn from a pool made of the best
/// ranked samples, which progressively grows to the whole population
/// (Chum & Matas, "Matching with PROSAC", 2005).
pub(crate) struct ProsacSampler {
    /// Sample indices, sorted by decreasing quality
    sorted: Vec<usize>,
    /// Subset size (m)
    subset_size: usize,
    /// Current pool size (n)
    pool: usize,
    /// Number of draws so far (t)
    draws: usize,
    /// T_n
    t_n: f64,
    /// T'_n
    t_n_prime: usize,
}

impl ProsacSampler {
    /// Builds new [ProsacSampler]. `horizon` is T_N: the number of draws
    /// after which the whole population is being sampled.
    pub fn new(quality: &[f64], subset_size: usize, horizon: usize) -> Self {
        let total = quality.len();

        let sorted = (0..total)
            .sorted_by(|a, b| quality[*b].total_cmp(&quality[*a]))
            .collect::<Vec<_>>();

        // T_m: average number of draws from the top m samples
        let mut t_n = horizon as f64;
        for i in 0..subset_size {
            t_n *= (subset_size - i) as f64 / (total - i) as f64;
        }

        Self {
            sorted,
            subset_size,
            pool: subset_size,
            draws: 0,
            t_n,
            t_n_prime: 1,
        }
    }

    /// Current pool size
    #[cfg(test)]
    pub fn pool_size(&self) -> usize {
        self.pool
    }

    pub fn draw(&mut self, rng: &mut SmallRng, subset: &mut [usize]) {
        let total = self.sorted.len();
        let m = self.subset_size;

        self.draws += 1;

        // growth function
        if self.draws > self.t_n_prime && self.pool < total {
            let t_n_next = self.t_n * (self.pool + 1) as f64 / (self.pool + 1 - m) as f64;
            self.t_n_prime += (t_n_next - self.t_n).ceil() as usize;
            self.t_n = t_n_next;
            self.pool += 1;
            trace!("prosac: pool grew to {} samples", self.pool);
        }

        if self.t_n_prime < self.draws {
            // pool exhausted: uniform draws from the pool
            let drawn = index::sample(rng, self.pool, m);
            for (slot, index) in subset.iter_mut().zip(drawn.iter()) {
                *slot = self.sorted[index];
            }
        } else {
            // latest pool sample, completed by m-1 samples from the rest of the pool
            let drawn = index::sample(rng, self.pool - 1, m - 1);
            for (slot, index) in subset.iter_mut().zip(drawn.iter()) {
                *slot = self.sorted[index];
            }
            subset[m - 1] = self.sorted[self.pool - 1];
        }
    }
}
