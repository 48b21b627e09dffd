use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

use super::observation::{RandomId, RANDOM_ID_BYTES};

/// Source of every random value the pipeline uses. Swappable so tests can
/// make noise generation deterministic.
pub trait RandomSource {
    /// Uniform sample in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    fn fill_bytes(&mut self, dest: &mut [u8]);

    fn random_id(&mut self) -> RandomId {
        let mut id = [0u8; RANDOM_ID_BYTES];
        self.fill_bytes(&mut id);
        id
    }
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn next_f64(&mut self) -> f64 {
        (**self).next_f64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        (**self).fill_bytes(dest)
    }
}

/// `StdRng` seeded from OS entropy.
#[derive(Debug)]
pub struct SecureRandomSource {
    rng: StdRng,
}

impl SecureRandomSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible source, for simulations.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SecureRandomSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SecureRandomSource {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }
}

/// Largest Poisson mean a report may configure for fabrication.
pub const MAX_POISSON_MEAN: f64 = 10_000.0;

/// Knuth's method loses accuracy once e^-mean nears the smallest f64, so
/// larger means are drawn as a sum of draws with at most this mean.
const POISSON_CHUNK_MEAN: f64 = 500.0;

/// Draws from Poisson(`mean`) by multiplying uniforms until the product
/// drops below e^-mean (Knuth). Expected cost is linear in `mean`.
pub fn sample_poisson<R: RandomSource + ?Sized>(source: &mut R, mean: f64) -> u64 {
    if mean <= 0.0 || !mean.is_finite() {
        return 0;
    }
    let mut remaining = mean;
    let mut total = 0;
    while remaining > 0.0 {
        let chunk = remaining.min(POISSON_CHUNK_MEAN);
        total += sample_poisson_knuth(source, chunk);
        remaining -= chunk;
    }
    total
}

fn sample_poisson_knuth<R: RandomSource + ?Sized>(source: &mut R, mean: f64) -> u64 {
    let limit = (-mean).exp();
    let mut product = 1.0;
    let mut count = 0;
    loop {
        product *= source.next_f64();
        if product <= limit {
            return count;
        }
        count += 1;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_poisson_mean_and_variance() {
        let mut source = SecureRandomSource::seeded(42);
        let mean = 2.5;
        let n = 200_000;
        let draws: Vec<f64> = (0..n)
            .map(|_| sample_poisson(&mut source, mean) as f64)
            .collect();
        let sample_mean = draws.iter().sum::<f64>() / n as f64;
        let sample_var = draws
            .iter()
            .map(|d| (d - sample_mean).powi(2))
            .sum::<f64>()
            / n as f64;
        assert_relative_eq!(sample_mean, mean, epsilon = 0.05);
        assert_relative_eq!(sample_var, mean, epsilon = 0.1);
    }

    #[test]
    fn test_poisson_small_mean_is_mostly_zero() {
        let mut source = SecureRandomSource::seeded(7);
        let n = 100_000;
        let zeros = (0..n)
            .filter(|_| sample_poisson(&mut source, 0.01) == 0)
            .count();
        assert_relative_eq!(
            zeros as f64 / n as f64,
            (-0.01f64).exp(),
            epsilon = 0.005
        );
    }

    #[test]
    fn test_poisson_large_mean() {
        let mut source = SecureRandomSource::seeded(42);
        let mean = 1_000.0;
        let n = 2_000;
        let total: u64 = (0..n).map(|_| sample_poisson(&mut source, mean)).sum();
        // Standard error of the sample mean is about 0.7.
        assert_relative_eq!(total as f64 / n as f64, mean, epsilon = 5.0);
    }

    #[test]
    fn test_poisson_degenerate_means() {
        let mut source = SecureRandomSource::seeded(1);
        assert_eq!(sample_poisson(&mut source, 0.0), 0);
        assert_eq!(sample_poisson(&mut source, -1.0), 0);
        assert_eq!(sample_poisson(&mut source, f64::NAN), 0);
        assert_eq!(sample_poisson(&mut source, f64::INFINITY), 0);
    }

    #[test]
    fn test_random_ids_differ() {
        let mut source = SecureRandomSource::seeded(3);
        assert_ne!(source.random_id(), source.random_id());
    }
}
