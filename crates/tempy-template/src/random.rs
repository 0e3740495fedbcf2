//! Deterministic random number generation for fuzzed argument values.
//!
//! Uses a seeded PRNG (Xoshiro256**) so a fuzzed run can be reproduced
//! from its seed.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Deterministic random number generator.
///
/// Given the same seed, always produces the same sequence.
///
/// # Example
///
/// ```rust
/// use tempy_template::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let a = rng.gen_range(0..100);
///
/// let mut rng2 = DeterministicRng::new(12345);
/// assert_eq!(rng2.gen_range(0..100), a);
/// ```
pub struct DeterministicRng {
    rng: Xoshiro256StarStar,
}

impl DeterministicRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        }
    }

    /// Derive a per-example seed from a run seed and a label (the example path).
    ///
    /// Independent of the order in which examples are scheduled.
    #[must_use]
    pub fn derive_seed(seed: u64, label: &str) -> u64 {
        // FNV-1a over the label, mixed with the run seed
        let hash = label
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
            });
        seed ^ hash.rotate_left(17)
    }

    /// Generate a random value in the given range.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    /// Generate a boolean with the given probability of true.
    pub fn gen_bool(&mut self, probability: f64) -> bool {
        debug_assert!(
            (0.0..=1.0).contains(&probability),
            "Probability must be in [0.0, 1.0]"
        );
        self.rng.gen_bool(probability)
    }

    /// Choose a random element from a slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut self.rng)
    }

    /// Generate `words` space-separated alphanumeric words.
    pub fn gen_words(&mut self, words: usize, letters_max: usize) -> String {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        debug_assert!(letters_max > 0);

        (0..words)
            .map(|_| {
                let len = self.gen_range(1..=letters_max);
                (0..len)
                    .map(|_| char::from(ALPHABET[self.gen_range(0..ALPHABET.len())]))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut rng1 = DeterministicRng::new(42);
        let mut rng2 = DeterministicRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.gen_range(0..u64::MAX), rng2.gen_range(0..u64::MAX));
        }
    }

    #[test]
    fn test_derive_seed_depends_on_label() {
        let a = DeterministicRng::derive_seed(7, "examples/a.c");
        let b = DeterministicRng::derive_seed(7, "examples/b.c");
        assert_ne!(a, b);
        assert_eq!(a, DeterministicRng::derive_seed(7, "examples/a.c"));
    }

    #[test]
    fn test_gen_words() {
        let mut rng = DeterministicRng::new(12345);
        let text = rng.gen_words(3, 8);
        assert_eq!(text.split(' ').count(), 3);
        assert!(text.chars().all(|c| c.is_ascii_alphanumeric() || c == ' '));
    }
}
