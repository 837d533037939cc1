//! Decorative phrase/icon rotation.
//!
//! Each render cycle draws one phrase and one icon, independently, from two
//! fixed candidate sets. Selection goes through the [`Selector`] capability so
//! the random production picker can be swapped for a fixed sequence in tests.

use crate::config::DecorationsConfig;
use crate::DecorativeSelection;
use rand::{rngs::StdRng, seq::IndexedRandom, SeedableRng};

/// Picks the next value from a closed candidate set.
pub trait Selector<T>: Send {
    fn next(&mut self) -> T;
}

/// Uniform random choice with replacement.
pub struct RandomSelector<T> {
    candidates: Vec<T>,
    rng: StdRng,
}

impl<T> RandomSelector<T> {
    pub fn new(candidates: Vec<T>) -> Self {
        Self {
            candidates,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible selector for a given seed.
    pub fn seeded(candidates: Vec<T>, seed: u64) -> Self {
        Self {
            candidates,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<T: Clone + Default + Send> Selector<T> for RandomSelector<T> {
    /// An empty candidate set yields `T::default()`.
    fn next(&mut self) -> T {
        self.candidates
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default()
    }
}

/// Walks the candidates in order, wrapping around at the end.
pub struct SequenceSelector<T> {
    candidates: Vec<T>,
    position: usize,
}

impl<T> SequenceSelector<T> {
    pub fn new(candidates: Vec<T>) -> Self {
        Self {
            candidates,
            position: 0,
        }
    }
}

impl<T: Clone + Default + Send> Selector<T> for SequenceSelector<T> {
    fn next(&mut self) -> T {
        if self.candidates.is_empty() {
            return T::default();
        }
        let value = self.candidates[self.position % self.candidates.len()].clone();
        self.position = (self.position + 1) % self.candidates.len();
        value
    }
}

/// The phrase and icon selectors used by the render loop.
pub struct Decorations {
    phrases: Box<dyn Selector<String>>,
    icons: Box<dyn Selector<String>>,
}

impl Decorations {
    pub fn new(phrases: Box<dyn Selector<String>>, icons: Box<dyn Selector<String>>) -> Self {
        Self { phrases, icons }
    }

    /// Random selectors over the configured candidate sets.
    pub fn random(config: &DecorationsConfig) -> Self {
        Self::new(
            Box::new(RandomSelector::new(config.phrases.clone())),
            Box::new(RandomSelector::new(config.icons.clone())),
        )
    }

    /// Draw a fresh phrase/icon pair.
    pub fn roll(&mut self) -> DecorativeSelection {
        DecorativeSelection {
            phrase: self.phrases.next(),
            icon: self.icons.next(),
        }
    }
}
