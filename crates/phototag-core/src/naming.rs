//! Human-readable project names: `<noun>-<counter>`.

use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed noun vocabulary names are drawn from.
pub const VOCABULARY: [&str; 20] = [
    "Sunset",
    "Mountain",
    "Beach",
    "Forest",
    "Cityscape",
    "Portrait",
    "Pet",
    "Food",
    "Flower",
    "Building",
    "Lake",
    "Art",
    "Landscape",
    "Tree",
    "Cloud",
    "River",
    "Snow",
    "Sand",
    "Road",
    "Horizon",
];

/// Generates `noun-N` labels with a monotonically increasing counter.
///
/// The noun may repeat; the counter never does, so every name handed out by
/// one generator is distinct. The counter is atomic, so a shared generator
/// stays unique even when callers classify concurrently.
#[derive(Debug)]
pub struct NameGenerator {
    next: AtomicU64,
}

impl NameGenerator {
    /// Start counting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Resume from a persisted high-water mark. Zero is bumped to 1.
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next.max(1)),
        }
    }

    /// The counter value the next call to [`next_name`](Self::next_name) will use.
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Produce a fresh name, spending one counter value.
    pub fn next_name(&self) -> String {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let noun = VOCABULARY
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("photo");
        format!("{}-{index}", noun.to_lowercase())
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
