use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How trial order and slot positions are randomized
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    /// Textbook Fisher-Yates; every permutation is equally likely.
    #[default]
    Uniform,
    /// The loop recorded datasets were generated with: `i` runs over
    /// `0..len-2` and swaps with an index drawn from the whole slice. Not
    /// uniform, and lists of two or fewer elements are never reordered.
    Legacy,
}

impl ShuffleMode {
    pub fn shuffle<T, R: Rng>(&self, items: &mut [T], rng: &mut R) {
        match self {
            ShuffleMode::Uniform => items.shuffle(rng),
            ShuffleMode::Legacy => legacy_shuffle(items, rng),
        }
    }
}

fn legacy_shuffle<T, R: Rng>(items: &mut [T], rng: &mut R) {
    let len = items.len();
    for i in 0..len.saturating_sub(2) {
        let j = rng.random_range(0..len);
        items.swap(i, j);
    }
}
