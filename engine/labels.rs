//! Phenotype-group labels of the individuals.
//!
//! `IndividualGroups` is the one mutable labeling buffer of a test run. Permutation
//! shuffles it in place and the exact test overwrites it candidate by candidate, so it
//! also keeps the labeling it was built with and can always go back to it.

use rand::Rng;
use rand::distributions::Standard;

#[derive(Debug, Clone)]
pub struct IndividualGroups {
    /// 1-based phenotype-group label per individual for the current trial.
    labels: Vec<usize>,
    /// The labeling supplied at construction. Never mutated.
    original: Vec<usize>,
    num_groups: usize,
}

impl IndividualGroups {
    /// The caller (`SetTest::new`) has already checked that every label is in `1..`.
    pub(crate) fn new(labels: Vec<usize>) -> Self {
        let num_groups = labels.iter().copied().max().unwrap_or(0);
        Self {
            original: labels.clone(),
            labels,
            num_groups,
        }
    }

    /// Shuffles the labels in place with the Fisher–Yates scheme
    /// `j = floor(i * U)`, `U ~ Uniform[0, 1)`, for `i` from `n - 1` down to `1`.
    ///
    /// The random source is always supplied by the caller.
    pub fn permute<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        permute_labels(&mut self.labels, rng);
    }

    /// Puts back the labeling supplied at construction.
    pub fn restore(&mut self) {
        self.labels.copy_from_slice(&self.original);
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.labels
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [usize] {
        &mut self.labels
    }

    pub fn original(&self) -> &[usize] {
        &self.original
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Number of individuals currently carrying each label, indexed by `label - 1`.
    pub fn group_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_groups];
        for &label in &self.labels {
            sizes[label - 1] += 1;
        }
        sizes
    }
}

/// The shuffle shared by `IndividualGroups::permute` and the batched permutation
/// workers, which shuffle private copies of the labels.
pub(crate) fn permute_labels<R: Rng + ?Sized>(labels: &mut [usize], rng: &mut R) {
    for i in (1..labels.len()).rev() {
        let u: f64 = rng.sample(Standard);
        let j = (i as f64 * u).floor() as usize;
        labels.swap(i, j);
    }
}
