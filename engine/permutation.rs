// ========================================================================================
//
//               THE ADAPTIVE PERMUTATION ENGINE: SEQUENTIAL EARLY STOPPING
//
// ========================================================================================
//
// ### 1. The Procedure ###
//
// The observed statistic vector is computed once under the construction labels. Each
// trial then shuffles the labels, re-evaluates the statistic over the active SNPs, and
// for every group that still has an active SNP records:
//
//   - `B[g]`, the number of trials the group took part in,
//   - `A[g]`, the number of trials with `stat >= observed`,
//   - `C[g]`, the number of those with `stat == observed`.
//
// A group whose `A` reaches the target has enough evidence. Its SNPs leave the working
// mask and it stops consuming trials; its counts freeze. The run ends after
// `max_trials` trials or as soon as no SNP is left.
//
// ### 2. The p-value ###
//
//   p[g] = (A[g] - 0.5 * C[g] + 1) / (B[g] + 1)
//
// Add-one, half-tie corrected. Because `C <= A`, the numerator is at least 1 and at
// most `B + 1`, so `p` lies in (0, 1] for every group, including groups never tested.
//
// ### 3. Two Drivers ###
//
//   - `permutation_test` is strictly sequential over one caller-supplied generator.
//   - `permutation_test_parallel` runs trials in batches on the rayon pool. Trial `t`
//     shuffles a private copy of the construction labels with its own ChaCha stream
//     `(seed, t)`. Outcomes are recorded in trial order after each batch, and the mask
//     shrinks only between batches, so results depend on the seed and batch size but
//     never on the number of threads.

use crate::config::PermutationConfig;
use crate::design::SetTest;
use crate::labels::permute_labels;
use crate::statistic::SetStatistic;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;

/// Per-group output of a permutation run. All vectors have one entry per SNP group,
/// indexed by `label - 1`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermutationResult {
    pub stat: Vec<f64>,
    pub nb_geq: Vec<u64>,
    pub nb_eq: Vec<u64>,
    pub nb_perms: Vec<u64>,
    pub p_value: Vec<f64>,
}

/// The add-one, half-tie corrected permutation p-value.
#[inline]
pub fn mid_p_value(nb_geq: u64, nb_eq: u64, nb_perms: u64) -> f64 {
    (nb_geq as f64 - 0.5 * nb_eq as f64 + 1.0) / (nb_perms as f64 + 1.0)
}

/// The running `A`, `C`, `B` tallies of a run.
#[derive(Debug, Clone)]
struct ExceedanceCounts {
    geq: Vec<u64>,
    eq: Vec<u64>,
    trials: Vec<u64>,
}

impl ExceedanceCounts {
    fn new(num_groups: usize) -> Self {
        Self {
            geq: vec![0; num_groups],
            eq: vec![0; num_groups],
            trials: vec![0; num_groups],
        }
    }

    /// Records one trial. Returns `true` if some group reached the target on this trial.
    fn record(
        &mut self,
        stats: &[f64],
        observed: &[f64],
        active_per_group: &[usize],
        target_exceed: u64,
    ) -> bool {
        let mut saturated = false;
        for g in 0..observed.len() {
            if active_per_group[g] == 0 {
                continue;
            }
            self.trials[g] += 1;
            if stats[g] >= observed[g] {
                self.geq[g] += 1;
                if self.geq[g] == target_exceed {
                    saturated = true;
                }
                if stats[g] == observed[g] {
                    self.eq[g] += 1;
                }
            }
        }
        saturated
    }

    fn into_result(self, observed: Vec<f64>) -> PermutationResult {
        let p_value = self
            .geq
            .iter()
            .zip(&self.eq)
            .zip(&self.trials)
            .map(|((&a, &c), &b)| mid_p_value(a, c, b))
            .collect();
        PermutationResult {
            stat: observed,
            nb_geq: self.geq,
            nb_eq: self.eq,
            nb_perms: self.trials,
            p_value,
        }
    }
}

impl<'a, S: SetStatistic> SetTest<'a, S> {
    /// Runs the adaptive permutation test on a single, caller-supplied random stream.
    ///
    /// # Arguments
    /// * `target_exceed`: exceedance count that retires a group (values below 1 are
    ///   treated as 1).
    /// * `max_trials`: upper bound on the number of permutations.
    /// * `rng`: the random source. The same seed reproduces the same result.
    ///
    /// The run starts from the baseline mask and the construction labels, and puts both
    /// back when it returns.
    pub fn permutation_test<R: Rng + ?Sized>(
        &mut self,
        target_exceed: u64,
        max_trials: u64,
        rng: &mut R,
    ) -> PermutationResult {
        let target_exceed = target_exceed.max(1);
        self.restore_labels();

        let num_groups = self.num_snp_groups();
        let mut observed = vec![0.0; num_groups];
        self.evaluate(&mut observed);

        log::info!(
            "Permutation test: {} active SNPs in {} groups, target {} exceedances, at most {} trials.",
            self.selection.num_active(),
            num_groups,
            target_exceed,
            max_trials
        );

        let mut counts = ExceedanceCounts::new(num_groups);
        let mut stats = vec![0.0; num_groups];
        let mut trials_run = 0u64;
        while trials_run < max_trials {
            self.labels.permute(rng);
            stats.fill(0.0);
            self.evaluate(&mut stats);
            trials_run += 1;

            let saturated = counts.record(
                &stats,
                &observed,
                self.selection.active_per_group(),
                target_exceed,
            );
            if saturated && self.retire_saturated_groups(&counts, target_exceed) {
                break;
            }
        }

        log::info!("Permutation test finished after {trials_run} trials.");
        self.restore_labels();
        counts.into_result(observed)
    }

    /// Runs the adaptive permutation test in rayon batches, see the module docs.
    pub fn permutation_test_parallel(&mut self, config: &PermutationConfig) -> PermutationResult {
        let target_exceed = config.target_exceed.max(1);
        let batch_size = config.batch_size.max(1);
        self.restore_labels();

        let num_groups = self.num_snp_groups();
        let mut observed = vec![0.0; num_groups];
        self.evaluate(&mut observed);

        log::info!(
            "Batched permutation test: {} active SNPs in {} groups, target {} exceedances, at most {} trials in batches of {}.",
            self.selection.num_active(),
            num_groups,
            target_exceed,
            config.max_trials,
            batch_size
        );

        let mut counts = ExceedanceCounts::new(num_groups);
        let mut trials_run = 0u64;
        while trials_run < config.max_trials {
            let batch_end = (trials_run + batch_size).min(config.max_trials);
            let batch_stats = self.run_batch(trials_run..batch_end, config.seed);
            trials_run = batch_end;

            let mut saturated = false;
            for stats in &batch_stats {
                saturated |= counts.record(
                    stats,
                    &observed,
                    self.selection.active_per_group(),
                    target_exceed,
                );
            }
            if saturated && self.retire_saturated_groups(&counts, target_exceed) {
                break;
            }
        }

        log::info!("Batched permutation test finished after {trials_run} trials.");
        self.restore_labels();
        counts.into_result(observed)
    }

    /// Evaluates the statistic for every trial of a batch, in trial order.
    fn run_batch(&self, trials: std::ops::Range<u64>, seed: u64) -> Vec<Vec<f64>> {
        let num_groups = self.num_snp_groups();
        let original = self.labels.original();
        let first = trials.start;
        let len = (trials.end - trials.start) as usize;
        (0..len)
            .into_par_iter()
            .map_init(
                || original.to_vec(),
                |labels, offset| {
                    let trial = first + offset as u64;
                    labels.copy_from_slice(original);
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    rng.set_stream(trial);
                    permute_labels(labels, &mut rng);

                    let mut stats = vec![0.0; num_groups];
                    self.evaluate_with(labels, &mut stats);
                    stats
                },
            )
            .collect()
    }

    /// Drops the SNPs of every group whose exceedance count reached the target.
    /// Returns `true` when no SNP is left.
    fn retire_saturated_groups(&mut self, counts: &ExceedanceCounts, target_exceed: u64) -> bool {
        let before = self.selection.num_active();
        self.selection
            .retain_groups(|group| counts.geq[group - 1] < target_exceed);
        log::debug!(
            "Retired saturated groups: {} -> {} active SNPs.",
            before,
            self.selection.num_active()
        );
        if self.selection.num_active() == 0 {
            log::info!("Every SNP group reached the exceedance target; stopping early.");
            return true;
        }
        false
    }
}
