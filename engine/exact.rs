// ========================================================================================
//
//                 THE EXACT TEST: MULTINOMIAL-WEIGHTED FULL ENUMERATION
//
// ========================================================================================
//
// ### 1. What Is Enumerated ###
//
// For one SNP group, the `N` individuals split into `M` invariant ones (their calls
// cannot move the statistic) and `V = N - M` variant-carrying ones. Only the labels of
// the `V` matter, so the test walks every assignment of those `V` individuals to the
// `K` phenotype groups that fits within the observed group sizes `disp`, and drops the
// `M` invariant individuals into whatever room is left, group by group.
//
// ### 2. The Weight of a Candidate ###
//
// Under random relabeling with fixed group sizes, a candidate that leaves `r[k]` free
// slots in group `k` has probability
//
//   M! * prod_k disp[k]! / (N! * prod_k r[k]!)
//
// computed in log space as `x - sum_k ln(r[k]!)` with the per-group constant
//
//   x = ln(M!) - ln(N!) + sum_k ln(disp[k]!).
//
// These probabilities sum to one over all candidates.
//
// ### 3. Output ###
//
// p_eq = P(stat == obs), p_geq = P(stat >= obs), and the mid-p value
// p_geq - 0.5 * p_eq.
//
// The parallel driver evaluates candidates in chunks on the rayon pool and adds their
// contributions in enumeration order, which makes it bit-identical to the serial one.

use crate::classify::{Variability, classify_individuals};
use crate::combinations::{AssignmentEnumerator, Candidate, expected_candidate_count};
use crate::design::{SetTest, SetTestError};
use crate::statistic::SetStatistic;
use rayon::prelude::*;
use serde::Serialize;
use statrs::function::factorial::ln_factorial;

/// Per-group output of an exact run, in the order the groups were requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExactResult {
    pub group: Vec<usize>,
    pub stat: Vec<f64>,
    pub p_geq: Vec<f64>,
    pub p_eq: Vec<f64>,
    pub p_value: Vec<f64>,
}

impl ExactResult {
    fn push(&mut self, group: usize, tally: GroupTally) {
        self.group.push(group);
        self.stat.push(tally.observed);
        self.p_geq.push(tally.p_geq);
        self.p_eq.push(tally.p_eq);
        self.p_value.push(tally.p_geq - 0.5 * tally.p_eq);
    }
}

/// Everything fixed for one group before enumeration starts.
struct GroupSetup {
    classes: Variability,
    capacity: Vec<usize>,
    log_base: f64,
    observed: f64,
}

struct GroupTally {
    observed: f64,
    p_geq: f64,
    p_eq: f64,
}

impl GroupTally {
    fn new(observed: f64) -> Self {
        Self {
            observed,
            p_geq: 0.0,
            p_eq: 0.0,
        }
    }

    #[inline]
    fn add(&mut self, probability: f64, stat: f64) {
        if stat == self.observed {
            self.p_eq += probability;
        }
        if stat >= self.observed {
            self.p_geq += probability;
        }
    }
}

/// `ln(M!) - ln(N!) + sum_k ln(disp[k]!)`.
pub fn log_base_term(num_invariant: usize, num_individuals: usize, group_sizes: &[usize]) -> f64 {
    let mut x = ln_factorial(num_invariant as u64) - ln_factorial(num_individuals as u64);
    for &size in group_sizes {
        x += ln_factorial(size as u64);
    }
    x
}

/// Probability of a candidate leaving `residual` free slots per group.
#[inline]
pub fn candidate_probability(log_base: f64, residual: &[usize]) -> f64 {
    let mut log_p = log_base;
    for &room in residual {
        log_p -= ln_factorial(room as u64);
    }
    log_p.exp()
}

/// Writes a candidate into a full label vector: variant-carrying individuals get their
/// enumerated group, invariant individuals fill the remaining room group by group.
fn apply_candidate(
    labels: &mut [usize],
    classes: &Variability,
    assignment: &[usize],
    residual: &[usize],
) {
    for (&individual, &group) in classes.variant.iter().zip(assignment) {
        labels[individual] = group + 1;
    }
    let mut invariant = classes.invariant.iter();
    for (group, &room) in residual.iter().enumerate() {
        for individual in invariant.by_ref().take(room) {
            labels[*individual] = group + 1;
        }
    }
}

impl<'a, S: SetStatistic> SetTest<'a, S> {
    /// Computes exact p-values for each requested SNP group (1-based labels).
    ///
    /// Enumeration grows combinatorially with the number of variant-carrying
    /// individuals of a group; keeping it tractable is the caller's responsibility
    /// (see `variant_individual_count`).
    ///
    /// # Errors
    /// `UnknownGroup` if any requested label is outside `1..=num_snp_groups`. All labels
    /// are checked before any work is done.
    pub fn exact_test(&mut self, groups: &[usize]) -> Result<ExactResult, SetTestError> {
        for &group in groups {
            self.check_group(group)?;
        }
        self.restore_labels();

        let num_groups = self.num_snp_groups();
        let mut result = ExactResult::default();
        let mut stats = vec![0.0; num_groups];

        for &group in groups {
            let setup = self.prepare_group(group);
            let mut tally = GroupTally::new(setup.observed);
            let mut enumerator =
                AssignmentEnumerator::new(setup.classes.variant.len(), setup.capacity.clone());

            while enumerator.has_more() {
                apply_candidate(
                    self.labels.as_mut_slice(),
                    &setup.classes,
                    enumerator.current(),
                    enumerator.residual(),
                );
                stats.fill(0.0);
                self.evaluate(&mut stats);
                let probability = candidate_probability(setup.log_base, enumerator.residual());
                tally.add(probability, stats[group - 1]);
                enumerator.advance();
            }

            self.labels.restore();
            log::debug!(
                "Exact test of group {group}: p_geq = {}, p_eq = {}.",
                tally.p_geq,
                tally.p_eq
            );
            result.push(group, tally);
        }

        self.restore_labels();
        Ok(result)
    }

    /// Same result as `exact_test`, bit for bit, with candidates evaluated in parallel
    /// chunks of `chunk_size`.
    pub fn exact_test_parallel(
        &mut self,
        groups: &[usize],
        chunk_size: usize,
    ) -> Result<ExactResult, SetTestError> {
        for &group in groups {
            self.check_group(group)?;
        }
        self.restore_labels();

        let chunk_size = chunk_size.max(1);
        let mut result = ExactResult::default();

        for &group in groups {
            let setup = self.prepare_group(group);
            let mut tally = GroupTally::new(setup.observed);
            let mut enumerator =
                AssignmentEnumerator::new(setup.classes.variant.len(), setup.capacity.clone());

            loop {
                let chunk: Vec<Candidate> = enumerator.by_ref().take(chunk_size).collect();
                if chunk.is_empty() {
                    break;
                }
                for (probability, stat) in self.evaluate_chunk(&setup, group, &chunk) {
                    tally.add(probability, stat);
                }
            }

            log::debug!(
                "Exact test of group {group}: p_geq = {}, p_eq = {}.",
                tally.p_geq,
                tally.p_eq
            );
            result.push(group, tally);
        }

        self.restore_labels();
        Ok(result)
    }

    /// Restricts the selection to `group`, classifies individuals and evaluates the
    /// observed statistic under the construction labels.
    fn prepare_group(&mut self, group: usize) -> GroupSetup {
        self.selection.keep_only_group(group);
        let classes = classify_individuals(self.selection.active_rows(), self.labels.len());
        let capacity = self.labels.group_sizes();
        let log_base = log_base_term(classes.invariant.len(), self.labels.len(), &capacity);

        let mut stats = vec![0.0; self.num_snp_groups()];
        self.evaluate(&mut stats);
        let observed = stats[group - 1];

        log::info!(
            "Exact test of group {}: {} SNPs, {} variant-carrying and {} invariant individuals, {} candidates.",
            group,
            self.selection.num_active(),
            classes.variant.len(),
            classes.invariant.len(),
            expected_candidate_count(classes.variant.len(), &capacity)
        );

        GroupSetup {
            classes,
            capacity,
            log_base,
            observed,
        }
    }

    /// Probability and statistic of every candidate in the chunk, in chunk order.
    fn evaluate_chunk(
        &self,
        setup: &GroupSetup,
        group: usize,
        chunk: &[Candidate],
    ) -> Vec<(f64, f64)> {
        let num_groups = self.num_snp_groups();
        let num_individuals = self.num_individuals();
        chunk
            .par_iter()
            .map_init(
                || (vec![0usize; num_individuals], vec![0.0; num_groups]),
                |(labels, stats), candidate| {
                    apply_candidate(
                        labels,
                        &setup.classes,
                        &candidate.assignment,
                        &candidate.residual,
                    );
                    stats.fill(0.0);
                    self.evaluate_with(labels, stats);
                    (
                        candidate_probability(setup.log_base, &candidate.residual),
                        stats[group - 1],
                    )
                },
            )
            .collect()
    }
}
