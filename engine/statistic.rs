// ========================================================================================
//
//                   THE STATISTIC SEAM: AN INJECTED, PURE CAPABILITY
//
// ========================================================================================
//
// The engine drives permutations and enumerations; it never knows what it is testing.
// Whatever maps (active rows, their group labels, individual labels) to one value per
// SNP group is handed in as a `SetStatistic`. It must be a pure function of the
// `StatisticContext`: the engine calls it once per trial and once per exact-test
// candidate, possibly from several rayon workers at the same time.
//
// The exact test adds one more contract. Individuals that `classify::is_invariant`
// accepts for a group are placed in bulk, so a statistic used there must not tell them
// apart: swapping two invariant individuals must leave every group's value unchanged.

use crate::classify::is_invariant;
use crate::genotypes::{MISSING_CODE, code_at};

/// Everything a statistic is allowed to see for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct StatisticContext<'a> {
    /// Packed rows of the active SNPs.
    pub rows: &'a [&'a [u8]],
    /// 1-based SNP-group label of each active row.
    pub snp_groups: &'a [usize],
    /// Active SNP count per group, indexed by `label - 1`.
    pub active_per_group: &'a [usize],
    /// 1-based phenotype-group label of each individual for this evaluation.
    pub individual_groups: &'a [usize],
    pub num_snp_groups: usize,
    pub num_individual_groups: usize,
}

impl StatisticContext<'_> {
    #[inline]
    pub fn num_individuals(&self) -> usize {
        self.individual_groups.len()
    }
}

/// A test statistic evaluated over every SNP group at once.
///
/// `out` has length `num_snp_groups`; `out[g - 1]` receives the statistic of group `g`.
/// Entries of groups with no active SNP may be left untouched; the engine ignores them.
pub trait SetStatistic: Sync {
    fn compute(&self, ctx: &StatisticContext<'_>, out: &mut [f64]);
}

impl<F> SetStatistic for F
where
    F: Fn(&StatisticContext<'_>, &mut [f64]) + Sync,
{
    #[inline]
    fn compute(&self, ctx: &StatisticContext<'_>, out: &mut [f64]) {
        self(ctx, out)
    }
}

// ========================================================================================
//                         REFERENCE STATISTIC: CARRIER CHI-SQUARE
// ========================================================================================

/// A CAST-style collapsing statistic.
///
/// Within each SNP group an individual is a carrier when its calls over the group's
/// active SNPs vary in the classifier's sense: a heterozygote, or both homozygous
/// classes. Missing calls never make a carrier. An individual that is homozygous for
/// the same allele at every called SNP is a non-carrier whichever allele that is, which
/// keeps the statistic usable by the exact test. The value is Pearson's chi-square of
/// the (phenotype group x carrier status) table, or `0.0` when a margin of the table is
/// empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarrierChiSquare;

/// Bit `c` records that code `c` (0, 1 or 2) was seen.
#[inline]
fn is_carrier(seen: u8) -> bool {
    let tally = [
        u32::from(seen & 0b001 != 0),
        u32::from(seen & 0b010 != 0),
        u32::from(seen & 0b100 != 0),
        0,
    ];
    !is_invariant(&tally)
}

impl SetStatistic for CarrierChiSquare {
    fn compute(&self, ctx: &StatisticContext<'_>, out: &mut [f64]) {
        let n = ctx.num_individuals();
        let k = ctx.num_individual_groups;

        // seen[g * n + j] collects the called codes of individual j in group g.
        let mut seen = vec![0u8; ctx.num_snp_groups * n];
        for (row, &group) in ctx.rows.iter().zip(ctx.snp_groups) {
            let codes = &mut seen[(group - 1) * n..group * n];
            for (individual, bits) in codes.iter_mut().enumerate() {
                let code = code_at(row, individual);
                if code != MISSING_CODE {
                    *bits |= 1 << code;
                }
            }
        }

        let mut group_sizes = vec![0usize; k];
        for &label in ctx.individual_groups {
            group_sizes[label - 1] += 1;
        }

        let mut carriers_per_label = vec![0usize; k];
        for (g, value) in out.iter_mut().enumerate() {
            if ctx.active_per_group[g] == 0 {
                continue;
            }
            carriers_per_label.fill(0);
            let codes = &seen[g * n..(g + 1) * n];
            for (&label, &bits) in ctx.individual_groups.iter().zip(codes) {
                if is_carrier(bits) {
                    carriers_per_label[label - 1] += 1;
                }
            }
            *value = pearson_chi_square(&carriers_per_label, &group_sizes);
        }
    }
}

/// Pearson's chi-square of a K x 2 table given the first column and the row totals.
fn pearson_chi_square(carriers: &[usize], group_sizes: &[usize]) -> f64 {
    let total: usize = group_sizes.iter().sum();
    let total_carriers: usize = carriers.iter().sum();
    if total == 0 || total_carriers == 0 || total_carriers == total {
        return 0.0;
    }

    let total = total as f64;
    let carrier_rate = total_carriers as f64 / total;
    let mut chi_square = 0.0;
    for (&observed, &size) in carriers.iter().zip(group_sizes) {
        if size == 0 {
            continue;
        }
        let size = size as f64;
        let expected_carriers = size * carrier_rate;
        let expected_others = size - expected_carriers;
        let observed = observed as f64;
        chi_square += (observed - expected_carriers).powi(2) / expected_carriers;
        chi_square += ((size - observed) - expected_others).powi(2) / expected_others;
    }
    chi_square
}
