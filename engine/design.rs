// ========================================================================================
//
//                     THE TEST DESIGN: VALIDATED OWNERSHIP OF A RUN
//
// ========================================================================================
//
// `SetTest` is the "proof token" of a valid design. Its successful construction is a
// guarantee that the baseline mask and SNP labels agree with the genotype rows, that the
// individual labels agree with the genotype columns, and that every label that will
// ever be read is a valid 1-based group. Nothing downstream re-checks these facts.
//
// It owns the two mutable pieces of state of a run, the SNP selection and the
// individual labels, and borrows everything else. The permutation and exact engines
// live in their own modules as `impl` blocks on this type.

use crate::classify::classify_individuals;
use crate::genotypes::PackedGenotypes;
use crate::labels::IndividualGroups;
use crate::selection::SnpSelection;
use crate::statistic::{SetStatistic, StatisticContext};
use thiserror::Error;

/// Every way a test design can be rejected.
#[derive(Error, Debug)]
pub enum SetTestError {
    #[error("Dimension mismatch in {what}: expected {expected}, found {found}.")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    #[error("Invalid label 0 for {what} at index {index}. Group labels are 1-based.")]
    InvalidLabel { what: &'static str, index: usize },
    #[error("SNP group {group} does not exist; labels run from 1 to {num_groups}.")]
    UnknownGroup { group: usize, num_groups: usize },
    #[error("Genotype dosage {value} at SNP {snp}, individual {individual} exceeds 2.")]
    InvalidGenotype {
        snp: usize,
        individual: usize,
        value: u8,
    },
}

pub struct SetTest<'a, S: SetStatistic> {
    pub(crate) selection: SnpSelection<'a>,
    pub(crate) labels: IndividualGroups,
    pub(crate) statistic: S,
}

impl<'a, S: SetStatistic> SetTest<'a, S> {
    /// Validates and assembles a test design.
    ///
    /// # Arguments
    /// * `genotypes`: the packed matrix, borrowed for the lifetime of the design.
    /// * `baseline_mask`: SNPs eligible for testing, one flag per genotype row.
    /// * `snp_groups`: 1-based SNP-group label per genotype row. Only labels of baseline
    ///   SNPs are read; other entries may be 0.
    /// * `individual_groups`: 1-based phenotype-group label per genotype column.
    /// * `statistic`: the injected test statistic.
    ///
    /// # Errors
    /// `DimensionMismatch` if a length disagrees with the genotype view, `InvalidLabel`
    /// if a label that will be read is 0.
    pub fn new(
        genotypes: &'a PackedGenotypes<'a>,
        baseline_mask: Vec<bool>,
        snp_groups: Vec<usize>,
        individual_groups: Vec<usize>,
        statistic: S,
    ) -> Result<Self, SetTestError> {
        let num_snps = genotypes.num_snps();
        check_len("baseline SNP mask", num_snps, baseline_mask.len())?;
        check_len("SNP group labels", num_snps, snp_groups.len())?;
        check_len(
            "individual group labels",
            genotypes.num_individuals(),
            individual_groups.len(),
        )?;

        if let Some(index) = (0..num_snps).find(|&i| baseline_mask[i] && snp_groups[i] == 0) {
            return Err(SetTestError::InvalidLabel {
                what: "SNP group",
                index,
            });
        }
        if let Some(index) = individual_groups.iter().position(|&label| label == 0) {
            return Err(SetTestError::InvalidLabel {
                what: "individual group",
                index,
            });
        }

        // Labels outside the baseline are never read and do not size the groups.
        let num_snp_groups = snp_groups
            .iter()
            .zip(&baseline_mask)
            .filter(|&(_, &in_baseline)| in_baseline)
            .map(|(&label, _)| label)
            .max()
            .unwrap_or(0);
        log::debug!(
            "Test design: {} SNPs ({} in baseline) in {} groups, {} individuals.",
            num_snps,
            baseline_mask.iter().filter(|&&b| b).count(),
            num_snp_groups,
            individual_groups.len()
        );

        Ok(Self {
            selection: SnpSelection::new(genotypes, baseline_mask, snp_groups, num_snp_groups),
            labels: IndividualGroups::new(individual_groups),
            statistic,
        })
    }

    pub fn num_snp_groups(&self) -> usize {
        self.selection.num_groups()
    }

    pub fn num_individual_groups(&self) -> usize {
        self.labels.num_groups()
    }

    pub fn num_individuals(&self) -> usize {
        self.labels.len()
    }

    pub fn selection(&self) -> &SnpSelection<'a> {
        &self.selection
    }

    /// The labels of the current trial. Between runs these are the construction labels.
    pub fn individual_groups(&self) -> &[usize] {
        self.labels.as_slice()
    }

    /// Puts the construction-time labels and the baseline mask back in place.
    pub fn restore_labels(&mut self) {
        self.labels.restore();
        self.selection.reset();
    }

    /// Classifies the individuals for a single SNP group and returns how many are
    /// variant-carrying, which is the number of items the exact test would enumerate.
    pub fn variant_individual_count(&mut self, group: usize) -> Result<usize, SetTestError> {
        self.check_group(group)?;
        self.selection.keep_only_group(group);
        let classes =
            classify_individuals(self.selection.active_rows(), self.labels.len());
        self.selection.reset();
        Ok(classes.variant.len())
    }

    pub(crate) fn check_group(&self, group: usize) -> Result<(), SetTestError> {
        let num_groups = self.num_snp_groups();
        if group == 0 || group > num_groups {
            return Err(SetTestError::UnknownGroup { group, num_groups });
        }
        Ok(())
    }

    /// Evaluates the statistic on the current selection with the owned labels.
    pub(crate) fn evaluate(&self, out: &mut [f64]) {
        self.evaluate_with(self.labels.as_slice(), out);
    }

    /// Evaluates the statistic on the current selection with caller-supplied labels.
    /// Workers use this with their private label buffers.
    pub(crate) fn evaluate_with(&self, individual_groups: &[usize], out: &mut [f64]) {
        let ctx = StatisticContext {
            rows: self.selection.active_rows(),
            snp_groups: self.selection.active_groups(),
            active_per_group: self.selection.active_per_group(),
            individual_groups,
            num_snp_groups: self.selection.num_groups(),
            num_individual_groups: self.labels.num_groups(),
        };
        self.statistic.compute(&ctx, out);
    }
}

fn check_len(what: &str, expected: usize, found: usize) -> Result<(), SetTestError> {
    if expected != found {
        return Err(SetTestError::DimensionMismatch {
            what: what.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
