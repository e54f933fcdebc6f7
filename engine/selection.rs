// ========================================================================================
//
//                    SNP SELECTION: THE ACTIVE-ROW BOOKKEEPING
//
// ========================================================================================
//
// A run sees only the SNPs in the working mask. The working mask is always a subset of
// the baseline mask fixed at construction, and it only changes through `update`, which
// rebuilds every derived field in a single linear pass. Nothing else in the crate reads
// the raw mask: the permutation loop, the exact test and the statistic callback all see
// `active_rows`, `active_groups` and `active_per_group`, which therefore can never drift
// out of sync with each other.

use crate::genotypes::PackedGenotypes;

#[derive(Debug, Clone)]
pub struct SnpSelection<'a> {
    genotypes: &'a PackedGenotypes<'a>,
    baseline: Vec<bool>,
    working: Vec<bool>,
    /// 1-based group label per SNP. Labels of SNPs outside the baseline are never read.
    snp_group_of: Vec<usize>,
    num_groups: usize,

    // --- Derived state, rebuilt by `update` ---
    active_rows: Vec<&'a [u8]>,
    active_groups: Vec<usize>,
    active_snps: Vec<usize>,
    active_per_group: Vec<usize>,
}

impl<'a> SnpSelection<'a> {
    /// Creates a selection whose working mask starts equal to the baseline.
    ///
    /// The caller (`SetTest::new`) has already validated lengths and labels.
    pub(crate) fn new(
        genotypes: &'a PackedGenotypes<'a>,
        baseline: Vec<bool>,
        snp_group_of: Vec<usize>,
        num_groups: usize,
    ) -> Self {
        let working = baseline.clone();
        let mut selection = Self {
            genotypes,
            baseline,
            working: Vec::new(),
            snp_group_of,
            num_groups,
            active_rows: Vec::new(),
            active_groups: Vec::new(),
            active_snps: Vec::new(),
            active_per_group: vec![0; num_groups],
        };
        selection.update(&working);
        selection
    }

    /// Replaces the working mask with `mask ∧ baseline` and rebuilds the active rows,
    /// their labels, their original indices and the per-group counts.
    ///
    /// # Panics
    /// Panics if `mask.len()` differs from the full SNP count; that is a logic error in
    /// the caller, not a data error.
    pub fn update(&mut self, mask: &[bool]) {
        assert_eq!(
            mask.len(),
            self.baseline.len(),
            "Logic error: working mask length does not match the number of SNPs."
        );

        self.working.clear();
        self.working
            .extend(mask.iter().zip(&self.baseline).map(|(&m, &b)| m && b));

        self.active_rows.clear();
        self.active_groups.clear();
        self.active_snps.clear();
        self.active_per_group.fill(0);

        for (snp, _) in self.working.iter().enumerate().filter(|(_, active)| **active) {
            let group = self.snp_group_of[snp];
            self.active_rows.push(self.genotypes.row(snp));
            self.active_groups.push(group);
            self.active_snps.push(snp);
            self.active_per_group[group - 1] += 1;
        }
    }

    /// Restores the working mask to the baseline.
    pub fn reset(&mut self) {
        let baseline = self.baseline.clone();
        self.update(&baseline);
    }

    /// Restricts the working mask to the baseline SNPs of a single group.
    pub fn keep_only_group(&mut self, group: usize) {
        let mask: Vec<bool> = self.snp_group_of.iter().map(|&g| g == group).collect();
        self.update(&mask);
    }

    /// Drops every working SNP whose group fails `keep`. Monotone: it can only shrink
    /// the working mask.
    pub fn retain_groups<F>(&mut self, mut keep: F)
    where
        F: FnMut(usize) -> bool,
    {
        let mask: Vec<bool> = self
            .working
            .iter()
            .zip(&self.snp_group_of)
            .map(|(&active, &group)| active && keep(group))
            .collect();
        self.update(&mask);
    }

    #[inline]
    pub fn active_rows(&self) -> &[&'a [u8]] {
        &self.active_rows
    }

    /// 1-based group label of each active row.
    #[inline]
    pub fn active_groups(&self) -> &[usize] {
        &self.active_groups
    }

    /// Original SNP index of each active row.
    #[inline]
    pub fn active_snps(&self) -> &[usize] {
        &self.active_snps
    }

    /// Active SNP count per group, indexed by `label - 1`.
    #[inline]
    pub fn active_per_group(&self) -> &[usize] {
        &self.active_per_group
    }

    #[inline]
    pub fn num_active(&self) -> usize {
        self.active_rows.len()
    }

    #[inline]
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn working_mask(&self) -> &[bool] {
        &self.working
    }

    pub fn baseline_mask(&self) -> &[bool] {
        &self.baseline
    }
}
