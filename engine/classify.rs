//! Splits individuals into those that can and cannot move an exact-test statistic.
//!
//! An individual whose calls across the tested SNP group contain no heterozygote and
//! only one homozygous class looks the same to a collapsing statistic whatever label it
//! gets. Those individuals are placed in bulk by the exact test instead of being
//! enumerated one by one.

use crate::genotypes::decode_code;

/// The two classes, as sorted individual indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variability {
    pub invariant: Vec<usize>,
    pub variant: Vec<usize>,
}

/// Tallies of the four 2-bit codes for one individual: `[N0, N1, N2, N_missing]`.
pub type CodeTally = [u32; 4];

/// Counts every code of every individual across `rows`.
pub fn tally_codes(rows: &[&[u8]], num_individuals: usize) -> Vec<CodeTally> {
    let stride = num_individuals.div_ceil(4);
    // Padding slots of the last byte are tallied too and dropped by the truncate.
    let mut tallies = vec![[0u32; 4]; stride * 4];
    for row in rows {
        for (byte_index, &byte) in row.iter().enumerate() {
            let base = byte_index * 4;
            for slot in 0..4 {
                tallies[base + slot][decode_code(byte, slot) as usize] += 1;
            }
        }
    }
    tallies.truncate(num_individuals);
    tallies
}

/// Invariant iff `N1 == 0 && (N2 == 0 || N0 == 0)`. Missing calls do not count.
#[inline]
pub fn is_invariant(tally: &CodeTally) -> bool {
    let [n0, n1, n2, _] = *tally;
    n1 == 0 && (n2 == 0 || n0 == 0)
}

pub fn classify_individuals(rows: &[&[u8]], num_individuals: usize) -> Variability {
    let mut classes = Variability::default();
    for (individual, tally) in tally_codes(rows, num_individuals).iter().enumerate() {
        if is_invariant(tally) {
            classes.invariant.push(individual);
        } else {
            classes.variant.push(individual);
        }
    }
    classes
}
