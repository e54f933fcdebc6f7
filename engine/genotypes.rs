// ========================================================================================
//
//                      THE PACKED GENOTYPE VIEW: READ-ONLY 2-BIT ROWS
//
// ========================================================================================
//
// The engine never owns genotype data. It reads a SNP-major matrix in which every row
// holds `ceil(num_individuals / 4)` bytes and every byte holds four 2-bit calls:
//
//   bits 0-1 -> individual 4k, bits 2-3 -> 4k+1, bits 4-5 -> 4k+2, bits 6-7 -> 4k+3
//
// Codes 0, 1 and 2 are allele dosages. Code 3 is a missing call.
//
// The view is built once, validated once, and then shared by reference across every
// permutation trial and every exact-test candidate, on any number of threads.

use crate::design::SetTestError;

/// The 2-bit code reserved for a missing call.
pub const MISSING_CODE: u8 = 0b11;

/// Extracts the 2-bit code stored in `slot` (0..4) of a packed byte.
#[inline(always)]
pub fn decode_code(byte: u8, slot: usize) -> u8 {
    (byte >> (slot * 2)) & 0b11
}

/// The number of bytes one SNP row occupies for `num_individuals` individuals.
#[inline]
pub fn bytes_per_snp(num_individuals: usize) -> usize {
    num_individuals.div_ceil(4)
}

// ========================================================================================
//                                   BORROWED VIEW
// ========================================================================================

/// A validated, zero-copy view over a packed genotype matrix.
///
/// The constructors guarantee that every row has exactly `ceil(num_individuals / 4)`
/// bytes, so downstream code may index any `(snp, individual)` pair in range without
/// further checks.
#[derive(Debug, Clone)]
pub struct PackedGenotypes<'a> {
    rows: Vec<&'a [u8]>,
    num_individuals: usize,
    bytes_per_snp: usize,
}

impl<'a> PackedGenotypes<'a> {
    /// Builds a view from one byte slice per SNP.
    ///
    /// # Errors
    /// Returns `SetTestError::DimensionMismatch` if any row's length differs from
    /// `ceil(num_individuals / 4)`.
    pub fn from_rows(rows: Vec<&'a [u8]>, num_individuals: usize) -> Result<Self, SetTestError> {
        let stride = bytes_per_snp(num_individuals);
        if let Some((snp, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != stride) {
            return Err(SetTestError::DimensionMismatch {
                what: format!("byte length of genotype row {snp}"),
                expected: stride,
                found: row.len(),
            });
        }
        Ok(Self {
            rows,
            num_individuals,
            bytes_per_snp: stride,
        })
    }

    /// Builds a view over a single contiguous SNP-major buffer, such as the body of a
    /// memory-mapped `.bed` file with its header stripped.
    ///
    /// # Errors
    /// Returns `SetTestError::DimensionMismatch` if `data.len()` is not exactly
    /// `num_snps * ceil(num_individuals / 4)`.
    pub fn from_contiguous(
        data: &'a [u8],
        num_snps: usize,
        num_individuals: usize,
    ) -> Result<Self, SetTestError> {
        let stride = bytes_per_snp(num_individuals);
        if data.len() != num_snps * stride {
            return Err(SetTestError::DimensionMismatch {
                what: "genotype buffer length".to_string(),
                expected: num_snps * stride,
                found: data.len(),
            });
        }
        let rows = if stride == 0 {
            vec![&data[..0]; num_snps]
        } else {
            data.chunks_exact(stride).collect()
        };
        Ok(Self {
            rows,
            num_individuals,
            bytes_per_snp: stride,
        })
    }

    #[inline]
    pub fn num_snps(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn num_individuals(&self) -> usize {
        self.num_individuals
    }

    #[inline]
    pub fn bytes_per_snp(&self) -> usize {
        self.bytes_per_snp
    }

    /// The packed bytes of one SNP row.
    #[inline]
    pub fn row(&self, snp: usize) -> &'a [u8] {
        self.rows[snp]
    }

    /// All rows, in SNP order.
    #[inline]
    pub fn rows(&self) -> &[&'a [u8]] {
        &self.rows
    }

    /// The 2-bit code of `individual` at `snp`.
    #[inline]
    pub fn code(&self, snp: usize, individual: usize) -> u8 {
        code_at(self.rows[snp], individual)
    }
}

/// The 2-bit code of `individual` within a single packed row.
#[inline(always)]
pub fn code_at(row: &[u8], individual: usize) -> u8 {
    decode_code(row[individual / 4], individual % 4)
}

// ========================================================================================
//                                    OWNED MATRIX
// ========================================================================================

/// An owned, contiguous packed matrix. Loaders and tests build one of these and lend
/// the engine a `PackedGenotypes` view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedGenotypeMatrix {
    data: Vec<u8>,
    num_snps: usize,
    num_individuals: usize,
}

impl PackedGenotypeMatrix {
    /// Wraps an already-packed SNP-major buffer.
    pub fn from_packed(
        data: Vec<u8>,
        num_snps: usize,
        num_individuals: usize,
    ) -> Result<Self, SetTestError> {
        let expected = num_snps * bytes_per_snp(num_individuals);
        if data.len() != expected {
            return Err(SetTestError::DimensionMismatch {
                what: "genotype buffer length".to_string(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            data,
            num_snps,
            num_individuals,
        })
    }

    /// Packs per-SNP rows of calls. `Some(d)` is a dosage in `0..=2`, `None` is missing.
    ///
    /// # Errors
    /// `DimensionMismatch` if a row does not hold exactly `num_individuals` calls, and
    /// `InvalidGenotype` if a dosage exceeds 2.
    pub fn from_calls<R>(num_individuals: usize, rows: &[R]) -> Result<Self, SetTestError>
    where
        R: AsRef<[Option<u8>]>,
    {
        let stride = bytes_per_snp(num_individuals);
        let mut data = vec![0u8; rows.len() * stride];

        for (snp, row) in rows.iter().enumerate() {
            let calls = row.as_ref();
            if calls.len() != num_individuals {
                return Err(SetTestError::DimensionMismatch {
                    what: format!("number of calls in SNP row {snp}"),
                    expected: num_individuals,
                    found: calls.len(),
                });
            }
            let packed = &mut data[snp * stride..(snp + 1) * stride];
            for (individual, call) in calls.iter().enumerate() {
                let code = match *call {
                    Some(dosage @ 0..=2) => dosage,
                    Some(value) => {
                        return Err(SetTestError::InvalidGenotype {
                            snp,
                            individual,
                            value,
                        });
                    }
                    None => MISSING_CODE,
                };
                packed[individual / 4] |= code << ((individual % 4) * 2);
            }
        }

        Ok(Self {
            data,
            num_snps: rows.len(),
            num_individuals,
        })
    }

    pub fn num_snps(&self) -> usize {
        self.num_snps
    }

    pub fn num_individuals(&self) -> usize {
        self.num_individuals
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Lends a validated view. The owned buffer's invariants make this infallible.
    pub fn view(&self) -> PackedGenotypes<'_> {
        let stride = bytes_per_snp(self.num_individuals);
        let rows = if stride == 0 {
            vec![&self.data[..0]; self.num_snps]
        } else {
            self.data.chunks_exact(stride).collect()
        };
        PackedGenotypes {
            rows,
            num_individuals: self.num_individuals,
            bytes_per_snp: stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_places_individuals_in_ascending_bit_pairs() {
        let matrix =
            PackedGenotypeMatrix::from_calls(5, &[vec![Some(0), Some(1), Some(2), None, Some(2)]])
                .unwrap();
        // 0 | 1<<2 | 2<<4 | 3<<6 = 0b11_10_01_00
        assert_eq!(matrix.as_bytes(), &[0b1110_0100, 0b0000_0010]);

        let view = matrix.view();
        assert_eq!(view.bytes_per_snp(), 2);
        let codes: Vec<u8> = (0..5).map(|j| view.code(0, j)).collect();
        assert_eq!(codes, vec![0, 1, 2, MISSING_CODE, 2]);
    }

    #[test]
    fn rows_with_wrong_stride_are_rejected() {
        let short = [0u8; 1];
        let good = [0u8; 2];
        let err = PackedGenotypes::from_rows(vec![&good, &short], 6).unwrap_err();
        match err {
            SetTestError::DimensionMismatch { expected, found, .. } => {
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn contiguous_buffer_is_split_into_rows() {
        let data = [0b0000_0001u8, 0b0000_0010, 0b0000_0011];
        let view = PackedGenotypes::from_contiguous(&data, 3, 3).unwrap();
        assert_eq!(view.num_snps(), 3);
        assert_eq!(view.code(0, 0), 1);
        assert_eq!(view.code(1, 0), 2);
        assert_eq!(view.code(2, 0), MISSING_CODE);

        assert!(PackedGenotypes::from_contiguous(&data, 2, 3).is_err());
    }

    #[test]
    fn dosage_above_two_is_invalid() {
        let err = PackedGenotypeMatrix::from_calls(2, &[vec![Some(0), Some(3)]]).unwrap_err();
        assert!(matches!(
            err,
            SetTestError::InvalidGenotype {
                snp: 0,
                individual: 1,
                value: 3
            }
        ));
    }
}
