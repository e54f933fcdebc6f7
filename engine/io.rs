// ========================================================================================
//
//               THE INPUT AIRLOCK: PLINK FILESETS AND LABEL FILES
//
// ========================================================================================
//
// The engine is format-agnostic. This module is the command-line tool's bridge from a
// PLINK1 fileset on disk to the packed, engine-encoded matrix the engine borrows.
//
//   - The `.bed` file is validated (magic number, SNP-major mode, exact size against
//     the `.fam`/`.bim` line counts) before it is memory-mapped.
//   - PLINK's 2-bit codes are transcoded into the engine's dosage codes, counting the
//     A1 allele: 00 -> 2, 10 -> 1, 11 -> 0, 01 -> missing (3).
//   - Label files hold one integer per line; `0` and `NA` mark an absent label.

use crate::genotypes::{MISSING_CODE, PackedGenotypeMatrix, bytes_per_snp, decode_code};
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

const BED_MAGIC: [u8; 3] = [0x6c, 0x1b, 0x01];

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid .bed file magic number or mode in '{0}'. Must be SNP-major.")]
    BadMagic(PathBuf),
    #[error(
        "BED file size mismatch in '{path}'. Expected {expected} bytes based on the .fam and .bim files, but found {found} bytes."
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("Parse error in '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> InputError + '_ {
    move |source| InputError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Resolves one member of a fileset. The extension is appended, so dotted prefixes such
/// as `cohort.chr22` keep their full name; a path naming a member is accepted too.
pub fn fileset_path(prefix: &Path, extension: &str) -> PathBuf {
    match prefix.extension().and_then(|ext| ext.to_str()) {
        Some("bed" | "bim" | "fam") => prefix.with_extension(extension),
        _ => {
            let mut name = prefix.as_os_str().to_os_string();
            name.push(".");
            name.push(extension);
            PathBuf::from(name)
        }
    }
}

/// Loads `<prefix>.bed` with its `.fam` and `.bim` companions into an owned matrix
/// in the engine's encoding.
pub fn load_plink(prefix: &Path) -> Result<PackedGenotypeMatrix, InputError> {
    let bed_path = fileset_path(prefix, "bed");
    let num_individuals = count_records(&fileset_path(prefix, "fam"))?;
    let num_snps = count_records(&fileset_path(prefix, "bim"))?;
    let stride = bytes_per_snp(num_individuals);

    let bed_file = File::open(&bed_path).map_err(io_error(&bed_path))?;
    let found = bed_file.metadata().map_err(io_error(&bed_path))?.len();
    let expected = 3 + num_snps as u64 * stride as u64;
    if found < 3 {
        return Err(InputError::BadMagic(bed_path));
    }

    // The only unsafe block. The file handle is open and read-only.
    let mmap = unsafe { Mmap::map(&bed_file) }.map_err(io_error(&bed_path))?;
    if mmap[..3] != BED_MAGIC {
        return Err(InputError::BadMagic(bed_path));
    }
    if found != expected {
        return Err(InputError::SizeMismatch {
            path: bed_path,
            expected,
            found,
        });
    }

    let mut data = vec![0u8; num_snps * stride];
    for (out_row, bed_row) in data
        .chunks_exact_mut(stride.max(1))
        .zip(mmap[3..].chunks_exact(stride.max(1)))
    {
        transcode_row(bed_row, out_row, num_individuals);
    }

    log::info!(
        "Loaded {}: {} individuals, {} SNPs.",
        bed_path.display(),
        num_individuals,
        num_snps
    );

    // The buffer was sized from the same dimensions, so this cannot fail.
    PackedGenotypeMatrix::from_packed(data, num_snps, num_individuals).map_err(|err| {
        InputError::Parse {
            path: bed_path,
            line: 0,
            message: err.to_string(),
        }
    })
}

/// Rewrites one PLINK row into engine codes. Padding slots stay zero.
fn transcode_row(bed_row: &[u8], out_row: &mut [u8], num_individuals: usize) {
    for individual in 0..num_individuals {
        let byte_index = individual / 4;
        let slot = individual % 4;
        let code = match decode_code(bed_row[byte_index], slot) {
            0b00 => 2,            // Homozygous A1/A1.
            0b10 => 1,            // Heterozygous.
            0b11 => 0,            // Homozygous A2/A2.
            0b01 => MISSING_CODE, // Missing genotype.
            _ => unreachable!(),  // Masking with `& 0b11` makes other values impossible.
        };
        out_row[byte_index] |= code << (slot * 2);
    }
}

/// Number of non-blank lines in a `.fam` or `.bim` file.
fn count_records(path: &Path) -> Result<usize, InputError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut count = 0;
    for line in BufReader::new(file).lines() {
        if !line.map_err(io_error(path))?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Reads one label per line. Blank lines and `#` comments are skipped; `0` and `NA`
/// become `None`.
pub fn read_labels(path: &Path) -> Result<Vec<Option<usize>>, InputError> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut labels = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("NA") {
            labels.push(None);
            continue;
        }
        let value: usize = trimmed.parse().map_err(|_| InputError::Parse {
            path: path.to_path_buf(),
            line: index + 1,
            message: format!("expected a non-negative integer label, found '{trimmed}'"),
        })?;
        labels.push((value > 0).then_some(value));
    }
    Ok(labels)
}
