use gnomon_settest::config::PermutationConfig;
use gnomon_settest::io::{load_plink, read_labels};
use gnomon_settest::{CarrierChiSquare, SetTest};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes a 6-individual, 3-SNP fileset. All PLINK codes are 11 (A2/A2) except for
/// a few heterozygotes (10) in the first SNP and one missing call (01) in the third.
fn write_fileset(dir: &Path) -> PathBuf {
    let prefix = dir.join("cohort");
    let fam: String = (0..6).map(|i| format!("FAM{i} IND{i} 0 0 1 -9\n")).collect();
    let bim: String = (0..3)
        .map(|i| format!("7 var{i} 0 {} T C\n", 5000 + i))
        .collect();
    fs::write(prefix.with_extension("fam"), fam).unwrap();
    fs::write(prefix.with_extension("bim"), bim).unwrap();

    let bed = [
        0x6c,
        0x1b,
        0x01,
        // SNP 0: individuals 0, 1, 2 heterozygous.
        0b11_10_10_10,
        0b0000_1111,
        // SNP 1: all A2/A2.
        0b11_11_11_11,
        0b0000_1111,
        // SNP 2: individual 5 missing.
        0b11_11_11_11,
        0b0000_0111,
    ];
    fs::write(prefix.with_extension("bed"), bed).unwrap();
    prefix
}

#[test]
fn fileset_and_label_files_drive_a_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = write_fileset(dir.path());
    fs::write(dir.path().join("snps.txt"), "1\nNA\n1\n").unwrap();
    fs::write(dir.path().join("pheno.txt"), "# case/control\n1\n1\n1\n2\n2\n2\n").unwrap();

    let matrix = load_plink(&prefix).unwrap();
    assert_eq!(matrix.num_snps(), 3);
    assert_eq!(matrix.num_individuals(), 6);
    let view = matrix.view();
    assert_eq!(view.code(0, 0), 1);
    assert_eq!(view.code(1, 4), 0);
    assert_eq!(view.code(2, 5), 3);

    let snp_labels = read_labels(&dir.path().join("snps.txt")).unwrap();
    let baseline: Vec<bool> = snp_labels.iter().map(Option::is_some).collect();
    let snp_groups: Vec<usize> = snp_labels.iter().map(|l| l.unwrap_or(0)).collect();
    let phenotypes: Vec<usize> = read_labels(&dir.path().join("pheno.txt"))
        .unwrap()
        .into_iter()
        .map(Option::unwrap)
        .collect();

    let mut test =
        SetTest::new(&view, baseline, snp_groups, phenotypes, CarrierChiSquare).unwrap();
    assert_eq!(test.selection().active_snps(), &[0, 2]);

    // All carriers are cases: the observed table is perfectly separated.
    let result = test.permutation_test_parallel(&PermutationConfig {
        target_exceed: 10,
        max_trials: 400,
        seed: 7,
        batch_size: 50,
    });
    assert_eq!(result.stat, vec![6.0]);
    assert!(result.nb_perms[0] > 0);
    assert!(result.p_value[0] > 0.0 && result.p_value[0] <= 1.0);

    let exact = test.exact_test(&[1]).unwrap();
    // Only the two fully separated splits are as extreme; together they weigh 0.1.
    assert!((exact.p_geq[0] - 0.1).abs() < 1e-12);
    assert!((exact.p_eq[0] - 0.1).abs() < 1e-12);
}
