use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::tempdir;

/// Six individuals, two SNPs. SNP 0: individuals 0, 1, 2 heterozygous. SNP 1:
/// individual 3 heterozygous. Everything else is A2/A2.
fn write_fileset(dir: &Path) -> PathBuf {
    let prefix = dir.join("cohort");
    let fam: String = (0..6).map(|i| format!("FAM{i} IND{i} 0 0 1 -9\n")).collect();
    fs::write(dir.join("cohort.fam"), fam).expect("write fam");
    fs::write(dir.join("cohort.bim"), "1 var0 0 100 T C\n1 var1 0 200 G A\n")
        .expect("write bim");
    let bed = [
        0x6c,
        0x1b,
        0x01,
        0b11_10_10_10,
        0b0000_1111,
        0b10_11_11_11,
        0b0000_1111,
    ];
    fs::write(dir.join("cohort.bed"), bed).expect("write bed");
    fs::write(dir.join("snps.txt"), "1\n2\n").expect("write snp groups");
    fs::write(dir.join("pheno.txt"), "1\n1\n1\n2\n2\n2\n").expect("write phenotypes");
    prefix
}

fn run(dir: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_gnomon-settest");
    Command::new(exe)
        .current_dir(dir)
        .env("RUST_LOG", "info")
        .args(args)
        .output()
        .expect("run gnomon-settest cli")
}

fn rows(table: &str) -> Vec<Vec<String>> {
    table
        .lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

#[test]
fn permute_writes_one_row_per_group() {
    let tmp = tempdir().expect("temporary directory");
    let prefix = write_fileset(tmp.path());
    fs::write(
        tmp.path().join("run.toml"),
        "[permutation]\nmax_trials = 40\nbatch_size = 8\n",
    )
    .expect("write config");

    let output = run(
        tmp.path(),
        &[
            "permute",
            prefix.to_str().expect("path str"),
            "--snp-groups",
            "snps.txt",
            "--phenotypes",
            "pheno.txt",
            "--config",
            "run.toml",
            "--seed",
            "3",
            "--out",
            "permute.tsv",
        ],
    );
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let table = fs::read_to_string(tmp.path().join("permute.tsv")).expect("read output");
    let rows = rows(&table);
    assert_eq!(
        rows[0],
        vec!["group", "stat", "nb_geq", "nb_eq", "nb_perms", "p_value"]
    );
    assert_eq!(rows.len(), 3);
    for (index, row) in rows[1..].iter().enumerate() {
        assert_eq!(row.len(), 6);
        assert_eq!(row[0], (index + 1).to_string());
        let nb_perms: u64 = row[4].parse().expect("nb_perms");
        assert!(nb_perms <= 40);
        let p: f64 = row[5].parse().expect("p_value");
        assert!(p > 0.0 && p <= 1.0);
    }
    // All three carriers of group 1 are cases: a perfectly separated table.
    assert_eq!(rows[1][1], "6");
}

#[test]
fn exact_skips_groups_over_the_variant_limit() {
    let tmp = tempdir().expect("temporary directory");
    let prefix = write_fileset(tmp.path());

    let output = run(
        tmp.path(),
        &[
            "exact",
            prefix.to_str().expect("path str"),
            "--snp-groups",
            "snps.txt",
            "--phenotypes",
            "pheno.txt",
            "--group",
            "1",
            "--group",
            "2",
            "--max-variant-individuals",
            "2",
        ],
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "CLI failed: {stderr}");
    assert!(
        stderr.contains("Skipping SNP group 1"),
        "missing skip warning in: {stderr}"
    );

    let rows = rows(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(rows[0], vec!["group", "stat", "p_geq", "p_eq", "p_value"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], "2");
    // One carrier: every placement gives the same table.
    let p_geq: f64 = rows[1][2].parse().expect("p_geq");
    let p_value: f64 = rows[1][4].parse().expect("p_value");
    assert!((p_geq - 1.0).abs() < 1e-12);
    assert!((p_value - 0.5).abs() < 1e-12);
}

#[test]
fn exact_reports_the_separated_group_with_positive_probability() {
    let tmp = tempdir().expect("temporary directory");
    let prefix = write_fileset(tmp.path());

    let output = run(
        tmp.path(),
        &[
            "exact",
            prefix.to_str().expect("path str"),
            "--snp-groups",
            "snps.txt",
            "--phenotypes",
            "pheno.txt",
            "--group",
            "1",
        ],
    );
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let rows = rows(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(rows.len(), 2);
    // Three carriers over 3 + 3 slots: the two fully separated splits weigh 0.1.
    let p_geq: f64 = rows[1][2].parse().expect("p_geq");
    let p_eq: f64 = rows[1][3].parse().expect("p_eq");
    assert!((p_geq - 0.1).abs() < 1e-12);
    assert!((p_eq - 0.1).abs() < 1e-12);
}

#[test]
fn missing_phenotype_fails_with_a_message() {
    let tmp = tempdir().expect("temporary directory");
    let prefix = write_fileset(tmp.path());
    fs::write(tmp.path().join("pheno.txt"), "1\n1\nNA\n2\n2\n2\n").expect("write phenotypes");

    let output = run(
        tmp.path(),
        &[
            "permute",
            prefix.to_str().expect("path str"),
            "--snp-groups",
            "snps.txt",
            "--phenotypes",
            "pheno.txt",
        ],
    );
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Individual 3") && stderr.contains("has no phenotype group"),
        "unexpected error output: {stderr}"
    );
}
