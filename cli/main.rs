#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use gnomon_settest::config::RunConfig;
use gnomon_settest::io::{load_plink, read_labels};
use gnomon_settest::{CarrierChiSquare, ExactResult, PermutationResult, SetTest};

#[derive(Args)]
pub struct InputArgs {
    /// PLINK fileset prefix (.bed/.bim/.fam)
    #[arg(value_name = "GENOTYPE_PREFIX")]
    pub genotype_prefix: PathBuf,

    /// One SNP-group label per .bim line; 0 or NA excludes the SNP
    #[arg(long, value_name = "PATH")]
    pub snp_groups: PathBuf,

    /// One phenotype-group label per .fam line
    #[arg(long, value_name = "PATH")]
    pub phenotypes: PathBuf,

    /// Optional TOML run configuration; command-line values take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the result table here instead of stdout
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct PermuteArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Exceedances after which a SNP group stops receiving permutations
    #[arg(long)]
    pub target_exceed: Option<u64>,

    /// Upper bound on the number of permutations
    #[arg(long)]
    pub max_trials: Option<u64>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Permutations evaluated in parallel between two mask updates
    #[arg(long)]
    pub batch_size: Option<u64>,
}

#[derive(Args)]
pub struct ExactArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// SNP groups to test (default: every group)
    #[arg(long = "group", value_name = "G")]
    pub groups: Vec<usize>,

    /// Skip groups with more variant-carrying individuals than this
    #[arg(long)]
    pub max_variant_individuals: Option<usize>,
}

#[derive(Parser)]
#[command(
    name = "gnomon-settest",
    version,
    about = "Set-based association testing over packed genotypes",
    long_about = "Adaptive permutation and exact enumeration tests of SNP groups against \
                 phenotype groups, reading PLINK1 filesets."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Adaptive permutation test of every SNP group
    #[command(about = "Adaptive permutation test with early stopping")]
    Permute(PermuteArgs),

    /// Exact test by full enumeration of label assignments
    #[command(about = "Exact enumeration test of selected SNP groups")]
    Exact(ExactArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = match Cli::parse().command {
        Commands::Permute(args) => run_permute(args),
        Commands::Exact(args) => run_exact(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Labels read from disk, shaped for `SetTest::new`.
struct Design {
    baseline_mask: Vec<bool>,
    snp_groups: Vec<usize>,
    individual_groups: Vec<usize>,
}

fn load_design(input: &InputArgs) -> Result<Design, Box<dyn std::error::Error>> {
    let snp_labels = read_labels(&input.snp_groups)?;
    let baseline_mask = snp_labels.iter().map(Option::is_some).collect();
    let snp_groups = snp_labels.iter().map(|label| label.unwrap_or(0)).collect();

    let individual_groups = read_labels(&input.phenotypes)?
        .into_iter()
        .enumerate()
        .map(|(index, label)| {
            label.ok_or_else(|| {
                format!(
                    "Individual {} in '{}' has no phenotype group. Remove it from the fileset first.",
                    index + 1,
                    input.phenotypes.display()
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Design {
        baseline_mask,
        snp_groups,
        individual_groups,
    })
}

fn load_config(path: Option<&Path>) -> Result<RunConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(RunConfig::load(path)?),
        None => Ok(RunConfig::default()),
    }
}

fn open_output(path: Option<&Path>) -> io::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn run_permute(args: PermuteArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.input.config.as_deref())?;
    let permutation = &mut config.permutation;
    if let Some(value) = args.target_exceed {
        permutation.target_exceed = value;
    }
    if let Some(value) = args.max_trials {
        permutation.max_trials = value;
    }
    if let Some(value) = args.seed {
        permutation.seed = value;
    }
    if let Some(value) = args.batch_size {
        permutation.batch_size = value;
    }
    config.validate()?;

    let matrix = load_plink(&args.input.genotype_prefix)?;
    let view = matrix.view();
    let design = load_design(&args.input)?;
    let mut test = SetTest::new(
        &view,
        design.baseline_mask,
        design.snp_groups,
        design.individual_groups,
        CarrierChiSquare,
    )?;

    let result = test.permutation_test_parallel(&config.permutation);
    let mut out = open_output(args.input.out.as_deref())?;
    write_permutation_table(&mut out, &result)?;
    out.flush()?;
    Ok(())
}

fn run_exact(args: ExactArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.input.config.as_deref())?;
    if let Some(value) = args.max_variant_individuals {
        config.exact.max_variant_individuals = value;
    }
    config.validate()?;

    let matrix = load_plink(&args.input.genotype_prefix)?;
    let view = matrix.view();
    let design = load_design(&args.input)?;
    let mut test = SetTest::new(
        &view,
        design.baseline_mask,
        design.snp_groups,
        design.individual_groups,
        CarrierChiSquare,
    )?;

    let requested: Vec<usize> = if args.groups.is_empty() {
        (1..=test.num_snp_groups()).collect()
    } else {
        args.groups
    };

    let mut tractable = Vec::with_capacity(requested.len());
    for group in requested {
        let variant = test.variant_individual_count(group)?;
        if variant > config.exact.max_variant_individuals {
            log::warn!(
                "Skipping SNP group {group}: {variant} variant-carrying individuals exceed the limit of {}.",
                config.exact.max_variant_individuals
            );
        } else {
            tractable.push(group);
        }
    }

    let result = test.exact_test_parallel(&tractable, config.exact.chunk_size)?;
    let mut out = open_output(args.input.out.as_deref())?;
    write_exact_table(&mut out, &result)?;
    out.flush()?;
    Ok(())
}

fn write_permutation_table(out: &mut dyn Write, result: &PermutationResult) -> io::Result<()> {
    writeln!(out, "group\tstat\tnb_geq\tnb_eq\tnb_perms\tp_value")?;
    for g in 0..result.stat.len() {
        writeln!(
            out,
            "{}",
            [
                (g + 1).to_string(),
                result.stat[g].to_string(),
                result.nb_geq[g].to_string(),
                result.nb_eq[g].to_string(),
                result.nb_perms[g].to_string(),
                result.p_value[g].to_string(),
            ]
            .iter()
            .join("\t")
        )?;
    }
    Ok(())
}

fn write_exact_table(out: &mut dyn Write, result: &ExactResult) -> io::Result<()> {
    writeln!(out, "group\tstat\tp_geq\tp_eq\tp_value")?;
    for i in 0..result.group.len() {
        writeln!(
            out,
            "{}",
            [
                result.group[i].to_string(),
                result.stat[i].to_string(),
                result.p_geq[i].to_string(),
                result.p_eq[i].to_string(),
                result.p_value[i].to_string(),
            ]
            .iter()
            .join("\t")
        )?;
    }
    Ok(())
}
