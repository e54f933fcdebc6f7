use gnomon_settest::config::PermutationConfig;
use gnomon_settest::{CarrierChiSquare, PackedGenotypeMatrix, SetTest, StatisticContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// A sparse random matrix: mostly reference homozygotes, a few carriers.
fn random_matrix(num_snps: usize, num_individuals: usize, seed: u64) -> PackedGenotypeMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<Option<u8>>> = (0..num_snps)
        .map(|_| {
            (0..num_individuals)
                .map(|_| match rng.gen_range(0..20) {
                    0 => None,
                    1..=3 => Some(1),
                    4 => Some(2),
                    _ => Some(0),
                })
                .collect()
        })
        .collect();
    PackedGenotypeMatrix::from_calls(num_individuals, &rows).unwrap()
}

fn case_control(num_individuals: usize) -> Vec<usize> {
    (0..num_individuals)
        .map(|j| if j < num_individuals / 2 { 1 } else { 2 })
        .collect()
}

#[test]
fn batched_runs_are_reproducible_and_thread_independent() {
    let matrix = random_matrix(30, 40, 11);
    let view = matrix.view();
    let snp_groups: Vec<usize> = (0..30).map(|i| i / 5 + 1).collect();
    let mut test = SetTest::new(
        &view,
        vec![true; 30],
        snp_groups,
        case_control(40),
        CarrierChiSquare,
    )
    .unwrap();

    let config = PermutationConfig {
        target_exceed: 5,
        max_trials: 2_000,
        seed: 2024,
        batch_size: 64,
    };
    let first = test.permutation_test_parallel(&config);
    let second = test.permutation_test_parallel(&config);
    assert_eq!(first, second);

    let single_thread = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| test.permutation_test_parallel(&config));
    assert_eq!(first, single_thread);

    for g in 0..6 {
        assert!(first.nb_eq[g] <= first.nb_geq[g]);
        assert!(first.nb_geq[g] <= first.nb_perms[g]);
        assert!(first.nb_perms[g] <= config.max_trials);
        assert!(first.p_value[g] > 0.0 && first.p_value[g] <= 1.0);
    }
}

#[test]
fn sequential_runs_repeat_under_the_same_seed() {
    let matrix = random_matrix(12, 24, 3);
    let view = matrix.view();
    let snp_groups: Vec<usize> = (0..12).map(|i| i % 3 + 1).collect();
    let mut test = SetTest::new(
        &view,
        vec![true; 12],
        snp_groups,
        case_control(24),
        CarrierChiSquare,
    )
    .unwrap();

    let first = test.permutation_test(4, 500, &mut StdRng::seed_from_u64(99));
    let second = test.permutation_test(4, 500, &mut StdRng::seed_from_u64(99));
    assert_eq!(first, second);
}

#[test]
fn saturated_groups_leave_the_selection_for_good() {
    // Two single-SNP groups over 12 individuals. Group 1 ties on every trial, group 2
    // counts label-1 individuals in the first half, which is maximal only under the
    // construction labels.
    let matrix = PackedGenotypeMatrix::from_calls(12, &[vec![Some(1); 12], vec![Some(1); 12]])
        .unwrap();
    let view = matrix.view();
    let history: Mutex<Vec<Vec<usize>>> = Mutex::new(Vec::new());

    let statistic = |ctx: &StatisticContext<'_>, out: &mut [f64]| {
        let total: usize = ctx.active_per_group.iter().sum();
        assert_eq!(total, ctx.rows.len());
        assert_eq!(ctx.snp_groups.len(), ctx.rows.len());
        history.lock().unwrap().push(ctx.active_per_group.to_vec());

        out[0] = 1.0;
        out[1] = ctx.individual_groups[..6]
            .iter()
            .filter(|&&label| label == 1)
            .count() as f64;
    };

    let mut test =
        SetTest::new(&view, vec![true; 2], vec![1, 2], case_control(12), statistic).unwrap();
    let result = test.permutation_test(3, 200, &mut StdRng::seed_from_u64(5));

    assert_eq!(result.stat, vec![1.0, 6.0]);
    assert_eq!(result.nb_perms[0], 3);
    assert_eq!(result.nb_geq[0], 3);
    assert_eq!(result.nb_eq[0], 3);
    assert_eq!(result.nb_perms[1], 200);
    assert!(result.nb_geq[1] < 3);

    let history = history.lock().unwrap().clone();
    assert_eq!(history.len(), 201);
    let retired_at = history
        .iter()
        .position(|active| active[0] == 0)
        .unwrap();
    assert_eq!(retired_at, 4);
    assert!(history[retired_at..].iter().all(|active| active == &[0, 1]));

    // The run puts the design back.
    assert_eq!(test.selection().num_active(), 2);
    assert_eq!(test.individual_groups(), case_control(12).as_slice());
}

#[test]
fn excluded_snps_never_reach_the_statistic() {
    let matrix = random_matrix(6, 16, 8);
    let view = matrix.view();
    let seen: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    let statistic = |ctx: &StatisticContext<'_>, out: &mut [f64]| {
        seen.lock().unwrap().push(ctx.rows.len());
        out.fill(0.0);
    };

    let mut test = SetTest::new(
        &view,
        vec![true, false, true, false, false, true],
        vec![1, 0, 2, 0, 0, 2],
        case_control(16),
        statistic,
    )
    .unwrap();
    let result = test.permutation_test(1_000, 10, &mut StdRng::seed_from_u64(1));

    assert_eq!(result.nb_perms, vec![10, 10]);
    assert!(seen.lock().unwrap().iter().all(|&rows| rows == 3));
}
