#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod classify;
pub mod combinations;
pub mod config;
pub mod design;
pub mod exact;
pub mod genotypes;
pub mod io;
pub mod labels;
pub mod permutation;
pub mod selection;
pub mod statistic;

pub use design::{SetTest, SetTestError};
pub use exact::ExactResult;
pub use genotypes::{PackedGenotypeMatrix, PackedGenotypes};
pub use permutation::PermutationResult;
pub use statistic::{CarrierChiSquare, SetStatistic, StatisticContext};
