//! Run configuration.
//!
//! Defaults are developer-chosen and good for most designs; a TOML file can override
//! any subset of fields, and the command line overrides the file.
//!
//! ```toml
//! [permutation]
//! target_exceed = 100
//! max_trials = 1000000
//! seed = 42
//! batch_size = 1024
//!
//! [exact]
//! max_variant_individuals = 20
//! chunk_size = 4096
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {field} must be at least 1, but was {value}.")]
    MustBePositive { field: &'static str, value: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermutationConfig {
    /// Exceedances after which a SNP group stops receiving permutations.
    pub target_exceed: u64,
    /// Upper bound on the number of permutations.
    pub max_trials: u64,
    /// Seed of the per-trial ChaCha streams.
    pub seed: u64,
    /// Trials evaluated in parallel between two mask updates.
    pub batch_size: u64,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            target_exceed: 100,
            max_trials: 1_000_000,
            seed: 42,
            batch_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExactConfig {
    /// Groups with more variant-carrying individuals than this are not enumerated by
    /// the command-line tool.
    pub max_variant_individuals: usize,
    /// Candidates evaluated per parallel chunk.
    pub chunk_size: usize,
}

impl Default for ExactConfig {
    fn default() -> Self {
        Self {
            max_variant_individuals: 20,
            chunk_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub permutation: PermutationConfig,
    pub exact: ExactConfig,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("permutation.target_exceed", self.permutation.target_exceed)?;
        positive("permutation.batch_size", self.permutation.batch_size)?;
        positive("exact.chunk_size", self.exact.chunk_size as u64)?;
        Ok(())
    }
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_files_keep_defaults() {
        let config = RunConfig::from_toml_str("[permutation]\nmax_trials = 500\n").unwrap();
        assert_eq!(config.permutation.max_trials, 500);
        assert_eq!(config.permutation.target_exceed, 100);
        assert_eq!(config.exact, ExactConfig::default());
    }

    #[test]
    fn zero_target_is_rejected() {
        let err = RunConfig::from_toml_str("[permutation]\ntarget_exceed = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MustBePositive {
                field: "permutation.target_exceed",
                value: 0
            }
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            RunConfig::from_toml_str("[exact]\nmax_individuals = 3\n"),
            Err(ConfigError::TomlParseError(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[exact]\nmax_variant_individuals = 12\nchunk_size = 64").unwrap();
        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.exact.max_variant_individuals, 12);
        assert_eq!(config.exact.chunk_size, 64);
        assert_eq!(config.permutation, PermutationConfig::default());
    }
}
