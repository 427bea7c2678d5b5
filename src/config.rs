//! Run configuration for the demo programs.
//!
//! Values come from the environment of the launching process. Rank 0's configuration is then
//! broadcast, so every worker passes identical arguments to collective calls.

use crate::error::{Error, Result};
use crate::group::{Communicator, CommunicatorExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const OUTPUT_ENV: &str = "PARIO_OUTPUT";
pub const DATASET_ENV: &str = "PARIO_DATASET";
pub const WORKERS_ENV: &str = "PARIO_WORKERS";
pub const ELEMENTS_PER_RANK_ENV: &str = "PARIO_ELEMENTS_PER_RANK";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// File the run writes.
    pub output: PathBuf,
    /// Name of the dataset inside the output file.
    pub dataset: String,
    /// Number of workers in the group.
    pub workers: usize,
    /// Elements each worker contributes, for runs with uniform contributions.
    pub elements_per_rank: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("parallel_out.pario"),
            dataset: "ranks".to_string(),
            workers: 4,
            elements_per_rank: 1,
        }
    }
}

impl RunConfig {
    /// Defaults overridden by the `PARIO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields with the values `lookup` finds for the `PARIO_*` keys.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(output) = lookup(OUTPUT_ENV) {
            self.output = PathBuf::from(output);
        }
        if let Some(dataset) = lookup(DATASET_ENV) {
            self.dataset = dataset;
        }
        if let Some(workers) = lookup(WORKERS_ENV) {
            self.workers = parse(WORKERS_ENV, &workers)?;
        }
        if let Some(elements) = lookup(ELEMENTS_PER_RANK_ENV) {
            self.elements_per_rank = parse(ELEMENTS_PER_RANK_ENV, &elements)?;
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig(format!("{WORKERS_ENV} must be at least 1")));
        }
        if self.dataset.is_empty() {
            return Err(Error::InvalidConfig(format!("{DATASET_ENV} must not be empty")));
        }
        Ok(self)
    }

    /// Adopt rank 0's configuration on every worker. This is a collective operation.
    pub fn agree<C: Communicator + ?Sized>(&self, comm: &C) -> Result<Self> {
        Ok(comm.broadcast(self, 0)?)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{key}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::LocalGroup;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = RunConfig::default()
            .with_overrides(lookup(&[
                (OUTPUT_ENV, "stuff.pario"),
                (WORKERS_ENV, " 8 "),
                (ELEMENTS_PER_RANK_ENV, "1000"),
            ]))
            .unwrap();
        assert_eq!(config.output, PathBuf::from("stuff.pario"));
        assert_eq!(config.dataset, "ranks");
        assert_eq!(config.workers, 8);
        assert_eq!(config.elements_per_rank, 1000);
    }

    #[test]
    fn malformed_numbers_are_configuration_errors() {
        let err = RunConfig::default()
            .with_overrides(lookup(&[(ELEMENTS_PER_RANK_ENV, "lots")]))
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
        assert!(RunConfig::default()
            .with_overrides(lookup(&[(WORKERS_ENV, "0")]))
            .is_err());
    }

    #[test]
    fn workers_adopt_rank_zero_config() {
        let configs = LocalGroup::run(3, |comm| {
            let mine = RunConfig {
                elements_per_rank: comm.rank() + 10,
                ..RunConfig::default()
            };
            mine.agree(&comm).unwrap()
        });
        assert!(configs.iter().all(|c| c.elements_per_rank == 10));
    }
}
