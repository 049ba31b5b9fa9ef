use crate::recommend::cluster::DEFAULT_MAX_ITER;
use crate::recommend::MalformedRowPolicy;
use anyhow::{anyhow, Result};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub storage_dir: PathBuf,
    pub seed: u64,
    pub max_iter: usize,
    pub recommendations: usize,
    pub collection: String,
    pub malformed_rows: MalformedRowPolicy,
    pub concurrent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./storage"),
            seed: 0,
            max_iter: DEFAULT_MAX_ITER,
            recommendations: 3,
            collection: "ts_table".to_string(),
            malformed_rows: MalformedRowPolicy::Fail,
            concurrent: true,
        }
    }
}

impl Config {
    /// Reads `SONGREC_*` variables, falling back to defaults when unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        Ok(Config {
            storage_dir: lookup("SONGREC_STORAGE")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            seed: parse(&lookup, "SONGREC_SEED")?.unwrap_or(defaults.seed),
            max_iter: parse(&lookup, "SONGREC_MAX_ITER")?.unwrap_or(defaults.max_iter),
            recommendations: parse(&lookup, "SONGREC_RECOMMENDATIONS")?
                .unwrap_or(defaults.recommendations),
            collection: lookup("SONGREC_COLLECTION").unwrap_or(defaults.collection),
            malformed_rows: parse(&lookup, "SONGREC_MALFORMED_ROWS")?
                .unwrap_or(defaults.malformed_rows),
            concurrent: parse(&lookup, "SONGREC_CONCURRENT")?.unwrap_or(defaults.concurrent),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| anyhow!("invalid value for {}: {:?}, {}", key, value, e))
        })
        .transpose()
}
