use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::cli::Cli;
use crate::engine::config::{AlertsConfig, RawAlertsConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid alerts config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where metric rounds are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "-" => InputSource::Stdin,
            path => InputSource::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub alerts_config_path: PathBuf,
    pub input: InputSource,
    pub print_metrics: bool,
}

impl Config {
    /// Build the runtime config from the environment, with CLI flags taking
    /// precedence over environment variables.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_sources(cli, |key| env::var(key).ok())
    }

    fn from_sources(
        cli: &Cli,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let alerts_config_path = cli
            .alerts_config
            .clone()
            .or_else(|| lookup("ALERTS_CONFIG_PATH").map(PathBuf::from))
            .ok_or(ConfigError::Missing("ALERTS_CONFIG_PATH"))?;

        let input = cli
            .input
            .clone()
            .or_else(|| lookup("ALERTER_INPUT"))
            .map(|raw| InputSource::parse(&raw))
            .unwrap_or(InputSource::Stdin);

        Ok(Self {
            alerts_config_path,
            input,
            print_metrics: cli.print_metrics,
        })
    }
}

/// Read and type the JSON alerts configuration at `path`.
pub fn load_alerts_config(path: &Path) -> Result<AlertsConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_alerts_config(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        "Loaded alerts config for {} chain(s) from {}",
        config.chain_ids().count(),
        path.display()
    );
    Ok(config)
}

pub fn parse_alerts_config(raw: &str) -> Result<AlertsConfig, serde_json::Error> {
    let raw: RawAlertsConfig = serde_json::from_str(raw)?;
    Ok(AlertsConfig::from_raw(&raw))
}
