use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context as _;
use serde::Deserialize;

use crate::matching::{Criterion, ValidationMode};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub fixtures: FixturesConfig,
    #[serde(default)]
    pub validation: Option<ValidationConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let toml =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&toml)
    }

    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        toml.parse()
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.validation
            .as_ref()
            .map_or(ValidationMode::Disabled, ValidationConfig::to_mode)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).context("parse config TOML")
    }
}

#[derive(Debug, Deserialize)]
pub struct FixturesConfig {
    /// Root of the per-endpoint fixture sequences replay reads from.
    pub directory: PathBuf,
}

/// The `[validation]` table. Ignore lists imply their dimension is
/// matched, so `body_ignore = ["timestamp"]` alone turns body matching on.
#[derive(Debug, Default, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub body: bool,
    #[serde(default)]
    pub body_ignore: Vec<String>,
    #[serde(default)]
    pub headers: bool,
    #[serde(default)]
    pub header_ignore: Vec<String>,
}

impl ValidationConfig {
    pub fn to_mode(&self) -> ValidationMode {
        let mut criteria = Vec::new();
        if self.body {
            criteria.push(Criterion::MatchBody);
        }
        if !self.body_ignore.is_empty() {
            criteria.push(Criterion::MatchBodyIgnoring(self.body_ignore.clone()));
        }
        if self.headers {
            criteria.push(Criterion::MatchHeaders);
        }
        if !self.header_ignore.is_empty() {
            criteria.push(Criterion::MatchHeadersIgnoring(self.header_ignore.clone()));
        }

        if criteria.is_empty() {
            ValidationMode::Disabled
        } else {
            ValidationMode::Match(criteria)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}
