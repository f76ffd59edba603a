//! Optional YAML config file.
//!
//! Values here are defaults; anything given on the command line wins, and pattern lists
//! from both places are combined.

use crate::cli::Cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub tail: Option<i64>,
    pub timestamps: bool,
    pub raw: bool,
    pub no_color: bool,
    pub quiet: bool,
    pub max_retries: Option<u32>,
}

/// Get the default config path (~/.config/ktail/config.yml)
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".config").join("ktail").join("config.yml"))
}

impl Config {
    /// Load from `path`, or return defaults if it doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// An explicit `--config` must exist; the default location may be missing.
    pub fn for_cli(cli: &Cli) -> Result<Self> {
        match &cli.config {
            Some(path) => {
                anyhow::ensure!(path.exists(), "Config file {} not found", path.display());
                Self::load(path)
            }
            None => match default_path() {
                Some(path) => Self::load(&path),
                None => Ok(Config::default()),
            },
        }
    }

    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        self.include.extend(cli.patterns.iter().cloned());
        self.exclude.extend(cli.exclude.iter().cloned());
        self.tail = cli.tail.or(self.tail);
        self.max_retries = cli.max_retries.or(self.max_retries);
        self.timestamps |= cli.timestamps;
        self.raw |= cli.raw;
        self.no_color |= cli.no_color;
        self.quiet |= cli.quiet;
        self
    }
}
