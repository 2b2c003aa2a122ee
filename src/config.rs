//! Run configuration, read from the environment by default.

use crate::wellknown::DEFAULT_FRAMEWORK;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// What a resolution failure inside an `@fn` signature does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Abort the run.
    #[default]
    Strict,
    /// Drop the offending function and keep going.
    Permissive,
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            _ => Err(ConfigError::InvalidMode(s.to_owned())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid mode {0:?}, expected `strict` or `permissive`")]
    InvalidMode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Module cache root (`GOMODCACHE`).
    pub mod_cache: Option<PathBuf>,
    /// Go installation root; enables standard library lookups.
    pub goroot: Option<PathBuf>,
    /// Module path of the service framework.
    pub framework: String,
    pub mode: Mode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mod_cache: None,
            goroot: None,
            framework: DEFAULT_FRAMEWORK.to_owned(),
            mode: Mode::Strict,
        }
    }
}

impl Config {
    /// Reads `GOMODCACHE` / `GOPATH` / `HOME`, `GOROOT`,
    /// `SVCGEN_FRAMEWORK` and `SVCGEN_MODE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`] with an injectable variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let mod_cache = var("GOMODCACHE").map(PathBuf::from).or_else(|| {
            let gopath = var("GOPATH")
                .and_then(|p| std::env::split_paths(&p).next())
                .or_else(|| var("HOME").map(|h| PathBuf::from(h).join("go")))?;
            Some(gopath.join("pkg").join("mod"))
        });

        let mode = match var("SVCGEN_MODE") {
            Some(m) => m.parse()?,
            None => Mode::Strict,
        };

        Ok(Self {
            mod_cache,
            goroot: var("GOROOT").map(PathBuf::from),
            framework: var("SVCGEN_FRAMEWORK").unwrap_or_else(|| DEFAULT_FRAMEWORK.to_owned()),
            mode,
        })
    }

    pub fn with_mod_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mod_cache = Some(dir.into());
        self
    }

    pub fn with_goroot(mut self, dir: impl Into<PathBuf>) -> Self {
        self.goroot = Some(dir.into());
        self
    }

    pub fn with_framework(mut self, module: impl Into<String>) -> Self {
        self.framework = module.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}
