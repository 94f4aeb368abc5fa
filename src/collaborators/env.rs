//! Environment and secret sources
//!
//! Values are looked up once, while the run context is resolved. Nothing
//! downstream of [`crate::core::Context`] reads the process environment.

use anyhow::{Context as _, Result};
use std::collections::HashMap;
use std::path::Path;

/// Source of named string values
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed set of values
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    values: HashMap<String, String>,
}

impl MapEnv {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Load `KEY=VALUE` lines from a file
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read env file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid env file {}", path.display()))
    }

    /// Parse `KEY=VALUE` lines
    ///
    /// Blank lines and `#` comments are skipped, a leading `export ` is
    /// accepted and one level of matching quotes is stripped from values.
    pub fn parse(content: &str) -> Result<Self> {
        let mut values = HashMap::new();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("line {}: expected KEY=VALUE", lineno + 1))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("line {}: empty key", lineno + 1);
            }

            values.insert(key.to_string(), unquote(value.trim()).to_string());
        }

        Ok(Self { values })
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Consults sources in order; the first hit wins
#[derive(Default)]
pub struct ChainedEnv {
    sources: Vec<Box<dyn EnvSource>>,
}

impl ChainedEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: EnvSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl EnvSource for ChainedEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.sources.iter().find_map(|s| s.var(name))
    }
}
