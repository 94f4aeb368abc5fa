//! CLI command definitions

use crate::core::Overrides;
use clap::Args;

/// Pipeline file and context sources shared by every command
#[derive(Debug, Args, Clone)]
pub struct ContextArgs {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Target namespace (sets the `namespace` context key)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Release name (sets the `release` context key)
    #[arg(short, long)]
    pub release: Option<String>,

    /// Context overrides (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Read credentials from this environment variable instead of their defaults
    #[arg(long)]
    pub credential_env: Option<String>,

    /// Additional KEY=VALUE file consulted after the process environment
    #[arg(long)]
    pub env_file: Option<String>,
}

impl ContextArgs {
    /// Collect command-line overrides; `--set` wins over the named flags
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            credential_env: self.credential_env.clone(),
            ..Default::default()
        };
        if let Some(namespace) = &self.namespace {
            overrides = overrides.set("namespace", namespace);
        }
        if let Some(release) = &self.release {
            overrides = overrides.set("release", release);
        }
        for (key, value) in &self.set {
            overrides = overrides.set(key, value);
        }
        overrides
    }
}

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub context: ContextArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the resolved plan
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    #[command(flatten)]
    pub context: ContextArgs,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 || parts[0].is_empty() {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
