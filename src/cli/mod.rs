//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{PlanCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Readiness-gated cluster provisioning
#[derive(Debug, Parser, Clone)]
#[command(name = "provision")]
#[command(version = "0.1.0")]
#[command(about = "Provision a Kubernetes stack from an ordered, idempotent pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the kubectl executable
    #[arg(long, global = true, default_value = "kubectl")]
    pub kubectl: String,

    /// Path to the helm executable
    #[arg(long, global = true, default_value = "helm")]
    pub helm: String,

    /// Kubeconfig passed to kubectl and helm
    #[arg(long, global = true, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Seconds a single kubectl call may take before it is killed
    #[arg(long, global = true, default_value_t = 30)]
    pub request_timeout: u64,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a provisioning pipeline
    Run(RunCommand),

    /// Validate a pipeline file and its context without touching the cluster
    Validate(ValidateCommand),

    /// Print the resolved steps in order
    Plan(PlanCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
