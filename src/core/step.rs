//! Step domain model

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// A single provisioning step, fully rendered against the run context
#[derive(Debug, Clone)]
pub struct ProvisioningStep {
    /// Unique step name within the run
    pub name: String,

    /// What the step does
    pub action: StepAction,

    /// Readiness retry policy (readiness-waiting actions only)
    pub retry: Option<RetryPolicy>,
}

/// The action a step performs
///
/// Every variant is expressed as "ensure desired state" so executing it more
/// than once converges to the same result.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    EnsureNamespace { namespace: String },
    ApplyManifest(ManifestSpec),
    InstallOrUpgradeChart(ChartRelease),
    CreateOrUpdateSecret(SecretSpec),
    WaitForReady {
        deployment: String,
        namespace: String,
        timeout: Duration,
    },
    RunExternalScript(ScriptInvocation),
}

/// Discriminant of [`StepAction`], used in reports and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    EnsureNamespace,
    ApplyManifest,
    InstallOrUpgradeChart,
    CreateOrUpdateSecret,
    WaitForReady,
    RunExternalScript,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::EnsureNamespace => "ensure_namespace",
            ActionKind::ApplyManifest => "apply_manifest",
            ActionKind::InstallOrUpgradeChart => "install_or_upgrade_chart",
            ActionKind::CreateOrUpdateSecret => "create_or_update_secret",
            ActionKind::WaitForReady => "wait_for_ready",
            ActionKind::RunExternalScript => "run_external_script",
        };
        f.write_str(s)
    }
}

impl StepAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            StepAction::EnsureNamespace { .. } => ActionKind::EnsureNamespace,
            StepAction::ApplyManifest(_) => ActionKind::ApplyManifest,
            StepAction::InstallOrUpgradeChart(_) => ActionKind::InstallOrUpgradeChart,
            StepAction::CreateOrUpdateSecret(_) => ActionKind::CreateOrUpdateSecret,
            StepAction::WaitForReady { .. } => ActionKind::WaitForReady,
            StepAction::RunExternalScript(_) => ActionKind::RunExternalScript,
        }
    }

    /// Whether the action blocks on a readiness condition (and may carry a retry policy)
    pub fn is_readiness_wait(&self) -> bool {
        matches!(
            self,
            StepAction::EnsureNamespace { .. } | StepAction::WaitForReady { .. }
        )
    }

    /// External tools this action shells out to
    pub fn required_tools(&self) -> Vec<String> {
        match self {
            StepAction::InstallOrUpgradeChart(_) => vec!["helm".to_string()],
            StepAction::RunExternalScript(script) => {
                // Paths are checked when the script runs, not on PATH
                if Path::new(&script.command).components().count() == 1 {
                    vec![script.command.clone()]
                } else {
                    vec![]
                }
            }
            _ => vec!["kubectl".to_string()],
        }
    }

    /// One-line, secret-free description of the target
    pub fn describe(&self) -> String {
        match self {
            StepAction::EnsureNamespace { namespace } => format!("namespace/{}", namespace),
            StepAction::ApplyManifest(m) => match &m.namespace {
                Some(ns) => format!("manifest {} -n {}", m.source, ns),
                None => format!("manifest {}", m.source),
            },
            StepAction::InstallOrUpgradeChart(c) => {
                format!("release {} ({}) -n {}", c.release, c.chart, c.namespace)
            }
            StepAction::CreateOrUpdateSecret(s) => {
                let keys: Vec<&str> = s.data.keys().map(String::as_str).collect();
                format!("secret/{} -n {} [{}]", s.name, s.namespace, keys.join(", "))
            }
            StepAction::WaitForReady {
                deployment,
                namespace,
                timeout,
            } => format!(
                "deployment/{} -n {} (timeout {}s)",
                deployment,
                namespace,
                timeout.as_secs()
            ),
            StepAction::RunExternalScript(s) => {
                if s.args.is_empty() {
                    s.command.clone()
                } else {
                    format!("{} {}", s.command, s.args.join(" "))
                }
            }
        }
    }
}

/// A manifest to apply declaratively
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSpec {
    /// File path or URL
    pub source: String,
    pub namespace: Option<String>,
}

/// A Helm release to install or upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRelease {
    pub release: String,
    /// Chart reference (repo/name, OCI URL or local path)
    pub chart: String,
    pub namespace: String,
    pub version: Option<String>,
    /// `--set` overrides
    pub values: BTreeMap<String, String>,
    /// `--values` files
    pub values_files: Vec<String>,
    /// How long the install may block
    pub timeout: Duration,
}

/// Desired state of an opaque secret
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
}

impl fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&String> = self.data.keys().collect();
        f.debug_struct("SecretSpec")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("keys", &keys)
            .finish()
    }
}

/// An external command run as a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInvocation {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<String>,
    pub timeout: Duration,
}

/// Delay between readiness attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delay {
    Fixed(Duration),
    Backoff {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// Bounded retry policy for readiness-waiting actions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempt ceiling (at least 1)
    pub max_attempts: u32,
    pub delay: Delay,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay: Delay::Fixed(Duration::from_secs(2)),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            delay: Delay::Fixed(interval),
        }
    }

    /// Delay to sleep after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.delay {
            Delay::Fixed(interval) => interval,
            Delay::Backoff {
                initial,
                max,
                multiplier,
            } => {
                let exp = attempt.saturating_sub(1).min(32) as i32;
                let secs = initial.as_secs_f64() * multiplier.powi(exp);
                Duration::try_from_secs_f64(secs.min(max.as_secs_f64())).unwrap_or(max)
            }
        }
    }

    /// Upper bound on the time spent sleeping between attempts
    pub fn ceiling(&self) -> Duration {
        (1..self.max_attempts)
            .map(|a| self.delay_after(a))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
