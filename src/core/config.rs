//! Pipeline configuration from YAML

use crate::core::{
    context::{validate_namespace_name, validate_release_name, Context, ValueKind},
    error::ConfigError,
    pipeline::PipelineRun,
    step::{
        ChartRelease, Delay, ManifestSpec, ProvisioningStep, RetryPolicy, ScriptInvocation,
        SecretSpec, StepAction,
    },
};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CHART_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 600;

/// Longest delay a retry policy may ask for between attempts
pub const MAX_RETRY_INTERVAL_SECS: u64 = 3600;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Context keys: defaults, environment sources and validation kind
    #[serde(default)]
    pub context: BTreeMap<String, ContextEntry>,

    /// Tools required in addition to those implied by the steps
    #[serde(default)]
    pub tools: Vec<String>,

    /// Default readiness polling budget
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// Declaration of a single context key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextEntry {
    /// Value used when neither the environment nor the CLI supplies one
    #[serde(default)]
    pub default: Option<String>,

    /// Environment variable that overrides the default
    #[serde(default)]
    pub env: Option<String>,

    #[serde(default)]
    pub kind: ValueKind,

    #[serde(default)]
    pub required: bool,
}

/// Readiness polling budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadinessConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval_secs() -> u64 {
    2
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl ReadinessConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_secs(self.interval_secs))
    }
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Unique step name
    pub name: String,

    #[serde(flatten)]
    pub action: ActionConfig,

    /// Readiness retry policy (overrides the pipeline default)
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

/// Action-specific step fields, tagged by `action`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionConfig {
    EnsureNamespace {
        namespace: String,
    },
    ApplyManifest {
        /// File path or URL
        source: String,
        #[serde(default)]
        namespace: Option<String>,
    },
    InstallOrUpgradeChart {
        release: String,
        chart: String,
        namespace: String,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        values: BTreeMap<String, Value>,
        #[serde(default)]
        values_files: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    CreateOrUpdateSecret {
        secret: String,
        namespace: String,
        data: BTreeMap<String, String>,
    },
    WaitForReady {
        deployment: String,
        namespace: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    RunExternalScript {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        working_dir: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl ActionConfig {
    fn is_readiness_wait(&self) -> bool {
        matches!(
            self,
            ActionConfig::EnsureNamespace { .. } | ActionConfig::WaitForReady { .. }
        )
    }
}

/// Retry policy as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Cap for exponential backoff
    #[serde(default)]
    pub max_interval_secs: Option<u64>,

    #[serde(default)]
    pub multiplier: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.interval_secs > MAX_RETRY_INTERVAL_SECS {
            return Err(format!("interval_secs must be at most {}", MAX_RETRY_INTERVAL_SECS));
        }
        if let Some(max) = self.max_interval_secs {
            if max > MAX_RETRY_INTERVAL_SECS {
                return Err(format!("max_interval_secs must be at most {}", MAX_RETRY_INTERVAL_SECS));
            }
        }
        if let Some(multiplier) = self.multiplier {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(format!("multiplier must be a finite number of at least 1.0, got {}", multiplier));
            }
        }
        Ok(())
    }

    fn policy(&self) -> RetryPolicy {
        let interval = Duration::from_secs(self.interval_secs);
        let delay = match self.backoff {
            BackoffKind::Fixed => Delay::Fixed(interval),
            BackoffKind::Exponential => Delay::Backoff {
                initial: interval,
                max: Duration::from_secs(self.max_interval_secs.unwrap_or(60)),
                multiplier: self.multiplier.unwrap_or(2.0),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay,
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation that does not depend on context values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::invalid("steps", "pipeline has no steps"));
        }

        if self.readiness.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "readiness.max_attempts",
                "must be at least 1",
            ));
        }
        if self.readiness.interval_secs > MAX_RETRY_INTERVAL_SECS {
            return Err(ConfigError::invalid(
                "readiness.interval_secs",
                format!("must be at most {}", MAX_RETRY_INTERVAL_SECS),
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(ConfigError::invalid("steps", "step name must not be empty"));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(ConfigError::invalid(
                    "steps",
                    format!("duplicate step name '{}'", step.name),
                ));
            }

            if let Some(retry) = &step.retry {
                let key = format!("steps.{}.retry", step.name);
                if !step.action.is_readiness_wait() {
                    return Err(ConfigError::invalid(
                        key,
                        "retry policy only applies to readiness-waiting steps",
                    ));
                }
                retry.validate().map_err(|reason| ConfigError::invalid(key, reason))?;
            }
        }

        Ok(())
    }

    /// Render every step against a validated context
    ///
    /// Fails if a placeholder cannot be resolved or a rendered name breaks the
    /// cluster's naming rules. No external call is made.
    pub fn build_run(&self, context: Context) -> Result<PipelineRun, ConfigError> {
        let steps = self
            .steps
            .iter()
            .map(|step| self.render_step(step, &context))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tools = Vec::with_capacity(self.tools.len());
        for (i, tool) in self.tools.iter().enumerate() {
            tools.push(context.render_strict(&format!("tools[{}]", i), tool)?);
        }

        Ok(PipelineRun::new(self.name.clone(), steps, context, tools))
    }

    fn render_step(&self, step: &StepConfig, ctx: &Context) -> Result<ProvisioningStep, ConfigError> {
        let field = |name: &str| format!("steps.{}.{}", step.name, name);
        let render = |name: &str, value: &str| ctx.render_strict(&field(name), value);
        let namespace = |value: &str| -> Result<String, ConfigError> {
            let rendered = render("namespace", value)?;
            validate_namespace_name(&rendered)
                .map_err(|reason| ConfigError::invalid(field("namespace"), reason))?;
            Ok(rendered)
        };

        let action = match &step.action {
            ActionConfig::EnsureNamespace { namespace: ns } => StepAction::EnsureNamespace {
                namespace: namespace(ns)?,
            },
            ActionConfig::ApplyManifest {
                source,
                namespace: ns,
            } => StepAction::ApplyManifest(ManifestSpec {
                source: render("source", source)?,
                namespace: ns.as_deref().map(namespace).transpose()?,
            }),
            ActionConfig::InstallOrUpgradeChart {
                release,
                chart,
                namespace: ns,
                version,
                values,
                values_files,
                timeout_secs,
            } => {
                let release = render("release", release)?;
                validate_release_name(&release)
                    .map_err(|reason| ConfigError::invalid(field("release"), reason))?;

                let mut rendered_values = BTreeMap::new();
                for (key, value) in values {
                    let value_field = format!("values.{}", key);
                    let raw = scalar_to_string(value)
                        .ok_or_else(|| ConfigError::invalid(field(&value_field), "value must be a scalar"))?;
                    rendered_values.insert(key.clone(), render(&value_field, &raw)?);
                }

                StepAction::InstallOrUpgradeChart(ChartRelease {
                    release,
                    chart: render("chart", chart)?,
                    namespace: namespace(ns)?,
                    version: version.as_deref().map(|v| render("version", v)).transpose()?,
                    values: rendered_values,
                    values_files: values_files
                        .iter()
                        .map(|f| render("values_files", f))
                        .collect::<Result<_, _>>()?,
                    timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_CHART_TIMEOUT_SECS)),
                })
            }
            ActionConfig::CreateOrUpdateSecret {
                secret,
                namespace: ns,
                data,
            } => {
                if data.is_empty() {
                    return Err(ConfigError::invalid(field("data"), "secret payload is empty"));
                }
                let mut payload = BTreeMap::new();
                for (key, value) in data {
                    let rendered = render(&format!("data.{}", key), value)?;
                    if rendered.is_empty() {
                        return Err(ConfigError::invalid(
                            field(&format!("data.{}", key)),
                            "secret value must not be empty",
                        ));
                    }
                    payload.insert(key.clone(), rendered);
                }
                StepAction::CreateOrUpdateSecret(SecretSpec {
                    name: render("secret", secret)?,
                    namespace: namespace(ns)?,
                    data: payload,
                })
            }
            ActionConfig::WaitForReady {
                deployment,
                namespace: ns,
                timeout_secs,
            } => StepAction::WaitForReady {
                deployment: render("deployment", deployment)?,
                namespace: namespace(ns)?,
                timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS)),
            },
            ActionConfig::RunExternalScript {
                command,
                args,
                env,
                working_dir,
                timeout_secs,
            } => StepAction::RunExternalScript(ScriptInvocation {
                command: render("command", command)?,
                args: args
                    .iter()
                    .map(|a| render("args", a))
                    .collect::<Result<_, _>>()?,
                env: env
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), render(&format!("env.{}", k), v)?)))
                    .collect::<Result<_, ConfigError>>()?,
                working_dir: working_dir
                    .as_deref()
                    .map(|d| render("working_dir", d))
                    .transpose()?,
                timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_SCRIPT_TIMEOUT_SECS)),
            }),
        };

        let retry = match &step.retry {
            Some(retry) => Some(retry.policy()),
            None if action.is_readiness_wait() => Some(self.readiness.policy()),
            None => None,
        };

        Ok(ProvisioningStep {
            name: step.name.clone(),
            action,
            retry,
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some("null".to_string()),
        _ => None,
    }
}
