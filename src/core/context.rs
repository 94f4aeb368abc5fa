//! Run context - resolved, validated configuration values
//!
//! A [`Context`] is built exactly once per invocation by merging the pipeline
//! file's defaults, the environment and CLI overrides, and then validating the
//! result. It is immutable afterwards and is the only place steps read
//! configuration from.

use crate::collaborators::EnvSource;
use crate::core::config::ContextEntry;
use crate::core::error::ConfigError;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

/// How a context value is interpreted during validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Free-form string
    #[default]
    Plain,
    /// Kubernetes namespace name (RFC 1123 label)
    Namespace,
    /// Helm release name
    ReleaseName,
    /// Secret material; must be non-empty and is never printed
    Credential,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Explicit key=value overrides, highest precedence
    pub values: BTreeMap<String, String>,

    /// Environment variable every credential key should be read from
    pub credential_env: Option<String>,
}

impl Overrides {
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// Merge defaults < environment < overrides into a raw value map
///
/// Keys present in `overrides` but not declared in the schema are kept so
/// they can be referenced from step templates.
pub fn resolve(
    schema: &BTreeMap<String, ContextEntry>,
    env: &dyn EnvSource,
    overrides: &Overrides,
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();

    for (key, entry) in schema {
        if let Some(default) = &entry.default {
            values.insert(key.clone(), default.clone());
        }

        let env_name = match (&overrides.credential_env, entry.kind) {
            (Some(var), ValueKind::Credential) => Some(var.as_str()),
            _ => entry.env.as_deref(),
        };
        if let Some(value) = env_name.and_then(|name| env.var(name)) {
            values.insert(key.clone(), value);
        }
    }

    for (key, value) in &overrides.values {
        values.insert(key.clone(), value.clone());
    }

    values
}

/// Validated, immutable configuration for one pipeline run
#[derive(Clone, Default)]
pub struct Context {
    values: BTreeMap<String, String>,
    credentials: BTreeSet<String>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("values", &self.masked()).finish()
    }
}

impl Context {
    /// Validate raw values against the schema and freeze them
    ///
    /// Performs no I/O. Schema keys are checked in sorted order so the
    /// reported error is deterministic.
    pub fn validate(
        schema: &BTreeMap<String, ContextEntry>,
        raw: BTreeMap<String, String>,
    ) -> Result<Context, ConfigError> {
        let mut credentials = BTreeSet::new();

        for (key, entry) in schema {
            let value = match raw.get(key) {
                Some(value) => value,
                None if entry.required || entry.kind == ValueKind::Credential => {
                    return Err(ConfigError::MissingConfig(key.clone()));
                }
                None => continue,
            };

            if value.trim().is_empty() && (entry.required || entry.kind != ValueKind::Plain) {
                return Err(ConfigError::invalid(key, "must not be empty"));
            }

            match entry.kind {
                ValueKind::Plain => {}
                ValueKind::Namespace => {
                    validate_namespace_name(value).map_err(|reason| ConfigError::invalid(key, reason))?
                }
                ValueKind::ReleaseName => {
                    validate_release_name(value).map_err(|reason| ConfigError::invalid(key, reason))?
                }
                ValueKind::Credential => {
                    credentials.insert(key.clone());
                }
            }
        }

        Ok(Context {
            values: raw,
            credentials,
        })
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Whether the key holds secret material
    pub fn is_credential(&self, key: &str) -> bool {
        self.credentials.contains(key)
    }

    /// All values with credentials replaced by `***`
    pub fn masked(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if self.is_credential(k) { "***".to_string() } else { v.clone() };
                (k.clone(), shown)
            })
            .collect()
    }

    /// Replace `{{ key }}` placeholders with context values
    ///
    /// Substitution is a single pass over the template; placeholders inside
    /// substituted values are left as they are.
    pub fn render(&self, template: &str) -> String {
        self.substitute(template).0
    }

    /// Render a template, failing if any placeholder is left unresolved
    pub fn render_strict(&self, field: &str, template: &str) -> Result<String, ConfigError> {
        match self.substitute(template) {
            (rendered, None) => Ok(rendered),
            (_, Some(placeholder)) => Err(ConfigError::invalid(
                field,
                format!("unresolved placeholder {}", placeholder),
            )),
        }
    }

    /// Rendered text and the first placeholder with no value
    fn substitute(&self, template: &str) -> (String, Option<String>) {
        let mut unresolved = None;
        let rendered = placeholder_regex()
            .replace_all(template, |caps: &Captures<'_>| match self.values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    unresolved.get_or_insert_with(|| caps[0].to_string());
                    caps[0].to_string()
                }
            })
            .into_owned();
        (rendered, unresolved)
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^}]*?)\s*\}\}").expect("valid placeholder regex"))
}

fn dns_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid label regex"))
}

fn release_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .expect("valid release regex")
    })
}

/// Check a namespace name against RFC 1123 label rules
pub fn validate_namespace_name(name: &str) -> Result<(), String> {
    if name.len() > 63 {
        return Err(format!("namespace '{}' is longer than 63 characters", name));
    }
    if !dns_label_regex().is_match(name) {
        return Err(format!(
            "namespace '{}' must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric",
            name
        ));
    }
    Ok(())
}

/// Check a Helm release name
pub fn validate_release_name(name: &str) -> Result<(), String> {
    if name.len() > 53 {
        return Err(format!("release name '{}' is longer than 53 characters", name));
    }
    if !release_name_regex().is_match(name) {
        return Err(format!("release name '{}' is not a valid DNS subdomain", name));
    }
    Ok(())
}
