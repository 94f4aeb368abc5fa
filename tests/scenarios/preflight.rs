//! Test: Pre-flight - config and prerequisite errors abort before any mutation

use crate::helpers::*;
use provisioner::core::{ConfigError, Overrides, PipelineError, RunStatus};

const WITH_HELMFILE: &str = r#"
name: bootstrap
tools: [curl]
steps:
  - name: namespace
    action: ensure_namespace
    namespace: llmd
  - name: helmfile
    action: run_external_script
    command: helmfile
    args: [apply]
"#;

#[tokio::test]
async fn test_missing_tool_reported_without_cluster_calls() {
    let harness = Harness::new(FakeCluster::healthy()).with_tools(&["kubectl", "curl"]);

    let mut run = build_run(WITH_HELMFILE, &[], Overrides::default()).unwrap();
    let err = harness.orchestrator().provision(&mut run).await.unwrap_err();

    match &err {
        PipelineError::Prereq(prereq) => assert_eq!(prereq.missing, vec!["helmfile".to_string()]),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.exit_code(), 3);
    assert_eq!(run.status, RunStatus::NotStarted);
    assert!(harness.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_every_missing_tool_reported_together() {
    let harness = Harness::new(FakeCluster::healthy()).with_tools(&[]);

    let mut run = build_run(WITH_HELMFILE, &[], Overrides::default()).unwrap();
    let err = harness.orchestrator().provision(&mut run).await.unwrap_err();

    match err {
        PipelineError::Prereq(prereq) => assert_eq!(
            prereq.missing,
            vec!["curl".to_string(), "helmfile".to_string(), "kubectl".to_string()]
        ),
        other => panic!("unexpected error {:?}", other),
    }
    // Every tool was probed, not just the first missing one
    assert_eq!(harness.tools.probed.lock().unwrap().len(), 3);
}

#[test]
fn test_missing_credential_is_config_error() {
    let err = build_run(LLMD_PIPELINE, &[], Overrides::default()).unwrap_err();
    assert_eq!(err, ConfigError::MissingConfig("hf_token".to_string()));
    assert_eq!(PipelineError::from(err).exit_code(), 2);
}

#[test]
fn test_credential_env_redirect() {
    let overrides = Overrides {
        credential_env: Some("MY_TOKEN".to_string()),
        ..Default::default()
    };
    let run = build_run(LLMD_PIPELINE, &[("MY_TOKEN", "xyz")], overrides).unwrap();
    assert_eq!(run.context().get("hf_token"), Some("xyz"));
    assert_eq!(run.context().masked().get("hf_token").map(String::as_str), Some("***"));
}

#[test]
fn test_invalid_namespace_rejected_before_run() {
    let overrides = Overrides::default().set("namespace", "Not_Valid");
    let err = build_run(LLMD_PIPELINE, &[("HF_TOKEN", "abc")], overrides).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig { ref key, .. } if key == "namespace"));
}

#[test]
fn test_overlong_release_rejected() {
    let overrides = Overrides::default().set("release", "r".repeat(54));
    let err = build_run(LLMD_PIPELINE, &[("HF_TOKEN", "abc")], overrides).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig { ref key, .. } if key == "release"));
}

#[test]
fn test_unresolved_placeholder_rejected() {
    let yaml = r#"
name: broken
steps:
  - name: namespace
    action: ensure_namespace
    namespace: "{{ target_namespace }}"
"#;
    let err = build_run(yaml, &[], Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig { ref key, .. } if key == "steps.namespace.namespace"));
}

#[test]
fn test_malformed_file_rejected() {
    let err = build_run("name: [unterminated", &[], Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Malformed(_)));
}
