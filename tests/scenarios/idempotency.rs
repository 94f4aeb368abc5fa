//! Test: Idempotency - running the same pipeline twice converges

use crate::helpers::*;
use provisioner::core::{NamespaceState, Overrides, StepOutcome};
use std::collections::BTreeSet;

const EVERY_ACTION: &str = r#"
name: every-action
context:
  hf_token: { env: HF_TOKEN, kind: credential, required: true }
steps:
  - name: namespace
    action: ensure_namespace
    namespace: llmd
  - name: crds
    action: apply_manifest
    source: gateway-api-crds.yaml
  - name: hf-token
    action: create_or_update_secret
    secret: hf-token
    namespace: llmd
    data: { HF_TOKEN: "{{ hf_token }}" }
  - name: infra
    action: install_or_upgrade_chart
    release: infra
    chart: chart-ref
    namespace: llmd
  - name: bootstrap
    action: run_external_script
    command: helmfile
    args: [apply, -n, llmd]
  - name: gateway-ready
    action: wait_for_ready
    deployment: infra-inference-gateway
    namespace: llmd
    timeout_secs: 60
"#;

#[tokio::test]
async fn test_llmd_pipeline_runs_twice() {
    let harness = Harness::new(FakeCluster::healthy());
    let orchestrator = harness.orchestrator();
    let env = [("HF_TOKEN", "abc")];

    let mut first = build_run(LLMD_PIPELINE, &env, Overrides::default()).unwrap();
    let report = orchestrator.provision(&mut first).await.unwrap();
    assert_succeeded(&first);
    assert_eq!(
        report.outcome("namespace"),
        Some(&StepOutcome::Namespace {
            state: NamespaceState::Created
        })
    );

    let mut second = build_run(LLMD_PIPELINE, &env, Overrides::default()).unwrap();
    let report = orchestrator.provision(&mut second).await.unwrap();
    assert_succeeded(&second);
    assert_eq!(
        report.outcome("namespace"),
        Some(&StepOutcome::Namespace {
            state: NamespaceState::AlreadyExists
        })
    );
    assert_eq!(report.outcome("hf-token"), Some(&StepOutcome::SecretApplied));
    assert_eq!(report.outcome("infra"), Some(&StepOutcome::ChartDeployed));

    // Same end state: one namespace, one secret, one release upgraded in place
    assert_eq!(harness.cluster.namespaces.lock().unwrap().len(), 1);
    let secrets = harness.cluster.secrets.lock().unwrap();
    assert_eq!(secrets.len(), 1);
    let data = &secrets[&("llmd".to_string(), "hf-token".to_string())];
    assert_eq!(data.get("HF_TOKEN").map(String::as_str), Some("abc"));
    assert_eq!(harness.charts.installs("infra"), 2);

    // Namespace was created once; the second run only checked it
    let creates = harness
        .cluster
        .calls()
        .iter()
        .filter(|c| c.starts_with("create namespace"))
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn test_secret_update_replaces_value() {
    let harness = Harness::new(FakeCluster::healthy());
    let orchestrator = harness.orchestrator();

    let mut run = build_run(LLMD_PIPELINE, &[("HF_TOKEN", "old")], Overrides::default()).unwrap();
    orchestrator.provision(&mut run).await.unwrap();

    let mut run = build_run(LLMD_PIPELINE, &[("HF_TOKEN", "new")], Overrides::default()).unwrap();
    orchestrator.provision(&mut run).await.unwrap();

    let secrets = harness.cluster.secrets.lock().unwrap();
    assert_eq!(secrets.len(), 1);
    let data = secrets.values().next().unwrap();
    assert_eq!(data.get("HF_TOKEN").map(String::as_str), Some("new"));
}

#[tokio::test]
async fn test_namespace_override_targets_other_namespace() {
    let harness = Harness::new(FakeCluster::healthy());
    let overrides = Overrides::default().set("namespace", "team-a");

    let mut run = build_run(LLMD_PIPELINE, &[("HF_TOKEN", "abc")], overrides).unwrap();
    harness.orchestrator().provision(&mut run).await.unwrap();

    assert!(harness.cluster.namespaces.lock().unwrap().contains("team-a"));
    assert!(harness
        .cluster
        .secrets
        .lock()
        .unwrap()
        .contains_key(&("team-a".to_string(), "hf-token".to_string())));
}

#[tokio::test]
async fn test_every_action_succeeds_when_run_twice() {
    let cluster = FakeCluster::healthy();
    cluster
        .ready
        .lock()
        .unwrap()
        .insert("deployment/infra-inference-gateway".to_string());
    let harness = Harness::new(cluster);
    let orchestrator = harness.orchestrator();
    let env = [("HF_TOKEN", "abc")];

    let mut first = build_run(EVERY_ACTION, &env, Overrides::default()).unwrap();
    orchestrator.provision(&mut first).await.unwrap();
    assert_succeeded(&first);

    let mut second = build_run(EVERY_ACTION, &env, Overrides::default()).unwrap();
    let report = orchestrator.provision(&mut second).await.unwrap();
    assert_succeeded(&second);

    let outcomes: Vec<&StepOutcome> = report.steps.iter().map(|s| &s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            &StepOutcome::Namespace {
                state: NamespaceState::AlreadyExists
            },
            &StepOutcome::ManifestApplied,
            &StepOutcome::SecretApplied,
            &StepOutcome::ChartDeployed,
            &StepOutcome::ScriptCompleted,
            &StepOutcome::Ready { attempts: 1 },
        ]
    );

    // Re-applying converges on the same objects
    let applied: BTreeSet<String> = harness.cluster.manifests.lock().unwrap().iter().cloned().collect();
    assert_eq!(applied, BTreeSet::from(["gateway-api-crds.yaml".to_string()]));
    assert_eq!(harness.cluster.namespaces.lock().unwrap().len(), 1);
    assert_eq!(harness.cluster.secrets.lock().unwrap().len(), 1);
    assert_eq!(harness.charts.installs("infra"), 2);
    assert_eq!(harness.scripts.runs.lock().unwrap().len(), 2);
}
