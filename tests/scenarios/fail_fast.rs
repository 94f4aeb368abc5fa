//! Test: Fail-fast - the first failing step halts the run

use crate::helpers::*;
use provisioner::core::{Overrides, PipelineError, ProvisionError, RunStatus};

const FOUR_STEPS: &str = r#"
name: fail-fast
steps:
  - name: namespace
    action: ensure_namespace
    namespace: llmd
  - name: crds
    action: apply_manifest
    source: crds.yaml
  - name: gateway
    action: apply_manifest
    source: gateway.yaml
    namespace: llmd
  - name: bootstrap
    action: run_external_script
    command: helmfile
    args: [apply, -n, llmd]
"#;

#[tokio::test]
async fn test_failed_step_stops_the_run() {
    let harness = Harness::new(FakeCluster {
        broken_manifests: vec!["crds.yaml".to_string()],
        ..FakeCluster::healthy()
    });

    let mut run = build_run(FOUR_STEPS, &[], Overrides::default()).unwrap();
    let err = harness.orchestrator().provision(&mut run).await.unwrap_err();

    assert_eq!(err.exit_code(), 4);
    match err {
        PipelineError::StepFailed { step, source } => {
            assert_eq!(step, "crds");
            assert!(matches!(source, ProvisionError::ApplyError { ref target, .. } if target == "crds.yaml"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_failed_at(&run, "crds");

    // Nothing after the failing step ran
    let calls = harness.cluster.calls();
    assert!(!calls.iter().any(|c| c.contains("gateway.yaml")));
    assert!(harness.scripts.runs.lock().unwrap().is_empty());
    assert_eq!(run.completed.len(), 1);
    assert_eq!(run.completed[0].name, "namespace");
}

#[tokio::test]
async fn test_chart_failure_records_release() {
    let harness = Harness::new(FakeCluster::healthy()).with_charts(FakeCharts {
        failing: Some("infra".to_string()),
        ..Default::default()
    });

    let mut run = build_run(LLMD_PIPELINE, &[("HF_TOKEN", "abc")], Overrides::default()).unwrap();
    harness.orchestrator().provision(&mut run).await.unwrap_err();

    match &run.status {
        RunStatus::Failed {
            step,
            cause: ProvisionError::ChartError { release, cause },
        } => {
            assert_eq!(step, "infra");
            assert_eq!(release, "infra");
            assert!(cause.contains("INSTALLATION FAILED"));
        }
        other => panic!("unexpected status {:?}", other),
    }
    // Earlier steps stay applied; the run is not rolled back
    assert_eq!(harness.cluster.secrets.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_every_step_runs_in_order() {
    let harness = Harness::new(FakeCluster::healthy());

    let mut run = build_run(FOUR_STEPS, &[], Overrides::default()).unwrap();
    let report = harness.orchestrator().provision(&mut run).await.unwrap();

    let names: Vec<&str> = report.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["namespace", "crds", "gateway", "bootstrap"]);
    assert_eq!(
        *harness.cluster.manifests.lock().unwrap(),
        vec!["crds.yaml".to_string(), "gateway.yaml".to_string()]
    );
    assert_eq!(*harness.scripts.runs.lock().unwrap(), vec!["helmfile apply -n llmd".to_string()]);
}
