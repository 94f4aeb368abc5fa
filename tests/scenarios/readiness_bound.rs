//! Test: Readiness bound - polling stops at the attempt ceiling

use crate::helpers::*;
use provisioner::core::{Overrides, PipelineError, ProvisionError, StepOutcome};
use std::time::Duration;
use tokio::time::Instant;

const NAMESPACE_X: &str = r#"
name: namespace-x
steps:
  - name: namespace
    action: ensure_namespace
    namespace: x
  - name: after
    action: apply_manifest
    source: after.yaml
"#;

#[tokio::test(start_paused = true)]
async fn test_namespace_never_usable() {
    // can-i never answers yes
    let harness = Harness::new(FakeCluster::default());
    let started = Instant::now();

    let mut run = build_run(NAMESPACE_X, &[], Overrides::default()).unwrap();
    let err = harness.orchestrator().provision(&mut run).await.unwrap_err();

    match err {
        PipelineError::StepFailed { step, source } => {
            assert_eq!(step, "namespace");
            assert_eq!(
                source,
                ProvisionError::NotReadyError {
                    namespace: "x".to_string(),
                    attempts: 30
                }
            );
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(harness.cluster.can_i_calls(), 30);
    assert!(started.elapsed() >= Duration::from_secs(58));
    assert!(!harness.cluster.calls().iter().any(|c| c.contains("after.yaml")));
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_readiness_budget_applies() {
    let yaml = r#"
name: namespace-x
readiness: { max_attempts: 5, interval_secs: 1 }
steps:
  - name: namespace
    action: ensure_namespace
    namespace: x
"#;
    let harness = Harness::new(FakeCluster::default());

    let mut run = build_run(yaml, &[], Overrides::default()).unwrap();
    harness.orchestrator().provision(&mut run).await.unwrap_err();

    assert_eq!(harness.cluster.can_i_calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_namespace_usable_after_a_few_checks() {
    let harness = Harness::new(FakeCluster {
        can_i_after: 4,
        ..Default::default()
    });

    let mut run = build_run(NAMESPACE_X, &[], Overrides::default()).unwrap();
    harness.orchestrator().provision(&mut run).await.unwrap();

    assert_succeeded(&run);
    assert_eq!(harness.cluster.can_i_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_wait_retries_until_deployment_appears() {
    let yaml = r#"
name: gateway
steps:
  - name: gateway-ready
    action: wait_for_ready
    deployment: infra-inference-gateway
    namespace: llmd
    timeout_secs: 300
    retry: { max_attempts: 3, interval_secs: 5 }
"#;
    let harness = Harness::new(FakeCluster::healthy());
    let cluster = harness.cluster.clone();

    // Deployment shows up while the orchestrator is between attempts
    let reveal = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(7)).await;
        cluster
            .ready
            .lock()
            .unwrap()
            .insert("deployment/infra-inference-gateway".to_string());
    });

    let mut run = build_run(yaml, &[], Overrides::default()).unwrap();
    let report = harness.orchestrator().provision(&mut run).await.unwrap();
    reveal.await.unwrap();

    assert_eq!(report.outcome("gateway-ready"), Some(&StepOutcome::Ready { attempts: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_wait_gives_up_with_timeout_error() {
    let yaml = r#"
name: gateway
steps:
  - name: gateway-ready
    action: wait_for_ready
    deployment: gateway
    namespace: llmd
    timeout_secs: 60
    retry: { max_attempts: 2, interval_secs: 1 }
"#;
    let harness = Harness::new(FakeCluster::healthy());

    let mut run = build_run(yaml, &[], Overrides::default()).unwrap();
    let err = harness.orchestrator().provision(&mut run).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StepFailed {
            source: ProvisionError::TimeoutError { ref resource, timeout, .. },
            ..
        } if resource == "deployment/gateway -n llmd" && timeout == Duration::from_secs(60)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_wait_with_readiness_budget_ends_at_timeout() {
    // No retry block: the pipeline's 30 x 2s budget applies to the wait
    let yaml = r#"
name: gateway
steps:
  - name: gateway-ready
    action: wait_for_ready
    deployment: gateway
    namespace: llmd
    timeout_secs: 10
"#;
    let harness = Harness::new(FakeCluster {
        wait_blocks: true,
        ..FakeCluster::healthy()
    });
    let started = Instant::now();

    let mut run = build_run(yaml, &[], Overrides::default()).unwrap();
    assert!(run.steps[0].retry.is_some());
    let err = harness.orchestrator().provision(&mut run).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StepFailed {
            source: ProvisionError::TimeoutError { timeout, .. },
            ..
        } if timeout == Duration::from_secs(10)
    ));
    assert!(started.elapsed() <= Duration::from_secs(10));
}
