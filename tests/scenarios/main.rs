//! Scenario tests for provisioning pipelines, driven by in-memory collaborators


mod fail_fast;
mod idempotency;
mod preflight;
mod readiness_bound;
