//! CLI output formatting

use crate::{
    core::{PipelineReport, PipelineRun, RunStatus},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown while a step is in flight
pub fn create_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a run status for display
pub fn format_status(status: &RunStatus) -> String {
    match status {
        RunStatus::NotStarted => style("NOT STARTED").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed { step, .. } => style(format!("FAILED at {}", step)).red().to_string(),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name,
            total_steps,
        } => format!(
            "{} Provisioning {} ({}, {} steps)",
            ROCKET,
            style(pipeline_name).bold(),
            style(&run_id.to_string()[..8]).dim(),
            total_steps
        ),
        ExecutionEvent::StepStarted {
            index,
            total,
            step,
            description,
        } => format!(
            "{} [{}/{}] {} {}",
            SPINNER,
            index + 1,
            total,
            style(step).cyan(),
            style(description).dim()
        ),
        ExecutionEvent::StepSucceeded {
            step,
            outcome,
            duration,
        } => format!(
            "{} {} {} {}",
            CHECK,
            style(step).green(),
            outcome,
            style(format!("({:.1}s)", duration.as_secs_f64())).dim()
        ),
        ExecutionEvent::StepFailed { step, error } => {
            format!("{} {}: {}", CROSS, style(step).red(), error)
        }
        ExecutionEvent::PipelineFinished { run_id, status } => format!(
            "{} Run {} {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_status(status)
        ),
    }
}

/// Ordered plan with credentials masked
pub fn format_plan(run: &PipelineRun) -> String {
    let mut lines = vec![format!("{} {}", INFO, style(&run.name).bold())];

    lines.push(style("Context:").bold().to_string());
    for (key, value) in run.context().masked() {
        lines.push(format!("  {} = {}", key, value));
    }

    lines.push(style("Required tools:").bold().to_string());
    let tools: Vec<String> = run.required_tools().into_iter().collect();
    lines.push(format!("  {}", tools.join(", ")));

    lines.push(style("Steps:").bold().to_string());
    for (i, step) in run.steps.iter().enumerate() {
        lines.push(format!(
            "  {}. {} [{}] {}",
            i + 1,
            style(&step.name).cyan(),
            step.action.kind(),
            step.action.describe()
        ));
        if let Some(retry) = &step.retry {
            lines.push(format!(
                "     {}",
                style(format!(
                    "retry: up to {} attempts, {}s of delay in total",
                    retry.max_attempts,
                    retry.ceiling().as_secs()
                ))
                .dim()
            ));
        }
    }

    lines.join("\n")
}

/// Summary table printed after a successful run
pub fn format_report(report: &PipelineReport) -> String {
    let mut lines = vec![format!(
        "{} {} {}",
        CHECK,
        style(&report.pipeline).bold(),
        format_status(&report.status)
    )];
    for step in &report.steps {
        lines.push(format!(
            "  {:<24} {:<26} {} {}",
            step.name,
            step.action.to_string(),
            step.outcome,
            style(format!("{}ms", step.duration_ms)).dim()
        ));
    }
    lines.join("\n")
}
