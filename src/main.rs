use provisioner::cli::commands::{ContextArgs, PlanCommand, RunCommand, ValidateCommand};
use provisioner::cli::output::*;
use provisioner::cli::{Cli, Command};
use provisioner::collaborators::{ChainedEnv, Collaborators, HelmClient, KubectlClient, MapEnv, ProcessEnv};
use provisioner::core::config::PipelineConfig;
use provisioner::core::{resolve, ConfigError, Context as RunContext, PipelineError, PipelineRun, PrereqError};
use provisioner::execution::{ExecutionEvent, Orchestrator};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    let cli = Cli::from_args();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", CROSS, e);
        std::process::exit(1);
    }

    let result = match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd, &cli).await,
        Command::Validate(cmd) => validate_pipeline(cmd),
        Command::Plan(cmd) => plan_pipeline(cmd),
    };

    if let Err(e) = result {
        eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
        std::process::exit(exit_code(&e));
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set logging subscriber")
}

/// Map an error to the process exit code for its kind
fn exit_code(e: &anyhow::Error) -> i32 {
    if let Some(err) = e.downcast_ref::<PipelineError>() {
        err.exit_code()
    } else if e.downcast_ref::<ConfigError>().is_some() {
        2
    } else if e.downcast_ref::<PrereqError>().is_some() {
        3
    } else {
        1
    }
}

/// Load the pipeline file, resolve and validate its context, render the run
///
/// Performs no external calls.
fn prepare_run(args: &ContextArgs) -> Result<PipelineRun> {
    let config = PipelineConfig::from_file(&args.file).context("Failed to load pipeline config")?;

    let mut env = ChainedEnv::new().with(ProcessEnv);
    if let Some(path) = &args.env_file {
        env = env.with(MapEnv::from_env_file(path)?);
    }

    let raw = resolve(&config.context, &env, &args.overrides());
    let context = RunContext::validate(&config.context, raw)?;
    debug!("Resolved context: {:?}", context.masked());

    Ok(config.build_run(context)?)
}

async fn run_pipeline(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let mut run = prepare_run(&cmd.context)?;

    let kubectl = KubectlClient::new(cli.kubectl.clone())
        .with_kubeconfig(cli.kubeconfig.clone())
        .with_request_timeout(Duration::from_secs(cli.request_timeout));
    let helm = HelmClient::new(cli.helm.clone()).with_kubeconfig(cli.kubeconfig.clone());
    let mut orchestrator = Orchestrator::new(Collaborators::subprocess(kubectl, helm));

    // Console output with a spinner per in-flight step
    if !cmd.json {
        let spinner: Mutex<Option<ProgressBar>> = Mutex::new(None);
        orchestrator.add_event_handler(move |event| {
            let Ok(mut slot) = spinner.lock() else {
                return;
            };
            if let Some(active) = slot.take() {
                active.finish_and_clear();
            }
            println!("{}", format_execution_event(&event));
            if let ExecutionEvent::StepStarted { step, .. } = &event {
                *slot = Some(create_spinner(step.clone()));
            }
        });
    }

    let result = orchestrator.provision(&mut run).await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&run.report())?);
    } else if let Ok(report) = &result {
        println!("\n{}", format_report(report));
    }

    result.map(|_| ()).map_err(anyhow::Error::from)
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    let run = prepare_run(&cmd.context)?;

    if cmd.json {
        let summary = serde_json::json!({
            "valid": true,
            "pipeline": run.name,
            "steps": run.steps.len(),
            "required_tools": run.required_tools(),
            "context": run.context().masked(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} Pipeline {} is valid ({} steps)",
            CHECK,
            style(&run.name).bold(),
            run.steps.len()
        );
    }

    Ok(())
}

fn plan_pipeline(cmd: &PlanCommand) -> Result<()> {
    let run = prepare_run(&cmd.context)?;
    println!("{}", format_plan(&run));
    Ok(())
}
