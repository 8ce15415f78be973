use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use change_gate::config::AppConfig;
use change_gate::gate::{ChangeGate, PollSchedule};
use change_gate::interpret::{Interpreter, PollContext};
use change_gate::outcome::PollOutcome;
use change_gate::sink::{ConsoleReporter, GithubOutputFile, LogOutputSink, OutputSink};
use change_gate::transport::HttpChangeStatusSource;

#[derive(Parser)]
#[command(name = "change-gate", about = "Wait for a ServiceNow DevOps change request decision")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Poll a single time and print the outcome marker
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    tracing::info!(
        instance = %config.instance.url,
        pipeline = %config.poll_request().pipeline_name(),
        run_id = %config.run.run_id,
        "Starting change gate"
    );

    let outputs: Arc<dyn OutputSink> = match GithubOutputFile::from_env() {
        Some(sink) => Arc::new(sink),
        None => Arc::new(LogOutputSink),
    };
    let interpreter = Interpreter::new(outputs, Arc::new(ConsoleReporter));

    let source = HttpChangeStatusSource::new(
        config.http.request_timeout_secs.map(Duration::from_secs),
    )?;
    let context = PollContext::new(
        chrono::Utc::now(),
        config.policy.change_creation_timeout_secs,
        config.policy.abort_on_change_creation_failure,
    );
    let mut gate = ChangeGate::new(source, config.poll_request().build(), interpreter, context);

    let outcome = if cli.once {
        gate.poll_once().await
    } else {
        gate.run(PollSchedule {
            interval: Duration::from_secs(config.poll.interval_secs),
            max_wait: config.poll.max_wait_secs.map(Duration::from_secs),
        })
        .await?
    };

    println!("{}", outcome.marker());
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &PollOutcome) -> ExitCode {
    match outcome {
        PollOutcome::Approved | PollOutcome::Pending { .. } => ExitCode::SUCCESS,
        PollOutcome::TimeoutContinue { .. } => ExitCode::SUCCESS,
        PollOutcome::Stopped => {
            tracing::warn!("Change request was rejected or canceled");
            ExitCode::from(2)
        }
        fatal => {
            tracing::error!(outcome = ?fatal, "Change gate failed");
            ExitCode::FAILURE
        }
    }
}
