use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use formpilot_cli::{
    AppConfig, AutomationService, JobConfig, JobId, JobSpec, NoopDriver, NoopModelService,
};

#[derive(Parser)]
#[command(name = "formpilot", version, about = "Adaptive web-form automation engine")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job and wait for its result.
    Run {
        #[arg(long)]
        url: String,
        /// Field value as name=value; repeatable.
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// File upload as field=path; repeatable.
        #[arg(long = "file", value_parser = parse_key_value)]
        files: Vec<(String, String)>,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        no_self_healing: bool,
        #[arg(long)]
        visual_verification: bool,
    },
    /// Show a job's lifecycle status.
    Status { job_id: String },
    /// Show a finished job's result.
    Results { job_id: String },
    /// Windowed job metrics.
    Metrics {
        #[arg(long, default_value = "24h")]
        window: humantime::Duration,
    },
    /// Run the strategy-learning sweep once.
    Optimize,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Real browser-driver and model-service integrations are wired in by
    // the embedding product; standalone the engine runs with inert stand-ins.
    let service =
        AutomationService::new(&config, Arc::new(NoopDriver), Arc::new(NoopModelService))
            .await
            .context("initializing service")?;

    match cli.command {
        Command::Run {
            url,
            fields,
            files,
            max_retries,
            timeout_secs,
            no_self_healing,
            visual_verification,
        } => {
            warn!("no browser driver configured; running against inert stand-ins");
            let mut job_config = JobConfig::default()
                .with_self_healing(!no_self_healing)
                .with_visual_verification(visual_verification);
            if let Some(max) = max_retries {
                job_config = job_config.with_max_retries(max);
            }
            if let Some(secs) = timeout_secs {
                job_config = job_config.with_timeout(Duration::from_secs(secs));
            }

            let mut spec = JobSpec::new(url).with_config(job_config);
            for (name, value) in fields {
                spec = spec.with_field(name, value);
            }
            for (field, path) in files {
                spec = spec.with_file(field, path);
            }

            service.start().await?;
            let id = service.submit_job(spec).await?;
            println!("submitted job {id}");

            loop {
                let status = service.get_status(&id).await?;
                if status.state.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            let result = service.get_results(&id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            service.shutdown().await;
        }
        Command::Status { job_id } => {
            let status = service.get_status(&JobId(job_id)).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Results { job_id } => {
            let result = service.get_results(&JobId(job_id)).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Metrics { window } => {
            let metrics = service.metrics(window.into()).await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Optimize => {
            let replaced = service.run_sweep().await?;
            println!("sweep replaced {replaced} strategy patterns");
        }
    }

    Ok(())
}
