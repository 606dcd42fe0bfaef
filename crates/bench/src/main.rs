//! msc-bench - maximum sustainable concurrency harness
//!
//! Ramps parallel load against the configured endpoints until latency,
//! errors or host pressure degrade, then reports the highest safe level.

use anyhow::{Context, Result};
use bench_lib::{
    admission::RobotsSource,
    health::HealthRegistry,
    host::ProcHostSampler,
    observability::BenchMetrics,
    runner::{HttpFetcher, WorkloadMode, DEFAULT_USER_AGENT},
};
use clap::{Parser, Subcommand};
use msc_bench::{
    api,
    config::BenchConfig,
    harness::{self, Capabilities},
    output::{self, OutputFormat},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "msc-bench")]
#[command(author, version, about = "Find the maximum sustainable concurrency of a service", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON); MSC_* variables override it
    #[arg(long, short, global = true, env = "MSC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the ramp and print the result
    Run {
        /// Output format (overrides output.format)
        #[arg(long, short)]
        format: Option<OutputFormat>,

        /// Write the JSON report here (overrides output.report_path)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the resolved ramp levels without running
    Plan {
        #[arg(long, short)]
        format: Option<OutputFormat>,
    },

    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout stays clean for the report
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = BenchConfig::load(cli.config.as_deref())?;
    config.resolve_workload().await?;
    let plan = config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::CheckConfig => {
            output::print_success(&format!(
                "Configuration valid: {} levels, {} urls",
                plan.len(),
                config.workload.urls.len()
            ));
            Ok(())
        }
        Commands::Plan { format } => {
            output::print_plan(&plan, format.unwrap_or(config.output.format))
        }
        Commands::Run { format, output: report_path } => {
            if let Some(format) = format {
                config.output.format = format;
            }
            if report_path.is_some() {
                config.output.report_path = report_path;
            }
            run(config, plan).await
        }
    }
}

async fn run(config: BenchConfig, plan: bench_lib::ramp::RampPlan) -> Result<()> {
    let run_id = harness::run_id();
    info!(
        run_id = %run_id,
        mode = ?config.workload.mode,
        engine = %config.workload.engine,
        levels = ?plan.levels(),
        "Starting msc-bench"
    );
    if config.workload.urls.is_empty() {
        warn!("No target urls configured, every level will record an empty sample");
    }

    let health = HealthRegistry::new();
    health.register_all().await;
    BenchMetrics::new();

    let user_agent = match config.workload.mode {
        WorkloadMode::Http => DEFAULT_USER_AGENT.to_string(),
        WorkloadMode::Browser => format!(
            "{} ({}; headless={})",
            DEFAULT_USER_AGENT, config.workload.engine, config.workload.headless
        ),
    };
    let fetcher = Arc::new(HttpFetcher::with_user_agent(
        config.safety.timeout(),
        &user_agent,
    )?);
    let robots: Option<Arc<dyn RobotsSource>> =
        config.safety.robots_respect.then(|| fetcher.clone() as Arc<dyn RobotsSource>);

    let controller = harness::build_controller(
        &config,
        plan,
        Capabilities {
            fetcher,
            robots,
            sampler: Arc::new(ProcHostSampler::new()),
        },
        &health,
        &run_id,
    );

    if config.api.enabled {
        let state = Arc::new(api::AppState::new(health.clone(), controller.subscribe()));
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                warn!(error = %e, "Status server stopped");
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping after the current level");
            let _ = shutdown_tx.send(());
        }
    });

    health.set_ready(true).await;
    let report = controller.run(shutdown_rx).await;
    health.set_ready(false).await;

    output::print_report(&report, config.output.format)?;
    if let Some(path) = &config.output.report_path {
        output::write_report(&report, path).await?;
        output::print_info(&format!("Report written to {}", path.display()));
    }

    Ok(())
}
