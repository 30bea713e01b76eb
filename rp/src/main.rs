//! rp - request pool toolkit
//!
//! CLI entry point for inspecting pool presets and running synthetic traffic.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::{ColoredString, Colorize};
use eyre::{Context, Result};
use tracing::info;

use reqpool::cli::{Cli, Command, OutputFormat};
use reqpool::config::Config;
use reqpool::events::PoolEvent;
use reqpool::pool::{PoolConfig, PoolStatistics, PoolStatus};
use reqpool::registry::{API_POOL, UPLOAD_POOL};
use reqpool::simulate::{self, QuietObserver, SimulationObserver, SimulationOptions, SimulationReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reqpool")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("rp.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first: it may carry the log level
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(pools = config.pools.len(), "rp loaded config");

    match cli.command {
        Some(Command::Presets { format }) => cmd_presets(&config, format),
        Some(Command::Simulate {
            duration,
            rate,
            failure_rate,
            seed,
            report_interval_ms,
            format,
        }) => {
            let options = SimulationOptions {
                duration: Duration::from_secs(duration),
                rate,
                failure_rate,
                seed,
                report_interval: Duration::from_millis(report_interval_ms),
            };
            cmd_simulate(&config, &options, format).await
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Print the effective config of the preset pools plus every configured pool
fn cmd_presets(config: &Config, format: OutputFormat) -> Result<()> {
    let mut names: Vec<String> = vec![UPLOAD_POOL.to_string(), API_POOL.to_string()];
    let mut configured: Vec<String> = config
        .pools
        .keys()
        .filter(|name| !names.contains(*name))
        .cloned()
        .collect();
    configured.sort();
    names.extend(configured);

    let pools: std::collections::BTreeMap<String, PoolConfig> = names
        .iter()
        .map(|name| (name.clone(), config.pool_config(name)))
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pools)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&pools)?),
        OutputFormat::Text => {
            println!(
                "{:<12} {:>10} {:>10} {:>12} {:>10} {:>14}",
                "POOL", "CONCURRENT", "QUEUE", "TIMEOUT", "DROP-LOW", "BACKPRESSURE"
            );
            for name in &names {
                let pool = &pools[name];
                println!(
                    "{:<12} {:>10} {:>10} {:>12} {:>10} {:>14}",
                    name,
                    pool.max_concurrent,
                    pool.max_queue_size,
                    format!("{}s", pool.default_timeout().as_secs()),
                    if pool.drop_low_priority_on_overload { "yes" } else { "no" },
                    format!("{:.0}", pool.backpressure_threshold().ceil()),
                );
            }
        }
    }
    Ok(())
}

/// Prints a status line per report and a line per degradation event
struct ConsoleObserver;

impl SimulationObserver for ConsoleObserver {
    fn on_status(&mut self, stats: &[PoolStatistics]) {
        let line: Vec<String> = stats
            .iter()
            .map(|s| {
                format!(
                    "{} {} active {}/{} queued {} done {} failed {} dropped {}",
                    s.pool.bold(),
                    status_label(s.status),
                    s.active_requests,
                    s.max_concurrent,
                    s.queued_requests,
                    s.completed_requests,
                    s.failed_requests,
                    s.dropped_requests
                )
            })
            .collect();
        println!("{}", line.join("  |  "));
    }

    fn on_event(&mut self, event: &PoolEvent) {
        if let PoolEvent::StatusChanged { pool, from, to } = event {
            println!("{} {} {} -> {}", "!".yellow(), pool.bold(), status_label(*from), status_label(*to));
        }
    }
}

fn status_label(status: PoolStatus) -> ColoredString {
    match status {
        PoolStatus::Healthy => "healthy".green(),
        PoolStatus::Backpressure => "backpressure".yellow(),
        PoolStatus::Overloaded => "overloaded".red(),
        PoolStatus::Paused => "paused".blue(),
    }
}

async fn cmd_simulate(config: &Config, options: &SimulationOptions, format: OutputFormat) -> Result<()> {
    let registry = config.registry();

    let report = match format {
        OutputFormat::Text => {
            println!(
                "Simulating {}s of traffic at {}/s ({} failure rate)",
                options.duration.as_secs(),
                options.rate,
                options.failure_rate
            );
            simulate::run(&registry, options, &mut ConsoleObserver).await?
        }
        OutputFormat::Json | OutputFormat::Yaml => simulate::run(&registry, options, &mut QuietObserver).await?,
    };
    registry.dispose_all();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let outcomes = &report.outcomes;
    println!();
    println!("Simulation Results (seed {})", report.seed);
    println!("--------------------------------");
    println!("Submitted:  {}", outcomes.submitted);
    println!("  Succeeded: {}", outcomes.succeeded.to_string().green());
    println!("  Failed:    {}", outcomes.failed.to_string().red());
    println!("  Dropped:   {}", outcomes.dropped.to_string().yellow());
    println!("  Timed out: {}", outcomes.timed_out.to_string().yellow());
    println!();
    println!(
        "{:<10} {:>10} {:>10} {:>8} {:>8} {:>12} {:>10} {:>10}",
        "POOL", "COMPLETED", "FAILED", "DROPPED", "TOTAL", "AVG-LATENCY", "PEAK-QUEUE", "PEAK-RUN"
    );
    for stats in &report.pools {
        println!(
            "{:<10} {:>10} {:>10} {:>8} {:>8} {:>12} {:>10} {:>10}",
            stats.pool,
            stats.completed_requests,
            stats.failed_requests,
            stats.dropped_requests,
            stats.total_processed,
            format!("{:.1}ms", stats.average_latency_ms),
            stats.peak_queue_depth,
            stats.peak_concurrent,
        );
    }
}
