//! PipeTrace CLI Entry Point
//!
//! Performs exactly one instrumented pipeline run and exits.
//!
//! # Usage
//!
//! ```bash
//! # Run against a local collector
//! pipetrace
//!
//! # Point at another collector
//! pipetrace --endpoint http://collector:4317
//!
//! # Run without exporting anything
//! pipetrace --no-export --verbose
//!
//! # Load settings from a file
//! pipetrace --config pipetrace.yaml
//! ```

use std::env;
use std::error::Error;
use std::process::ExitCode;

use colored::Colorize;
use log::{debug, error, info};

use pipetrace::config::Config;
use pipetrace::execution::{PipelineRunner, RunReport};
use pipetrace::monitoring::{ResourceGauges, ResourceSampler, ScopedSampler, SpanScope};
use pipetrace::telemetry::{init_logging, LogForwarder, Telemetry};
use pipetrace::{APP_NAME, VERSION};

/// Command-line options parsed from arguments.
#[derive(Debug, Default)]
struct CliOptions {
    config_path: Option<String>,
    endpoint: Option<String>,
    interval_ms: Option<u64>,
    no_export: bool,
    verbose: bool,
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Instrumented ETL Pipeline Simulator");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: pipetrace [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config PATH       Load settings from a YAML file");
    println!("  --endpoint URL      OTLP collector endpoint (default: http://localhost:4317)");
    println!("  --interval MS       Metric export interval in milliseconds (default: 1000)");
    println!("  --no-export         Keep telemetry in-process");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Environment:");
    println!("  OTEL_EXPORTER_OTLP_ENDPOINT, OTEL_SERVICE_NAME,");
    println!("  OTEL_METRIC_EXPORT_INTERVAL, OTEL_SDK_DISABLED, RUST_LOG");
}

/// Parses command-line arguments into options.
fn parse_arguments(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--no-export" => {
                options.no_export = true;
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or("--config requires a path argument")?;
                options.config_path = Some(path.clone());
            }
            "--endpoint" => {
                i += 1;
                let url = args.get(i).ok_or("--endpoint requires a URL argument")?;
                options.endpoint = Some(url.clone());
            }
            "--interval" => {
                i += 1;
                let value = args.get(i).ok_or("--interval requires a number argument")?;
                options.interval_ms = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid interval value: {}", value))?,
                );
            }
            other => {
                return Err(format!("Unknown argument: {}", other));
            }
        }
        i += 1;
    }

    Ok(options)
}

/// Resolves the effective configuration: defaults, file, environment, flags.
fn resolve_config(options: &CliOptions) -> Result<Config, Box<dyn Error>> {
    let mut config = match &options.config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    config.apply_env()?;

    if let Some(ref endpoint) = options.endpoint {
        config.telemetry.endpoint = endpoint.clone();
    }
    if let Some(interval) = options.interval_ms {
        config.telemetry.export_interval_ms = interval;
    }
    if options.no_export {
        config.telemetry.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// Prints the end-of-run report.
fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "Pipeline completed successfully".green().bold());
    println!();
    println!("{}", report.summary());
    println!("{}", report.timeline.gantt_chart());
}

/// Runs the pipeline once with telemetry wired up.
///
/// A telemetry shutdown failure is logged and does not fail the run;
/// delivery to the collector is not part of the pipeline's outcome.
async fn execute(
    config: &Config,
    forwarder: Option<&LogForwarder>,
) -> Result<RunReport, Box<dyn Error>> {
    let telemetry = Telemetry::init(&config.telemetry)?;
    if let Some(forwarder) = forwarder {
        forwarder.attach(telemetry.logger_provider());
    }

    if !telemetry.is_exporting() {
        info!("Mode: NO EXPORT (telemetry stays in-process)");
    }

    // Gauges are registered once; each run rebinds the scope they read
    let scope = SpanScope::new();
    let sampler = ResourceSampler::new()?.with_cpu_window(config.telemetry.cpu_window());
    let _gauges = ResourceGauges::register(
        &telemetry.meter(),
        ScopedSampler::new(sampler, scope.clone()),
    );

    let mut runner = PipelineRunner::new(telemetry.tracer(), scope).with_plan(&config.pipeline);
    let outcome = tokio::task::spawn_blocking(move || runner.run()).await?;

    if let Err(ref e) = outcome {
        error!("Pipeline aborted: {}", e);
    }

    // Flush spans and logs even when the run failed
    match tokio::task::spawn_blocking(move || telemetry.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{}", e),
        Err(e) => error!("Telemetry shutdown task failed: {}", e),
    }

    Ok(outcome?)
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();

    let options = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    let forwarder = init_logging(options.verbose)?;

    print_banner();

    let config = resolve_config(&options)?;
    if let Ok(json) = serde_json::to_string_pretty(&config) {
        debug!("Effective configuration:\n{}", json);
    }

    let report = execute(&config, Some(&forwarder)).await?;
    print_summary(&report);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
