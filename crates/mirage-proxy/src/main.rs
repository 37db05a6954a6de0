//! Mirage CLI
//!
//! Offline maintenance of a mock directory written by a running proxy.
//!
//! Usage:
//!   mirage check --data-dir ./mirage-data [--port 9000] [--replace]
//!   mirage lint --data-dir ./mirage-data
//!
//! `check` replays every exact mock against its endpoint's upstream and
//! reports drift; with `--replace` drifted responses are overwritten.
//! `lint` reports duplicate, shadowed and catch-all mocks.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mirage_proxy::forward::{HttpUpstream, Upstream};
use mirage_proxy::mock::MatcherKind;
use mirage_proxy::persistence::FileStore;
use mirage_proxy::{DriftCheck, Protocol, Registry, RegistryError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Mirage - record/replay mocking proxy tools
#[derive(Parser, Debug)]
#[command(name = "mirage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding mocks.json, endpoints.json and settings.yaml
    #[arg(short, long, env = "MIRAGE_DATA_DIR", default_value = "./mirage-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay exact mocks against the real upstream and report drift
    Check {
        /// Only check this endpoint
        #[arg(short, long)]
        port: Option<u16>,

        /// Overwrite drifted mock responses with the upstream's answer
        #[arg(long)]
        replace: bool,

        /// Upstream request timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Print the unified body diff of every drifted mock
        #[arg(short, long)]
        verbose: bool,
    },
    /// Report duplicate, shadowed and catch-all mocks
    Lint {
        /// Only lint this endpoint
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Default)]
struct CheckSummary {
    checked: usize,
    drifted: usize,
    replaced: usize,
    skipped: usize,
    errors: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let store = FileStore::open(&args.data_dir)
        .with_context(|| format!("Failed to open data directory {:?}", args.data_dir))?;
    let registry = Registry::builder()
        .persistence(Arc::new(store))
        .open()
        .context("Failed to load mirage state")?;
    info!("Loaded {} endpoints from {:?}", registry.endpoints().len(), args.data_dir);

    match args.command {
        Commands::Check {
            port,
            replace,
            timeout,
            verbose,
        } => {
            let summary = check(&registry, port, replace, Duration::from_secs(timeout), verbose).await?;
            print_check_summary(&summary);
            if summary.drifted > summary.replaced || summary.errors > 0 {
                std::process::exit(1);
            }
        }
        Commands::Lint { port } => {
            let warnings = lint(&registry, port)?;
            if warnings > 0 {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn selected_ports(registry: &Registry, port: Option<u16>) -> Result<Vec<u16>> {
    let ports: Vec<u16> = registry
        .endpoints()
        .into_iter()
        .map(|e| e.port)
        .filter(|p| port.map_or(true, |wanted| *p == wanted))
        .collect();
    if let (Some(wanted), true) = (port, ports.is_empty()) {
        bail!("No endpoint registered on port {wanted}");
    }
    Ok(ports)
}

async fn check(
    registry: &Registry,
    port: Option<u16>,
    replace: bool,
    timeout: Duration,
    verbose: bool,
) -> Result<CheckSummary> {
    let mut summary = CheckSummary::default();

    for port in selected_ports(registry, port)? {
        let endpoint = registry.endpoint(port)?.config();
        println!(
            "{BOLD}Endpoint:{RESET} {} -> {}",
            endpoint.label(),
            endpoint.upstream
        );

        if endpoint.protocol != Protocol::Http {
            println!("  {YELLOW}skipped{RESET} {DIM}(no replay client for {}){RESET}", endpoint.protocol);
            summary.skipped += registry.list_mocks(port)?.len();
            continue;
        }
        let upstream = HttpUpstream::with_timeout(endpoint.upstream_base_url(), timeout)
            .with_context(|| format!("Failed to build client for {}", endpoint.upstream))?;
        debug!("Replaying against {}", upstream.target());

        for mock in registry.list_mocks(port)? {
            if mock.matcher.kind != MatcherKind::Exact || !mock.enabled {
                summary.skipped += 1;
                continue;
            }
            summary.checked += 1;

            match registry.check_drift(port, &mock.id, &upstream).await {
                Ok(DriftCheck { report: None, .. }) => println!("  {GREEN}ok{RESET}      {}", mock.name),
                Ok(DriftCheck {
                    report: Some(report),
                    response,
                }) => {
                    summary.drifted += 1;
                    println!("  {RED}drift{RESET}   {} {DIM}({}){RESET}", mock.name, report.summary);
                    if verbose {
                        if let Some(body_diff) = &report.body_diff {
                            for line in body_diff.lines() {
                                println!("          {line}");
                            }
                        }
                    }
                    if replace {
                        registry
                            .replace_mock_response(port, &mock.id, &response)
                            .with_context(|| format!("Failed to replace response of {}", mock.name))?;
                        summary.replaced += 1;
                        println!("          {GREEN}replaced{RESET}");
                    }
                }
                Err(RegistryError::Upstream(e)) => {
                    summary.errors += 1;
                    println!("  {RED}error{RESET}   {} {DIM}({e}){RESET}", mock.name);
                }
                Err(e) => return Err(e.into()),
            }
        }
        println!();
    }
    Ok(summary)
}

fn print_check_summary(summary: &CheckSummary) {
    println!("{BOLD}Drift Check Summary{RESET}");
    println!("  Checked:  {}", summary.checked);
    println!("  {}Drifted:  {}{}", RED, summary.drifted, RESET);
    println!("  {}Replaced: {}{}", GREEN, summary.replaced, RESET);
    println!("  {}Skipped:  {}{}", YELLOW, summary.skipped, RESET);
    println!("  {}Errors:   {}{}", RED, summary.errors, RESET);
}

fn lint(registry: &Registry, port: Option<u16>) -> Result<usize> {
    let mut total = 0;
    for port in selected_ports(registry, port)? {
        let result = registry.analyze(port)?;
        let label = registry.endpoint(port)?.config().label();
        if !result.has_warnings() {
            println!("{GREEN}✓{RESET} {label}: no issues");
            continue;
        }
        println!("{BOLD}{label}{RESET}");
        for warning in &result.warnings {
            println!(
                "  {YELLOW}{}{RESET} {}{}",
                warning.warning_type.as_str(),
                warning.message,
                warning
                    .shadowed_by
                    .as_ref()
                    .map(|id| format!(" {DIM}[by {id}]{RESET}"))
                    .unwrap_or_default()
            );
        }
        total += result.warnings.len();
    }
    Ok(total)
}
