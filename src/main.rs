use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use gridscraper::{
    config::AppConfig,
    duck::Store,
    fetch::{ContentFetcher, LocatorResolver, PolitenessGate},
    pipeline::Pipeline,
    source::Period,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gridscraper")]
#[command(author, version, about = "Japanese power market and grid data ingestion")]
struct Cli {
    /// YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, parse and store every month in the range
    Ingest {
        /// Source id; repeatable. All registered sources when omitted.
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_day)]
        start: NaiveDate,

        /// Last day of the range (YYYY-MM-DD)
        #[arg(long, value_parser = parse_day)]
        end: NaiveDate,

        /// DuckDB file; beats DB_PATH and the config file
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the per-period outcomes as JSON on stdout
        #[arg(long)]
        summary_json: bool,
    },

    /// List registered sources
    Sources,
}

fn parse_day(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("{s:?}: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    let default = if cli.verbose { "debug" } else { "info" };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when the run finished but not every period succeeded.
async fn run(cli: Cli) -> Result<bool> {
    // ─── 2) config + registry ────────────────────────────────────────
    let mut cfg = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Sources => {
            let registry = cfg.registry()?;
            for s in registry.iter() {
                println!(
                    "{:<16} {:<18} {:<14} {}",
                    s.id,
                    s.table,
                    format!("{:?}", s.content_kind),
                    s.locator_template
                );
            }
            Ok(true)
        }
        Command::Ingest {
            sources,
            start,
            end,
            db,
            summary_json,
        } => {
            if start > end {
                bail!("--start {start} is after --end {end}");
            }
            cfg.apply_overrides(db);
            let registry = cfg.registry()?;
            let ids: Vec<String> = if sources.is_empty() {
                registry.iter().map(|s| s.id.clone()).collect()
            } else {
                sources
            };
            let periods = Period::range_inclusive(Period::from_date(start), Period::from_date(end));
            info!(
                sources = ids.len(),
                periods = periods.len(),
                db = %cfg.store.path.display(),
                "starting ingest"
            );

            // ─── 3) cancellation ─────────────────────────────────────
            let cancel = Arc::new(AtomicBool::new(false));
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received; finishing the current period");
                        cancel.store(true, Ordering::SeqCst);
                    }
                }
            });

            // ─── 4) run ──────────────────────────────────────────────
            let mut store = Store::open(&cfg.store.path)
                .with_context(|| format!("opening store {}", cfg.store.path.display()))?;
            let fetcher = ContentFetcher::new(
                &cfg.http,
                LocatorResolver::for_today(),
                PolitenessGate::new(cfg.politeness.min_secs, cfg.politeness.max_secs),
            )?;
            let summary = Pipeline::new(fetcher, &mut store, &registry, cancel)
                .run(&ids, &periods)
                .await?;
            store.close().context("closing store")?;

            // ─── 5) report ───────────────────────────────────────────
            if summary_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            for o in summary.outcomes.iter().filter(|o| !o.is_success()) {
                for (p, e) in &o.errors {
                    error!(source = %o.source_id, period = %p, kind = e.name(), "{e}");
                }
            }
            Ok(summary.is_success())
        }
    }
}
