use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use ledgerlink_core::{DateRange, UserId};
use ledgerlink_ledger::SnapshotSource;
use ledgerlink_match::{casino_table_from_json, MatcherConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod batch;

/// Reconcile platform transactions against bank records, one player at a time.
#[derive(Parser, Debug)]
#[command(name = "ledgerlink")]
#[command(about = "Link platform transactions to the bank records that settle them", long_about = None)]
struct CliArgs {
    /// Directory holding one sub-directory of ledger exports per player
    #[arg(long, value_name = "DIR")]
    snapshots: PathBuf,

    /// Players to reconcile (default: every numeric sub-directory)
    #[arg(long = "player", value_name = "ID")]
    players: Vec<i64>,

    /// Matcher configuration overriding the built-in matchers
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Run only the named matchers
    #[arg(long = "matcher", value_name = "NAME")]
    matchers: Vec<String>,

    /// Casino keyword export from the ledger
    #[arg(long = "casino-keywords", value_name = "JSON")]
    casino_keywords: Option<PathBuf>,

    #[arg(long, value_name = "DATE", requires = "to")]
    from: Option<NaiveDate>,

    #[arg(long, value_name = "DATE", requires = "from")]
    to: Option<NaiveDate>,

    /// Players reconciled in parallel
    #[arg(
        long,
        value_name = "N",
        default_value_t = batch::DEFAULT_CONCURRENCY as u8,
        value_parser = clap::value_parser!(u8).range(1..=batch::MAX_CONCURRENCY as i64)
    )]
    concurrency: u8,

    /// Write the JSON report here instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

impl CliArgs {
    fn range(&self) -> anyhow::Result<Option<DateRange>> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => bail!("--from {from} is after --to {to}"),
            (Some(from), Some(to)) => Ok(Some(DateRange::new(from, to))),
            _ => Ok(None),
        }
    }

    fn matcher_config(&self) -> anyhow::Result<MatcherConfig> {
        let mut config = match &self.config {
            Some(path) => MatcherConfig::load(path)
                .with_context(|| format!("Failed to load matcher config {}", path.display()))?,
            None => MatcherConfig::default(),
        };
        if !self.matchers.is_empty() {
            config = config.restrict_to(&self.matchers)?;
        }
        if let Some(path) = &self.casino_keywords {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let table = casino_table_from_json(&json)
                .with_context(|| format!("Failed to parse casino keywords {}", path.display()))?;
            for (casino, keywords) in table {
                config.casino_keywords.entry(casino).or_default().extend(keywords);
            }
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    let range = args.range()?;
    let config = args
        .matcher_config()?
        .compile()
        .context("Invalid matcher configuration")?;

    let source = SnapshotSource::new(&args.snapshots);
    let players = if args.players.is_empty() {
        source
            .players()
            .with_context(|| format!("Failed to list players in {}", args.snapshots.display()))?
    } else {
        args.players.iter().copied().map(UserId).collect()
    };
    tracing::info!(
        "Reconciling {} player(s) with {} matcher(s)",
        players.len(),
        config.flavors.len()
    );

    let report = batch::run_batch(
        Arc::new(source),
        Arc::new(config),
        players,
        range,
        usize::from(args.concurrency),
    )
    .await;
    tracing::info!(
        "Done: {} player(s), {} failed, {} matched, {} unmatched",
        report.players.len(),
        report.failed.len(),
        report.matched(),
        report.unmatched()
    );

    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
