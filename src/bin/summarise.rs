//! Summarise membership payments in an OFX bank statement.
//!
//! Combines every transfer whose reference matches the membership format
//! into a pair of transactions at the end of each calendar month: one for
//! subscriptions (up to the minimum payment) and one for donations (above
//! it). The result is written as a series of OFX files.
//!
//! # Usage
//!
//! ```bash
//! summarise --min-sub 5 --since-date 2024-01-01 statement.ofx out/
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use chrono::{NaiveDate, Utc};
use clap::Parser;
use env_logger::Env;
use lhs_accounting_tools::summary::parse_since_date;
use lhs_accounting_tools::{
    filter_since, ofx, split_batches, MatchRule, Money, Result, Summariser, SummaryConfig,
    ToolError,
};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "summarise",
    version,
    about = "Summarise membership payments in an OFX bank statement before reconciliation"
)]
struct Cli {
    /// Minimum subscription amount (£)
    #[arg(long, default_value = "5")]
    min_sub: Money,

    /// Maximum number of transactions in a single output file
    #[arg(long, default_value_t = 200)]
    max_output_size: usize,

    /// Only emit transactions on or after this date (membership payments
    /// before it are still counted)
    #[arg(long, value_parser = parse_since_date)]
    since_date: Option<NaiveDate>,

    /// Drop uncleared transactions carrying a provisional bank id
    #[arg(long)]
    skip_provisional: bool,

    /// OFX statement to read
    input: PathBuf,

    /// Directory to write the summarised OFX files to
    output_dir: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let output_dir = cli.output_dir;
    if output_dir.is_dir() && contains_ofx(&output_dir)? {
        return Err(ToolError::OutputExists(output_dir));
    }

    info!("Parsing...");
    let data = fs::read(&cli.input)?;
    let mut statement = ofx::parse(&data)?;

    info!("Processing...");
    let mut transactions = std::mem::take(&mut statement.transactions);
    if cli.skip_provisional {
        let before = transactions.len();
        transactions.retain(|t| !t.is_provisional());
        let skipped = before - transactions.len();
        if skipped > 0 {
            warn!("Skipped {} provisional transaction(s)", skipped);
        }
    }

    let summariser = Summariser::new(SummaryConfig::new(
        cli.min_sub,
        MatchRule::MembershipReference,
    ));
    let entries = filter_since(summariser.summarise(transactions), cli.since_date);
    let batches = split_batches(entries, cli.max_output_size)?;

    fs::create_dir_all(&output_dir)?;
    let now = Utc::now().naive_utc();
    let mut taken = HashSet::new();
    for batch in &batches {
        let Some(first) = batch.first() else {
            continue;
        };
        let path = output_path(&output_dir, first.date(), &mut taken);
        fs::write(&path, ofx::write_statement(&statement, batch, now))?;
        debug!("Wrote {} transactions to {}", batch.len(), path.display());
    }

    info!(
        "Complete. Wrote {} output file(s) to {}.",
        batches.len(),
        output_dir.display()
    );
    Ok(())
}

fn contains_ofx(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ofx = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("ofx"))
            .unwrap_or(false);
        if is_ofx {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `<date>.ofx`, or `<date>-N.ofx` if an earlier batch started the same day.
fn output_path(dir: &Path, date: NaiveDate, taken: &mut HashSet<String>) -> PathBuf {
    let stem = date.format("%Y-%m-%d").to_string();
    let mut name = format!("{}.ofx", stem);
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{}-{}.ofx", stem, n);
        n += 1;
    }
    taken.insert(name.clone());
    dir.join(name)
}
