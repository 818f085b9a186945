//! Fetch GoCardless payments and payouts and emit a CSV of manual journals
//! (one per month) for import into Xero.
//!
//! # Usage
//!
//! ```bash
//! GOCARDLESS_ACCESS_TOKEN=... gocardless-journals \
//!     --from-date 2024-01-01 --until-date 2024-03-31 journals.csv
//! ```
//!
//! # Environment Variables
//!
//! - `GOCARDLESS_ACCESS_TOKEN`: read-only API token, if `--access-token` is not given
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use chrono::NaiveDate;
use clap::Parser;
use env_logger::Env;
use lhs_accounting_tools::gocardless::{collected_payments, paid_payout_fees};
use lhs_accounting_tools::{
    build_journals, write_journals, DateRange, Environment, GoCardlessClient, MatchRule, Money,
    Result, Summariser, SummaryConfig,
};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "gocardless-journals",
    version,
    about = "Fetch GoCardless transactions and emit monthly Xero manual journals as CSV"
)]
struct Cli {
    /// Date to start fetching transactions from (inclusive, YYYY-MM-DD)
    #[arg(long)]
    from_date: NaiveDate,

    /// Date to fetch transactions until (inclusive, YYYY-MM-DD)
    #[arg(long)]
    until_date: NaiveDate,

    /// Mandatory minimum membership fee (£)
    #[arg(long, default_value = "5")]
    min_membership: Money,

    /// GoCardless API read-only access token
    #[arg(long, env = "GOCARDLESS_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// GoCardless environment
    #[arg(long, value_enum, default_value_t = Environment::Live)]
    environment: Environment,

    /// CSV file to write
    output_csv: PathBuf,
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
    let range = DateRange::new(cli.from_date, cli.until_date)?;
    let client = GoCardlessClient::new(&cli.access_token, cli.environment)?;

    let payments = collected_payments(client.list_payments(&range)?)?;
    let fees = paid_payout_fees(client.list_payouts(&range)?)?;

    let summariser = Summariser::new(SummaryConfig::new(cli.min_membership, MatchRule::All));
    let buckets = summariser.buckets(&payments);
    let journals = build_journals(&buckets, &fees)?;

    let mut csv = Vec::new();
    write_journals(&journals, &mut csv)?;
    fs::write(&cli.output_csv, csv)?;

    info!(
        "Wrote {} monthly journal(s) from {} payments to {}",
        journals.len(),
        payments.len(),
        cli.output_csv.display()
    );
    Ok(())
}
