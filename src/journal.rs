//! Xero manual-journal CSV output for GoCardless collections.
//!
//! One balanced journal per month: the clearing account receives the net
//! payout, fees are expensed, and the gross collections are credited to the
//! membership and donation income accounts.

use crate::error::{Result, ToolError};
use crate::gocardless::PayoutFee;
use crate::money::Money;
use crate::summary::MonthBucket;
use crate::transaction::Month;
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// Column names Xero's manual journal import expects.
pub const CSV_FIELDS: [&str; 10] = [
    "*Narration",
    "*Date",
    "Description",
    "*AccountCode",
    "*TaxRate",
    "*Amount",
    "TrackingName1",
    "TrackingOption1",
    "TrackingName2",
    "TrackingOption2",
];

// Account codes from the chart of accounts.
pub const FEES_ACCOUNT: &str = "404";
pub const MEMBERSHIP_ACCOUNT: &str = "201";
pub const DONATIONS_ACCOUNT: &str = "200";
pub const CLEARING_ACCOUNT: &str = "GOCARDLESS";

const TAX_RATE: &str = "No VAT";

/// One month's GoCardless activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthJournal {
    pub month: Month,
    /// Last day of the month.
    pub date: NaiveDate,
    pub membership: Money,
    pub donations: Money,
    pub fees: Money,
}

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalLine {
    pub narration: String,
    pub date: String,
    pub description: String,
    pub account_code: String,
    pub tax_rate: String,
    pub amount: Money,
    pub tracking_name1: String,
    pub tracking_option1: String,
    pub tracking_name2: String,
    pub tracking_option2: String,
}

impl JournalLine {
    fn new(description: &str, account_code: &str, amount: Money) -> Self {
        JournalLine {
            narration: String::new(),
            date: String::new(),
            description: description.to_string(),
            account_code: account_code.to_string(),
            tax_rate: TAX_RATE.to_string(),
            amount,
            tracking_name1: String::new(),
            tracking_option1: String::new(),
            tracking_name2: String::new(),
            tracking_option2: String::new(),
        }
    }
}

impl MonthJournal {
    /// Net amount paid out into the bank.
    pub fn clearing(&self) -> Money {
        self.membership + self.donations - self.fees
    }

    pub fn narration(&self) -> String {
        format!("GoCardless membership payments for {}", self.month)
    }

    /// Journal lines; the first carries the narration and date, and
    /// zero-amount lines after it are left out.
    pub fn lines(&self) -> Vec<JournalLine> {
        let mut head = JournalLine::new("GoCardless", CLEARING_ACCOUNT, self.clearing());
        head.narration = self.narration();
        head.date = self.date.format("%Y-%m-%d").to_string();

        let rest = [
            JournalLine::new("GoCardless fees", FEES_ACCOUNT, self.fees),
            JournalLine::new(
                "GoCardless membership subscriptions",
                MEMBERSHIP_ACCOUNT,
                -self.membership,
            ),
            JournalLine::new(
                "GoCardless membership donations",
                DONATIONS_ACCOUNT,
                -self.donations,
            ),
        ];

        std::iter::once(head)
            .chain(rest.into_iter().filter(|line| !line.amount.is_zero()))
            .collect()
    }
}

/// Merges monthly payment totals with payout fees into one journal per
/// month that saw either.
pub fn build_journals(
    buckets: &BTreeMap<Month, MonthBucket>,
    fees: &[PayoutFee],
) -> Result<Vec<MonthJournal>> {
    let mut fees_by_month: BTreeMap<Month, Money> = BTreeMap::new();
    for fee in fees {
        *fees_by_month.entry(Month::from_date(fee.date)).or_default() += fee.fees;
    }

    let mut months: Vec<Month> = buckets.keys().chain(fees_by_month.keys()).copied().collect();
    months.sort();
    months.dedup();

    months
        .into_iter()
        .map(|month| -> Result<MonthJournal> {
            let date = month
                .last_day()
                .ok_or_else(|| ToolError::InvalidDate(month.to_string()))?;
            let (membership, donations) = buckets
                .get(&month)
                .map(|b| (b.subscription, b.donation))
                .unwrap_or((Money::ZERO, Money::ZERO));
            Ok(MonthJournal {
                month,
                date,
                membership,
                donations,
                fees: fees_by_month.get(&month).copied().unwrap_or(Money::ZERO),
            })
        })
        .collect()
}

/// Writes the journals as Xero import CSV.
pub fn write_journals<W: Write>(journals: &[MonthJournal], writer: W) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    csv_writer.write_record(CSV_FIELDS)?;
    for journal in journals {
        for line in journal.lines() {
            csv_writer.serialize(line)?;
        }
    }

    csv_writer.flush()?;
    Ok(())
}
