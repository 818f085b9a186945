//! Monthly membership summariser.
//!
//! Folds every contribution carrying a membership reference into a per-month
//! bucket, splitting each one into a subscription part (capped at the minimum
//! fee) and a donation part (the rest). Records without a reference pass
//! through untouched.
//!
//! The split is applied per contribution and the parts are then summed, so
//! `£3 + £8` with a £5 minimum gives `£8` subscriptions and `£3` donations,
//! not the `£5`/`£6` a split of the monthly total would give.

use crate::error::{Result, ToolError};
use crate::money::Money;
use crate::reference::parse_reference;
use crate::transaction::{Category, Contribution, Entry, Month, OutputTransaction};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::collections::BTreeMap;

/// How records are recognised as membership contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Only records whose reference contains a membership number.
    MembershipReference,

    /// Every record. Used for sources that only carry membership payments.
    All,
}

/// Summariser settings.
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Minimum membership fee; anything above it counts as a donation.
    pub minimum: Money,

    pub rule: MatchRule,
}

impl SummaryConfig {
    pub fn new(minimum: Money, rule: MatchRule) -> Self {
        SummaryConfig { minimum, rule }
    }
}

/// Splits one contribution into `(subscription, donation)`.
///
/// The subscription part never exceeds `minimum`, and the two parts always
/// add back up to `amount`.
pub fn split_contribution(amount: Money, minimum: Money) -> (Money, Money) {
    let subscription = amount.min(minimum);
    (subscription, amount - subscription)
}

/// Running totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthBucket {
    pub subscription: Money,

    pub donation: Money,

    /// Number of contributions folded in.
    pub count: usize,

    /// Latest contribution date seen in the month.
    pub last_date: NaiveDate,
}

impl MonthBucket {
    fn new(date: NaiveDate) -> Self {
        MonthBucket {
            subscription: Money::ZERO,
            donation: Money::ZERO,
            count: 0,
            last_date: date,
        }
    }

    fn add(&mut self, date: NaiveDate, amount: Money, minimum: Money) {
        let (subscription, donation) = split_contribution(amount, minimum);
        self.subscription += subscription;
        self.donation += donation;
        self.count += 1;
        if date > self.last_date {
            self.last_date = date;
        }
    }

    /// Total of all contributions in the month.
    pub fn total(&self) -> Money {
        self.subscription + self.donation
    }

    /// Converts the finished bucket into at most two summary transactions,
    /// skipping any category whose total is zero.
    pub fn into_outputs(self, month: Month) -> Vec<OutputTransaction> {
        [
            (Category::Subscription, self.subscription),
            (Category::Donation, self.donation),
        ]
        .into_iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(category, amount)| OutputTransaction {
            month,
            category,
            amount,
            date: self.last_date,
            count: self.count,
        })
        .collect()
    }
}

/// The membership summariser.
///
/// Stateless between calls: the same input always yields the same output.
pub struct Summariser {
    config: SummaryConfig,
}

impl Summariser {
    /// Creates a summariser with the given settings.
    pub fn new(config: SummaryConfig) -> Self {
        Summariser { config }
    }

    /// Returns the membership identifier for a record, or `None` if the
    /// record is not a membership contribution.
    pub fn classify<T: Contribution>(&self, record: &T) -> Option<String> {
        match self.config.rule {
            MatchRule::MembershipReference => parse_reference(record.reference()),
            MatchRule::All => Some(record.reference().to_string()),
        }
    }

    /// Aggregates matching records into month buckets, ignoring the rest.
    pub fn buckets<T: Contribution>(&self, records: &[T]) -> BTreeMap<Month, MonthBucket> {
        let mut buckets: BTreeMap<Month, MonthBucket> = BTreeMap::new();

        for record in records {
            if self.classify(record).is_none() {
                continue;
            }
            let date = record.date();
            buckets
                .entry(Month::from_date(date))
                .or_insert_with(|| MonthBucket::new(date))
                .add(date, record.amount(), self.config.minimum);
        }

        buckets
    }

    /// Summarises a full statement.
    ///
    /// Records are ordered by date (ties keep their input order). Each month's
    /// summary transactions follow the last record of that month, so the
    /// result stays chronological.
    pub fn summarise<T: Contribution>(&self, mut records: Vec<T>) -> Vec<Entry<T>> {
        records.sort_by_key(|r| r.date());

        let mut output = Vec::with_capacity(records.len());
        let mut current: Option<(Month, Option<MonthBucket>)> = None;

        for record in records {
            let date = record.date();
            let month = Month::from_date(date);

            if !matches!(current, Some((open, _)) if open == month) {
                if let Some((done, bucket)) = current.take() {
                    Self::flush(done, bucket, &mut output);
                }
                current = Some((month, None));
            }

            match self.classify(&record) {
                Some(member) => {
                    debug!(
                        "{}: {} from member {} counted towards {}",
                        date,
                        record.amount(),
                        member,
                        month
                    );
                    if let Some((_, bucket)) = current.as_mut() {
                        bucket
                            .get_or_insert_with(|| MonthBucket::new(date))
                            .add(date, record.amount(), self.config.minimum);
                    }
                }
                None => {
                    debug!("{}: passing through '{}'", date, record.reference());
                    output.push(Entry::PassThrough(record));
                }
            }
        }

        if let Some((done, bucket)) = current {
            Self::flush(done, bucket, &mut output);
        }

        output
    }

    fn flush<T>(month: Month, bucket: Option<MonthBucket>, output: &mut Vec<Entry<T>>) {
        let Some(bucket) = bucket else {
            return;
        };
        info!(
            "Generated summary transactions for {} ({} payments)",
            month, bucket.count
        );
        output.extend(bucket.into_outputs(month).into_iter().map(Entry::Summary));
    }
}

/// Parses a cutoff given as a date or a date-time; only the date is kept.
pub fn parse_since_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
        .ok_or_else(|| ToolError::InvalidDate(s.to_string()))
}

/// Drops entries dated strictly before `since`.
///
/// Applied to the summarised output only: contributions before the cutoff
/// still count towards their month's totals.
pub fn filter_since<T: Contribution>(entries: Vec<Entry<T>>, since: Option<NaiveDate>) -> Vec<Entry<T>> {
    match since {
        None => entries,
        Some(cutoff) => entries.into_iter().filter(|e| e.date() >= cutoff).collect(),
    }
}
