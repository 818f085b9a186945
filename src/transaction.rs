//! Transaction models shared by the OFX and GoCardless pipelines.

use crate::money::Money;
use chrono::{Datelike, Days, NaiveDate};
use std::fmt;

/// Read-only view of a source record, as seen by the summariser.
///
/// Implemented by every source record type so that unmatched records can be
/// passed through in their original form.
pub trait Contribution {
    /// Calendar date the money moved.
    fn date(&self) -> NaiveDate;

    /// Signed amount.
    fn amount(&self) -> Money;

    /// Free-text reference searched for a membership identifier.
    fn reference(&self) -> &str;
}

/// A source-independent transaction record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub date: NaiveDate,

    pub amount: Money,

    /// Payment reference as entered by the payer
    pub reference: String,

    pub payee: String,

    /// Source-specific identifier (payment id, FITID, ...)
    pub id: String,
}

impl Contribution for RawTransaction {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn amount(&self) -> Money {
        self.amount
    }

    fn reference(&self) -> &str {
        &self.reference
    }
}

/// Calendar month key.
///
/// Displays as `YYYY-M` (month not zero padded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Self {
        Month { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Last day of the month, or `None` for an out-of-range month.
    pub fn last_day(&self) -> Option<NaiveDate> {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)?.checked_sub_days(Days::new(1))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.month)
    }
}

/// Which half of a contribution a summary carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Portion up to the minimum membership fee.
    Subscription,

    /// Portion above the minimum membership fee.
    Donation,
}

impl Category {
    fn id_prefix(&self) -> &'static str {
        match self {
            Category::Subscription => "SUBSUMMARY",
            Category::Donation => "DONATESUMMARY",
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            Category::Subscription => "subscriptions",
            Category::Donation => "donations",
        }
    }
}

/// A synthetic transaction carrying one month's total for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTransaction {
    pub month: Month,

    pub category: Category,

    pub amount: Money,

    /// Date of the latest contribution in the month.
    pub date: NaiveDate,

    /// Number of contributions folded into the total.
    pub count: usize,
}

impl OutputTransaction {
    /// Stable identifier, e.g. `SUBSUMMARY20243`.
    pub fn id(&self) -> String {
        format!(
            "{}{}{}",
            self.category.id_prefix(),
            self.month.year,
            self.month.month
        )
    }

    /// Human-readable description, e.g.
    /// `Bank transfer subscriptions for 2024-3 (3 payments)`.
    pub fn description(&self) -> String {
        format!(
            "Bank transfer {} for {} ({} payments)",
            self.category.plural(),
            self.month,
            self.count
        )
    }
}

/// One element of the summarised output sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<T> {
    /// A record whose reference did not match, unchanged.
    PassThrough(T),

    /// A monthly total.
    Summary(OutputTransaction),
}

impl<T: Contribution> Entry<T> {
    pub fn date(&self) -> NaiveDate {
        match self {
            Entry::PassThrough(t) => t.date(),
            Entry::Summary(s) => s.date,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            Entry::PassThrough(t) => t.amount(),
            Entry::Summary(s) => s.amount,
        }
    }

    pub fn as_summary(&self) -> Option<&OutputTransaction> {
        match self {
            Entry::Summary(s) => Some(s),
            Entry::PassThrough(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_last_day() {
        assert_eq!(Month::new(2024, 2).last_day(), Some(date(2024, 2, 29)));
        assert_eq!(Month::new(2023, 2).last_day(), Some(date(2023, 2, 28)));
        assert_eq!(Month::new(2024, 12).last_day(), Some(date(2024, 12, 31)));
        assert_eq!(Month::new(2024, 4).last_day(), Some(date(2024, 4, 30)));
        assert_eq!(Month::new(2024, 13).last_day(), None);
    }

    #[test]
    fn test_month_ordering_and_display() {
        let march = Month::from_date(date(2024, 3, 17));
        assert_eq!(march, Month::new(2024, 3));
        assert!(Month::new(2023, 12) < march);
        assert_eq!(march.to_string(), "2024-3");
    }

    #[test]
    fn test_output_transaction_naming() {
        let sub = OutputTransaction {
            month: Month::new(2024, 3),
            category: Category::Subscription,
            amount: Money::from_major(15),
            date: date(2024, 3, 28),
            count: 3,
        };
        assert_eq!(sub.id(), "SUBSUMMARY20243");
        assert_eq!(
            sub.description(),
            "Bank transfer subscriptions for 2024-3 (3 payments)"
        );

        let donation = OutputTransaction {
            category: Category::Donation,
            ..sub
        };
        assert_eq!(donation.id(), "DONATESUMMARY20243");
        assert!(donation.description().starts_with("Bank transfer donations"));
    }

    #[test]
    fn test_entry_accessors() {
        let raw = RawTransaction {
            date: date(2024, 3, 2),
            amount: Money::from_major(40),
            reference: "RENT".to_string(),
            payee: "Landlord".to_string(),
            id: "1".to_string(),
        };
        let entry = Entry::PassThrough(raw);
        assert_eq!(entry.date(), date(2024, 3, 2));
        assert_eq!(entry.amount(), Money::from_major(40));
        assert!(entry.as_summary().is_none());
    }
}
