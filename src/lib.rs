//! # LHS Accounting Tools
//!
//! Bookkeeping helpers that collapse many small membership payments into
//! monthly totals before they reach the accounts.
//!
//! - `summarise` reads an OFX bank statement, folds every transfer quoting a
//!   membership reference into a monthly subscriptions transaction and a
//!   monthly donations transaction, and writes the result back out as OFX.
//! - `gocardless-journals` pulls collected direct debits and payout fees from
//!   the GoCardless API and writes one Xero manual journal per month.
//!
//! ## Design Principles
//!
//! - **Fixed-point arithmetic**: amounts are `rust_decimal` values held to 2
//!   decimal places, never floats
//! - **Split, then sum**: each payment is split into subscription and donation
//!   parts before monthly totals are taken
//! - **Nothing dropped**: every input record is either aggregated or passed
//!   through unchanged
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use lhs_accounting_tools::{MatchRule, Money, RawTransaction, Summariser, SummaryConfig};
//!
//! let payment = |day, pence| RawTransaction {
//!     date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
//!     amount: Money::from_minor(pence),
//!     reference: "J SMITH HS01234".to_string(),
//!     payee: String::new(),
//!     id: day.to_string(),
//! };
//!
//! let summariser = Summariser::new(SummaryConfig::new(
//!     Money::from_major(5),
//!     MatchRule::MembershipReference,
//! ));
//! let entries = summariser.summarise(vec![payment(1, 500), payment(2, 500), payment(3, 800)]);
//!
//! let totals: Vec<String> = entries.iter().map(|e| e.amount().to_string()).collect();
//! assert_eq!(totals, ["15.00", "3.00"]);
//! ```

pub mod batch;
pub mod error;
pub mod gocardless;
pub mod journal;
pub mod money;
pub mod ofx;
pub mod reference;
pub mod summary;
pub mod transaction;

pub use batch::split_batches;
pub use error::{MoneyError, OfxError, Result, ToolError};
pub use gocardless::{DateRange, Environment, GoCardlessClient, Page, Payment, Payout, PayoutFee};
pub use journal::{build_journals, write_journals, MonthJournal};
pub use money::Money;
pub use ofx::{OfxElement, OfxStatement, OfxTransaction};
pub use reference::parse_reference;
pub use summary::{filter_since, split_contribution, MatchRule, MonthBucket, Summariser, SummaryConfig};
pub use transaction::{Category, Contribution, Entry, Month, OutputTransaction, RawTransaction};
