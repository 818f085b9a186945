//! Error types shared by both tools.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors that can occur while converting statements or fetching payments.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Failed to open, read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The input statement could not be parsed
    #[error("OFX error: {0}")]
    Ofx(#[from] OfxError),

    /// Transport-level failure talking to the payment provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The payment provider rejected a request
    #[error("GoCardless API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A page from the payment provider did not match the expected schema
    #[error("Malformed API response: {0}")]
    Json(#[from] serde_json::Error),

    /// Only sterling payments are supported
    #[error("Unexpected currency {currency} on {id} (only GBP is supported)")]
    UnexpectedCurrency { id: String, currency: String },

    /// `until` date lies before `from` date
    #[error("Invalid date range: until date {until} is before from date {from}")]
    InvalidDateRange { from: String, until: String },

    /// Batch size must be at least one
    #[error("Invalid maximum output size {0}: must be at least 1")]
    InvalidBatchSize(usize),

    /// Unparseable date argument or field
    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    /// Access token was supplied but empty
    #[error("Missing GoCardless access token (pass --access-token or set GOCARDLESS_ACCESS_TOKEN)")]
    MissingAccessToken,

    /// Output directory already holds OFX files from an earlier run
    #[error("OFX files already exist in the output directory ({}). Aborting to avoid confusion.", .0.display())]
    OutputExists(PathBuf),
}

/// Errors raised while reading an OFX statement.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OfxError {
    /// No `<OFX>` element was found
    #[error("input does not look like an OFX file")]
    NotOfx,

    /// The file holds no bank statement
    #[error("no bank statement found")]
    NoStatement,

    /// Only single-statement files are supported
    #[error("expected exactly one statement, found {0}")]
    MultipleStatements(usize),

    /// A mandatory element is missing
    #[error("missing required field {field} {context}")]
    MissingField { field: &'static str, context: String },

    /// A date element could not be parsed
    #[error("invalid date '{0}'")]
    InvalidDate(String),

    /// An amount element could not be parsed
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
}

/// Errors raised while parsing a money amount.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MoneyError {
    /// Not a decimal number
    #[error("invalid amount '{0}'")]
    Invalid(String),

    /// Amounts are whole pence; anything finer would have to be rounded
    #[error("amount '{0}' has more than 2 decimal places")]
    TooPrecise(String),
}
