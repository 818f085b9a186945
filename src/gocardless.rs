//! GoCardless API access.
//!
//! Blocking client for the two list endpoints the journal tool needs, plus
//! conversion of the provider's payment and payout records into the crate's
//! own types. Any transport, status or schema failure aborts the run.

use crate::error::{Result, ToolError};
use crate::money::Money;
use crate::transaction::RawTransaction;
use chrono::{DateTime, Days, NaiveDate, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// API version header value the response schema below matches.
pub const API_VERSION: &str = "2015-07-06";

/// Records requested per page (the API maximum).
pub const PAGE_SIZE: usize = 500;

/// Which GoCardless environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Live,
    Sandbox,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Live => "https://api.gocardless.com",
            Environment::Sandbox => "https://api-sandbox.gocardless.com",
        }
    }
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    until: NaiveDate,
}

impl DateRange {
    /// Fails if `until` is before `from`.
    pub fn new(from: NaiveDate, until: NaiveDate) -> Result<Self> {
        if until < from {
            return Err(ToolError::InvalidDateRange {
                from: from.to_string(),
                until: until.to_string(),
            });
        }
        Ok(DateRange { from, until })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn until(&self) -> NaiveDate {
        self.until
    }

    /// Start of the day after `until`, as an RFC 3339 timestamp.
    fn end_exclusive_timestamp(&self) -> String {
        let next = self
            .until
            .checked_add_days(Days::new(1))
            .unwrap_or(self.until);
        format!("{}T00:00:00.000Z", next)
    }

    fn start_timestamp(&self) -> String {
        format!("{}T00:00:00.000Z", self.from)
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    pub after: Option<String>,
}

/// Requests pages until the provider reports no further cursor, returning
/// every record in page-then-record order.
pub fn fetch_all<T, F>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<&str>) -> Result<Page<T>>,
{
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(cursor.as_deref())?;
        pages += 1;
        debug!("Page {}: {} records", pages, page.items.len());
        records.extend(page.items);

        match page.after {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }

    Ok(records)
}

/// A payment as returned by `GET /payments`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payment {
    pub id: String,
    /// Amount in pence.
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub charge_date: NaiveDate,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub links: PaymentLinks,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PaymentLinks {
    #[serde(default)]
    pub mandate: Option<String>,
}

impl Payment {
    /// Whether the money has actually been collected.
    pub fn is_collected(&self) -> bool {
        matches!(self.status.as_str(), "confirmed" | "paid_out")
    }

    pub fn into_transaction(self) -> Result<RawTransaction> {
        ensure_gbp(&self.id, &self.currency)?;
        let reference = self
            .reference
            .or(self.links.mandate)
            .unwrap_or_default();
        Ok(RawTransaction {
            date: self.charge_date,
            amount: Money::from_minor(self.amount),
            reference,
            payee: "GoCardless".to_string(),
            id: self.id,
        })
    }
}

/// A payout as returned by `GET /payouts`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Payout {
    pub id: String,
    pub amount: i64,
    /// Fees GoCardless kept back, in pence.
    pub deducted_fees: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Payout {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

/// Fees deducted from one payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutFee {
    pub id: String,
    pub date: NaiveDate,
    pub fees: Money,
}

fn ensure_gbp(id: &str, currency: &str) -> Result<()> {
    if currency != "GBP" {
        return Err(ToolError::UnexpectedCurrency {
            id: id.to_string(),
            currency: currency.to_string(),
        });
    }
    Ok(())
}

/// Keeps collected payments and converts them; fails on non-sterling ones.
pub fn collected_payments(payments: Vec<Payment>) -> Result<Vec<RawTransaction>> {
    let mut transactions = Vec::with_capacity(payments.len());
    for payment in payments {
        if !payment.is_collected() {
            debug!("Skipping payment {} with status {}", payment.id, payment.status);
            continue;
        }
        transactions.push(payment.into_transaction()?);
    }
    Ok(transactions)
}

/// Keeps paid payouts and extracts their fees; fails on non-sterling ones.
pub fn paid_payout_fees(payouts: Vec<Payout>) -> Result<Vec<PayoutFee>> {
    let mut fees = Vec::with_capacity(payouts.len());
    for payout in payouts {
        if !payout.is_paid() {
            debug!("Skipping payout {} with status {}", payout.id, payout.status);
            continue;
        }
        ensure_gbp(&payout.id, &payout.currency)?;
        fees.push(PayoutFee {
            date: payout.created_at.date_naive(),
            fees: Money::from_minor(payout.deducted_fees),
            id: payout.id,
        });
    }
    Ok(fees)
}

#[derive(Debug, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    cursors: Cursors,
}

#[derive(Debug, Deserialize)]
struct PaymentsResponse {
    payments: Vec<Payment>,
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct PayoutsResponse {
    payouts: Vec<Payout>,
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Pulls the provider's error message out of a failure body, falling back to
/// the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// GoCardless API client (blocking).
pub struct GoCardlessClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl GoCardlessClient {
    /// Creates a client for the given environment.
    pub fn new(token: &str, environment: Environment) -> Result<Self> {
        Self::with_base_url(token, environment.base_url())
    }

    /// Creates a client against an explicit API root.
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(ToolError::MissingAccessToken);
        }

        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("lhs-accounting-tools/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(GoCardlessClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }

    fn get_page<R: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        after: Option<&str>,
    ) -> Result<R> {
        let mut query = params.to_vec();
        query.push(("limit", PAGE_SIZE.to_string()));
        if let Some(cursor) = after {
            query.push(("after", cursor.to_string()));
        }

        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("GoCardless-Version", API_VERSION)
            .query(&query)
            .send()?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(ToolError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Lists payments charged within the range (inclusive).
    pub fn list_payments(&self, range: &DateRange) -> Result<Vec<Payment>> {
        let params = [
            ("charge_date[gte]", range.from().to_string()),
            ("charge_date[lte]", range.until().to_string()),
        ];
        let payments = fetch_all(|after| {
            let resp: PaymentsResponse = self.get_page("/payments", &params, after)?;
            Ok(Page {
                items: resp.payments,
                after: resp.meta.cursors.after,
            })
        })?;
        info!("Fetched {} payments", payments.len());
        Ok(payments)
    }

    /// Lists payouts created within the range, including the whole of the
    /// `until` day.
    pub fn list_payouts(&self, range: &DateRange) -> Result<Vec<Payout>> {
        let params = [
            ("created_at[gte]", range.start_timestamp()),
            ("created_at[lt]", range.end_exclusive_timestamp()),
        ];
        let payouts = fetch_all(|after| {
            let resp: PayoutsResponse = self.get_page("/payouts", &params, after)?;
            Ok(Page {
                items: resp.payouts,
                after: resp.meta.cursors.after,
            })
        })?;
        info!("Fetched {} payouts", payouts.len());
        Ok(payouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(id: &str, pence: i64, status: &str, currency: &str) -> Payment {
        Payment {
            id: id.to_string(),
            amount: pence,
            currency: currency.to_string(),
            status: status.to_string(),
            charge_date: date(2024, 3, 4),
            reference: Some(format!("HS{}", id)),
            links: PaymentLinks::default(),
        }
    }

    #[test]
    fn test_fetch_all_pages_in_order() {
        let sizes = [100usize, 100, 40];
        let mut calls: Vec<Option<String>> = Vec::new();

        let records = fetch_all(|after| {
            calls.push(after.map(String::from));
            let index = calls.len() - 1;
            let start: usize = sizes[..index].iter().sum();
            Ok(Page {
                items: (start..start + sizes[index]).collect(),
                after: (index + 1 < sizes.len()).then(|| format!("cursor{}", index + 1)),
            })
        })
        .unwrap();

        assert_eq!(records.len(), 240);
        assert_eq!(records, (0..240).collect::<Vec<usize>>());
        assert_eq!(
            calls,
            vec![None, Some("cursor1".to_string()), Some("cursor2".to_string())]
        );
    }

    #[test]
    fn test_fetch_all_aborts_on_error() {
        let mut calls = 0;
        let result: Result<Vec<u32>> = fetch_all(|_| {
            calls += 1;
            if calls == 2 {
                return Err(ToolError::Api {
                    status: 401,
                    message: "unauthorised".to_string(),
                });
            }
            Ok(Page {
                items: vec![1, 2],
                after: Some("next".to_string()),
            })
        });

        assert!(matches!(result, Err(ToolError::Api { status: 401, .. })));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_empty_cursor_ends_listing() {
        let records = fetch_all(|_| {
            Ok(Page {
                items: vec!['a'],
                after: Some(String::new()),
            })
        })
        .unwrap();
        assert_eq!(records, vec!['a']);
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).is_ok());
        assert!(DateRange::new(date(2024, 3, 1), date(2024, 3, 1)).is_ok());
        assert!(matches!(
            DateRange::new(date(2024, 3, 2), date(2024, 3, 1)),
            Err(ToolError::InvalidDateRange { .. })
        ));
    }

    #[test]
    fn test_payout_window_covers_until_day() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(range.start_timestamp(), "2024-01-01T00:00:00.000Z");
        assert_eq!(range.end_exclusive_timestamp(), "2024-02-01T00:00:00.000Z");
    }

    #[test]
    fn test_collected_payments_filters_status() {
        let payments = vec![
            payment("1", 500, "confirmed", "GBP"),
            payment("2", 800, "paid_out", "GBP"),
            payment("3", 500, "failed", "GBP"),
            payment("4", 500, "pending_submission", "EUR"),
        ];
        let txs = collected_payments(payments).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].amount, Money::from_major(5));
        assert_eq!(txs[0].reference, "HS1");
        assert_eq!(txs[1].amount, Money::from_major(8));
        assert_eq!(txs[1].payee, "GoCardless");
    }

    #[test]
    fn test_non_gbp_is_fatal() {
        let result = collected_payments(vec![payment("9", 500, "confirmed", "EUR")]);
        assert!(matches!(
            result,
            Err(ToolError::UnexpectedCurrency { ref currency, .. }) if currency == "EUR"
        ));
    }

    #[test]
    fn test_payments_page_deserialises() {
        let body = r#"{
            "payments": [
                {
                    "id": "PM123",
                    "created_at": "2024-03-01T10:00:00.000Z",
                    "charge_date": "2024-03-04",
                    "amount": 1000,
                    "currency": "GBP",
                    "status": "paid_out",
                    "reference": null,
                    "metadata": {},
                    "links": { "mandate": "MD42", "creditor": "CR1" }
                }
            ],
            "meta": { "cursors": { "before": null, "after": "PM123" }, "limit": 500 }
        }"#;
        let resp: PaymentsResponse = serde_json::from_str(body).unwrap();

        assert_eq!(resp.meta.cursors.after.as_deref(), Some("PM123"));
        let tx = resp.payments[0].clone().into_transaction().unwrap();
        assert_eq!(tx.date, date(2024, 3, 4));
        assert_eq!(tx.amount, Money::from_major(10));
        assert_eq!(tx.reference, "MD42");
    }

    #[test]
    fn test_payouts_page_deserialises() {
        let body = r#"{
            "payouts": [
                {
                    "id": "PO1",
                    "amount": 9500,
                    "deducted_fees": 500,
                    "currency": "GBP",
                    "status": "paid",
                    "created_at": "2024-03-31T23:30:00.000Z",
                    "arrival_date": "2024-04-02"
                },
                {
                    "id": "PO2",
                    "amount": 100,
                    "deducted_fees": 20,
                    "currency": "GBP",
                    "status": "pending",
                    "created_at": "2024-03-15T09:00:00.000Z"
                }
            ],
            "meta": { "cursors": { "before": null, "after": null }, "limit": 500 }
        }"#;
        let resp: PayoutsResponse = serde_json::from_str(body).unwrap();
        assert!(resp.meta.cursors.after.is_none());

        let fees = paid_payout_fees(resp.payouts).unwrap();
        assert_eq!(fees.len(), 1);
        assert_eq!(fees[0].date, date(2024, 3, 31));
        assert_eq!(fees[0].fees, Money::from_major(5));
    }

    #[test]
    fn test_malformed_page_is_an_error() {
        let result: std::result::Result<PaymentsResponse, _> =
            serde_json::from_str(r#"{"payments": [{"id": 1}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"message":"Invalid token","type":"invalid_api_usage","code":401}}"#;
        assert_eq!(api_error_message(body), "Invalid token");
        assert_eq!(api_error_message(" Bad Gateway "), "Bad Gateway");
    }

    #[test]
    fn test_blank_token_rejected() {
        assert!(matches!(
            GoCardlessClient::new("  ", Environment::Live),
            Err(ToolError::MissingAccessToken)
        ));
    }

    // ── HTTP ──────────────────────────────────────────────────────────────────

    fn payment_json(id: &str, pence: i64) -> serde_json::Value {
        json!({
            "id": id,
            "created_at": "2024-03-01T10:00:00.000Z",
            "charge_date": "2024-03-04",
            "amount": pence,
            "currency": "GBP",
            "status": "confirmed",
            "reference": format!("HS{}", id),
            "links": { "mandate": "MD1" }
        })
    }

    fn march() -> DateRange {
        DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap()
    }

    #[test]
    fn test_list_payments_follows_cursors() {
        let server = MockServer::start();

        let page1 = server.mock(|when, then| {
            when.method(GET)
                .path("/payments")
                .header("Authorization", "Bearer test_token")
                .header("GoCardless-Version", API_VERSION)
                .query_param("charge_date[gte]", "2024-03-01")
                .query_param("charge_date[lte]", "2024-03-31")
                .query_param("limit", "500")
                .query_param_missing("after");
            then.status(200).json_body(json!({
                "payments": [payment_json("PM1", 500), payment_json("PM2", 800)],
                "meta": { "cursors": { "before": null, "after": "PM2" }, "limit": 500 }
            }));
        });
        let page2 = server.mock(|when, then| {
            when.method(GET)
                .path("/payments")
                .query_param("limit", "500")
                .query_param("after", "PM2");
            then.status(200).json_body(json!({
                "payments": [payment_json("PM3", 500)],
                "meta": { "cursors": { "before": "PM3", "after": "PM3" }, "limit": 500 }
            }));
        });
        let page3 = server.mock(|when, then| {
            when.method(GET)
                .path("/payments")
                .query_param("after", "PM3");
            then.status(200).json_body(json!({
                "payments": [payment_json("PM4", 1000)],
                "meta": { "cursors": { "before": "PM4", "after": null }, "limit": 500 }
            }));
        });

        let client = GoCardlessClient::with_base_url("test_token", &server.base_url()).unwrap();
        let payments = client.list_payments(&march()).unwrap();

        page1.assert();
        page2.assert();
        page3.assert();
        let ids: Vec<&str> = payments.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["PM1", "PM2", "PM3", "PM4"]);
        assert_eq!(payments[3].amount, 1000);
    }

    #[test]
    fn test_list_payouts_window() {
        let server = MockServer::start();

        let listing = server.mock(|when, then| {
            when.method(GET)
                .path("/payouts")
                .header("Authorization", "Bearer test_token")
                .header("GoCardless-Version", API_VERSION)
                .query_param("created_at[gte]", "2024-03-01T00:00:00.000Z")
                .query_param("created_at[lt]", "2024-04-01T00:00:00.000Z")
                .query_param("limit", "500");
            then.status(200).json_body(json!({
                "payouts": [{
                    "id": "PO1",
                    "amount": 9500,
                    "deducted_fees": 500,
                    "currency": "GBP",
                    "status": "paid",
                    "created_at": "2024-03-31T23:30:00.000Z"
                }],
                "meta": { "cursors": { "before": null, "after": null }, "limit": 500 }
            }));
        });

        let client = GoCardlessClient::with_base_url("test_token", &server.base_url()).unwrap();
        let payouts = client.list_payouts(&march()).unwrap();

        listing.assert();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].deducted_fees, 500);
    }

    #[test]
    fn test_auth_failure_reports_provider_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/payments");
            then.status(401).json_body(json!({
                "error": {
                    "message": "The access token you've used is not a valid live API access token",
                    "type": "invalid_api_usage",
                    "code": 401
                }
            }));
        });

        let client = GoCardlessClient::with_base_url("bad_token", &server.base_url()).unwrap();
        let err = client.list_payments(&march()).unwrap_err();

        match err {
            ToolError::Api { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("not a valid live API access token"), "message: {}", message);
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_page_fails_listing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/payouts");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"payouts": [{"id": "PO1"}], "meta": {}}"#);
        });

        let client = GoCardlessClient::with_base_url("test_token", &server.base_url()).unwrap();
        assert!(matches!(
            client.list_payouts(&march()),
            Err(ToolError::Json(_))
        ));
    }
}
