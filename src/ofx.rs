//! OFX statement reading and writing.
//!
//! Reads bank statements in either OFX 1.x (SGML, leaf elements left
//! unclosed) or OFX 2.x (XML) form. Input is tokenised by tag rather than by
//! line so single-line XML files parse the same as the line-per-element SGML
//! files banks export.
//!
//! Writes OFX 2.2 XML. Transactions that pass through the summariser are
//! written back with every element they were read with, in the same order.

use crate::error::OfxError;
use crate::money::Money;
use crate::transaction::{Contribution, Entry, OutputTransaction};
use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use quick_xml::escape::{partial_escape, unescape};
use std::str::FromStr;

/// Barclays gives uncleared transactions temporary numeric FITIDs below this.
const PROVISIONAL_FITID_LIMIT: u64 = 200_900_000_000_000;

/// Aggregates that can appear inside `STMTTRN`. Every other tag there is a
/// leaf, even when SGML leaves its value out.
const TRANSACTION_AGGREGATES: [&str; 6] = [
    "PAYEE",
    "CURRENCY",
    "ORIGCURRENCY",
    "BANKACCTTO",
    "CCACCTTO",
    "IMAGEDATA",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfxAccount {
    pub bank_id: Option<String>,
    pub account_id: String,
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBalance {
    pub amount: Money,
    /// `DTASOF` exactly as read.
    pub as_of: String,
}

/// A single bank statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfxStatement {
    pub currency: Option<String>,
    pub account: OfxAccount,
    pub ledger_balance: Option<LedgerBalance>,
    pub transactions: Vec<OfxTransaction>,
}

/// A child element of a transaction (upper-case tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfxElement {
    Leaf(String, String),
    Aggregate(String, Vec<OfxElement>),
}

/// One `STMTTRN` element.
///
/// The typed fields are views over `elements`, which keeps every child in
/// file order (nested aggregates included) so the transaction can be written
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfxTransaction {
    pub trn_type: Option<String>,
    pub fit_id: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub name: Option<String>,
    pub memo: Option<String>,
    elements: Vec<OfxElement>,
}

fn leaf_value<'a>(elements: &'a [OfxElement], tag: &str) -> Option<&'a str> {
    elements.iter().find_map(|element| match element {
        OfxElement::Leaf(t, v) if t == tag => Some(v.as_str()),
        _ => None,
    })
}

impl OfxTransaction {
    /// Builds a transaction from its child elements.
    pub fn from_elements(elements: Vec<OfxElement>) -> Result<Self, OfxError> {
        let field = |tag: &str| leaf_value(&elements, tag).map(str::to_string);
        let missing = |field: &'static str| OfxError::MissingField {
            field,
            context: format!(
                "in transaction {}",
                leaf_value(&elements, "FITID").unwrap_or("<unknown>")
            ),
        };

        let posted = field("DTPOSTED").ok_or_else(|| missing("DTPOSTED"))?;
        let date = parse_ofx_date(&posted).ok_or(OfxError::InvalidDate(posted))?;
        let raw_amount = field("TRNAMT").ok_or_else(|| missing("TRNAMT"))?;
        let amount = parse_ofx_amount(&raw_amount).ok_or(OfxError::InvalidAmount(raw_amount))?;
        let fit_id = field("FITID").ok_or_else(|| missing("FITID"))?;

        Ok(OfxTransaction {
            trn_type: field("TRNTYPE"),
            fit_id,
            date,
            amount,
            name: field("NAME"),
            memo: field("MEMO"),
            elements,
        })
    }

    /// Child elements in file order.
    pub fn elements(&self) -> &[OfxElement] {
        &self.elements
    }

    /// `DTPOSTED` exactly as read.
    pub fn posted(&self) -> &str {
        leaf_value(&self.elements, "DTPOSTED").unwrap_or_default()
    }

    /// Whether the FITID is one of the temporary ids Barclays assigns to
    /// uncleared transactions.
    pub fn is_provisional(&self) -> bool {
        self.fit_id
            .trim()
            .parse::<u64>()
            .map(|id| id < PROVISIONAL_FITID_LIMIT)
            .unwrap_or(false)
    }
}

impl Contribution for OfxTransaction {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn amount(&self) -> Money {
        self.amount
    }

    /// Banks put the payer's reference in `NAME`; `MEMO` is used when it is
    /// absent or blank.
    fn reference(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.memo.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Open(String),
    Close(String),
    Text(&'a str),
}

fn tokenize(body: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find('<') {
        let text = rest[..start].trim();
        if !text.is_empty() {
            tokens.push(Token::Text(text));
        }

        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..end].trim();
        rest = &after[end + 1..];

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        if let Some(name) = tag.strip_prefix('/') {
            tokens.push(Token::Close(name.trim().to_ascii_uppercase()));
        } else if let Some(name) = tag.strip_suffix('/') {
            let name = name.trim().to_ascii_uppercase();
            tokens.push(Token::Open(name.clone()));
            tokens.push(Token::Close(name));
        } else {
            tokens.push(Token::Open(tag.to_ascii_uppercase()));
        }
    }

    let text = rest.trim();
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }

    tokens
}

#[derive(Default)]
struct StatementBuilder {
    statements: usize,
    currency: Option<String>,
    account: OfxAccount,
    in_account: bool,
    balance_amount: Option<String>,
    balance_as_of: Option<String>,
    in_ledger: bool,
    /// Open elements of the current transaction, `STMTTRN` at the bottom.
    trn: Vec<(String, Vec<OfxElement>)>,
    transactions: Vec<OfxTransaction>,
}

impl StatementBuilder {
    fn in_transaction(&self) -> bool {
        !self.trn.is_empty()
    }

    fn open(&mut self, name: &str) {
        if self.in_transaction() {
            self.trn.push((name.to_string(), Vec::new()));
            return;
        }
        match name {
            "STMTRS" => self.statements += 1,
            "STMTTRN" => self.trn.push((name.to_string(), Vec::new())),
            "BANKACCTFROM" => self.in_account = true,
            "LEDGERBAL" => self.in_ledger = true,
            _ => {}
        }
    }

    /// Pops the innermost open element into its parent.
    fn fold_innermost(&mut self) {
        if let Some((tag, children)) = self.trn.pop() {
            if let Some((_, parent)) = self.trn.last_mut() {
                parent.push(OfxElement::Aggregate(tag, children));
            }
        }
    }

    fn close(&mut self, name: &str) -> Result<(), OfxError> {
        if self.in_transaction() {
            let Some(pos) = self.trn.iter().rposition(|(tag, _)| tag == name) else {
                debug!("Ignoring unmatched </{}> in transaction", name);
                return Ok(());
            };
            // Anything still open inside it was left unclosed.
            while self.trn.len() > pos + 1 {
                self.fold_innermost();
            }
            if pos == 0 {
                if let Some((_, elements)) = self.trn.pop() {
                    self.transactions.push(OfxTransaction::from_elements(elements)?);
                }
            } else {
                self.fold_innermost();
            }
            return Ok(());
        }
        match name {
            "BANKACCTFROM" => self.in_account = false,
            "LEDGERBAL" => self.in_ledger = false,
            _ => {}
        }
        Ok(())
    }

    fn leaf(&mut self, name: &str, value: String) {
        if let Some((_, elements)) = self.trn.last_mut() {
            elements.push(OfxElement::Leaf(name.to_string(), value));
            return;
        }

        if self.in_account {
            match name {
                "BANKID" => self.account.bank_id = Some(value),
                "ACCTID" => self.account.account_id = value,
                "ACCTTYPE" => self.account.account_type = Some(value),
                _ => {}
            }
        } else if self.in_ledger {
            match name {
                "BALAMT" => self.balance_amount = Some(value),
                "DTASOF" => self.balance_as_of = Some(value),
                _ => {}
            }
        } else if name == "CURDEF" && self.currency.is_none() {
            self.currency = Some(value);
        }
    }

    fn finish(self) -> Result<OfxStatement, OfxError> {
        match self.statements {
            0 => return Err(OfxError::NoStatement),
            1 => {}
            n => return Err(OfxError::MultipleStatements(n)),
        }

        if self.account.account_id.is_empty() {
            return Err(OfxError::MissingField {
                field: "ACCTID",
                context: "in BANKACCTFROM".to_string(),
            });
        }

        let ledger_balance = match (self.balance_amount, self.balance_as_of) {
            (Some(amount), Some(as_of)) => Some(LedgerBalance {
                amount: parse_ofx_amount(&amount).ok_or(OfxError::InvalidAmount(amount))?,
                as_of,
            }),
            _ => None,
        };

        Ok(OfxStatement {
            currency: self.currency,
            account: self.account,
            ledger_balance,
            transactions: self.transactions,
        })
    }
}

/// Parses a single-statement OFX file.
pub fn parse(data: &[u8]) -> Result<OfxStatement, OfxError> {
    let content = String::from_utf8_lossy(data);
    let start = content
        .to_ascii_uppercase()
        .find("<OFX>")
        .ok_or(OfxError::NotOfx)?;

    let tokens = tokenize(&content[start..]);
    let mut builder = StatementBuilder::default();

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Open(name) => {
                if let Some(Token::Text(text)) = tokens.get(i + 1) {
                    builder.leaf(name, decode_entities(text));
                    i += 1;
                    // XML closes its leaves; SGML does not.
                    if matches!(tokens.get(i + 1), Some(Token::Close(close)) if close == name) {
                        i += 1;
                    }
                } else if builder.in_transaction()
                    && !TRANSACTION_AGGREGATES.contains(&name.as_str())
                {
                    // Empty leaf: SGML omits the value, XML closes it at once.
                    builder.leaf(name, String::new());
                    if matches!(tokens.get(i + 1), Some(Token::Close(close)) if close == name) {
                        i += 1;
                    }
                } else {
                    builder.open(name);
                }
            }
            Token::Close(name) => builder.close(name)?,
            Token::Text(_) => {}
        }
        i += 1;
    }

    builder.finish()
}

/// Parses an OFX date (`YYYYMMDD[HHMMSS[.XXX]][[gmt offset:tz]]`).
///
/// Only the date part is used.
pub fn parse_ofx_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let digits = s.get(0..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

fn parse_ofx_amount(s: &str) -> Option<Money> {
    let s = s.trim().replace(',', "");
    Money::from_str(&s).ok()
}

/// Resolves XML entities and character references. SGML exports often
/// carry a bare `&` or an HTML-only entity; such text is kept as written.
fn decode_entities(s: &str) -> String {
    match unescape(s) {
        Ok(text) => text.into_owned(),
        Err(err) => {
            debug!("Keeping {:?} unescaped: {}", s, err);
            s.to_string()
        }
    }
}

fn escape(s: &str) -> String {
    partial_escape(s).into_owned()
}

fn format_ofx_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Indented XML element writer.
struct OfxWriter {
    out: String,
    depth: usize,
}

impl OfxWriter {
    fn new() -> Self {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
        out.push_str(
            "<?OFX OFXHEADER=\"200\" VERSION=\"220\" SECURITY=\"NONE\" OLDFILEUID=\"NONE\" NEWFILEUID=\"NONE\"?>\n",
        );
        OfxWriter { out, depth: 0 }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        self.out.push_str(&format!("<{}>\n", tag));
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str(&format!("</{}>\n", tag));
    }

    fn leaf(&mut self, tag: &str, value: &str) {
        self.indent();
        self.out
            .push_str(&format!("<{}>{}</{}>\n", tag, escape(value), tag));
    }

    fn status_ok(&mut self) {
        self.open("STATUS");
        self.leaf("CODE", "0");
        self.leaf("SEVERITY", "INFO");
        self.close("STATUS");
    }

    fn summary(&mut self, summary: &OutputTransaction) {
        self.open("STMTTRN");
        self.leaf("TRNTYPE", "OTHER");
        self.leaf("DTPOSTED", &format_ofx_date(summary.date));
        self.leaf("TRNAMT", &summary.amount.to_string());
        self.leaf("FITID", &summary.id());
        self.leaf("NAME", &summary.description());
        self.close("STMTTRN");
    }

    fn element(&mut self, element: &OfxElement) {
        match element {
            OfxElement::Leaf(tag, value) => self.leaf(tag, value),
            OfxElement::Aggregate(tag, children) => {
                self.open(tag);
                for child in children {
                    self.element(child);
                }
                self.close(tag);
            }
        }
    }

    fn pass_through(&mut self, trn: &OfxTransaction) {
        self.open("STMTTRN");
        for element in trn.elements() {
            self.element(element);
        }
        self.close("STMTTRN");
    }

    fn finish(self) -> String {
        self.out
    }
}

fn entry_posted(entry: &Entry<OfxTransaction>) -> String {
    match entry {
        Entry::PassThrough(t) => t.posted().to_string(),
        Entry::Summary(s) => format_ofx_date(s.date),
    }
}

/// Renders one output file: the source statement's account and balance
/// around the given entries.
pub fn write_statement(
    source: &OfxStatement,
    entries: &[Entry<OfxTransaction>],
    now: NaiveDateTime,
) -> String {
    let mut w = OfxWriter::new();

    w.open("OFX");
    w.open("SIGNONMSGSRSV1");
    w.open("SONRS");
    w.status_ok();
    w.leaf("DTSERVER", &now.format("%Y%m%d%H%M%S").to_string());
    w.leaf("LANGUAGE", "ENG");
    w.close("SONRS");
    w.close("SIGNONMSGSRSV1");

    w.open("BANKMSGSRSV1");
    w.open("STMTTRNRS");
    w.leaf("TRNUID", "1");
    w.status_ok();
    w.open("STMTRS");
    w.leaf("CURDEF", source.currency.as_deref().unwrap_or("GBP"));

    w.open("BANKACCTFROM");
    if let Some(bank_id) = &source.account.bank_id {
        w.leaf("BANKID", bank_id);
    }
    w.leaf("ACCTID", &source.account.account_id);
    if let Some(account_type) = &source.account.account_type {
        w.leaf("ACCTTYPE", account_type);
    }
    w.close("BANKACCTFROM");

    w.open("BANKTRANLIST");
    if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
        w.leaf("DTSTART", &entry_posted(first));
        w.leaf("DTEND", &entry_posted(last));
    }
    for entry in entries {
        match entry {
            Entry::PassThrough(t) => w.pass_through(t),
            Entry::Summary(s) => w.summary(s),
        }
    }
    w.close("BANKTRANLIST");

    if let Some(balance) = &source.ledger_balance {
        w.open("LEDGERBAL");
        w.leaf("BALAMT", &balance.amount.to_string());
        w.leaf("DTASOF", &balance.as_of);
        w.close("LEDGERBAL");
    }

    w.close("STMTRS");
    w.close("STMTTRNRS");
    w.close("BANKMSGSRSV1");
    w.close("OFX");

    w.finish()
}
