//! JSON shapes of the ledger API and their validation into core records.
//!
//! Every record is deserialized on its own so one malformed row never hides
//! the rest of the stream.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ledgerlink_core::{
    AccountId, AccountRef, AccountType, BankAccountId, BankLink, BankTransaction,
    BankTransactionId, ExternalRef, Money, PaymentDirection, PlatformTransaction,
    PlatformTransactionId, ProcessorPayment, ProcessorPaymentId, RecordError, ScrapedLine,
    ScrapedLineId, TransactionKind, UserId,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use crate::source::{Fetched, RecordStream, SkippedRecord};

// ── Platform transactions ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WireAccount {
    pub id: Option<Value>,
    #[serde(rename = "Account_Name", alias = "account_name")]
    pub name: Option<String>,
    #[serde(rename = "Account_Type", alias = "account_type")]
    pub account_type: Option<String>,
    pub bankaccount_id: Option<Value>,
    pub bankaccount: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct WireLink {
    pub id: Option<Value>,
    pub bankaccount_id: Option<Value>,
    pub bankaccount: Option<Value>,
}

/// Some ledger endpoints return the link list JSON-encoded inside a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireLinks {
    List(Vec<WireLink>),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
pub struct WirePlatformTransaction {
    pub id: Option<i64>,
    #[serde(rename = "Transaction_Type", alias = "transaction_type")]
    pub transaction_type: Option<String>,
    #[serde(rename = "Amount", alias = "amount")]
    pub amount: Option<Value>,
    #[serde(rename = "Date", alias = "date")]
    pub date: Option<String>,
    #[serde(rename = "Name", alias = "name")]
    pub name: Option<String>,
    #[serde(rename = "Notes", alias = "notes")]
    pub notes: Option<String>,
    #[serde(rename = "Added_By", alias = "added_by")]
    pub added_by: Option<Value>,
    #[serde(rename = "From_Account")]
    pub from_account: Option<Value>,
    #[serde(rename = "To_Account")]
    pub to_account: Option<Value>,
    pub from: Option<WireAccount>,
    pub to: Option<WireAccount>,
    pub related_bank_transaction: Option<WireLinks>,
}

impl TryFrom<WirePlatformTransaction> for PlatformTransaction {
    type Error = RecordError;

    fn try_from(w: WirePlatformTransaction) -> Result<Self, Self::Error> {
        let id = w.id.ok_or(RecordError::MissingField("id"))?;
        let kind: TransactionKind = w
            .transaction_type
            .as_deref()
            .ok_or(RecordError::MissingField("Transaction_Type"))?
            .parse()?;
        let amount = w
            .amount
            .as_ref()
            .ok_or(RecordError::MissingField("Amount"))
            .and_then(amount_from_value)?
            .abs();
        let date = parse_date(w.date.as_deref().ok_or(RecordError::MissingField("Date"))?)?;
        let links = match w.related_bank_transaction {
            Some(links) => parse_links(links)?,
            None => Vec::new(),
        };

        Ok(PlatformTransaction {
            id: PlatformTransactionId(id),
            kind,
            amount,
            date,
            from: account_ref(w.from, w.from_account.as_ref()),
            to: account_ref(w.to, w.to_account.as_ref()),
            links,
            notes: w.notes.filter(|n| !n.trim().is_empty()),
            name: w.name.filter(|n| !n.trim().is_empty()),
            added_by: w.added_by.as_ref().and_then(id_from_value).map(UserId),
        })
    }
}

fn account_ref(nested: Option<WireAccount>, flat_id: Option<&Value>) -> AccountRef {
    let flat = flat_id.and_then(id_from_value);
    match nested {
        Some(acct) => AccountRef {
            account_id: acct.id.as_ref().and_then(id_from_value).or(flat).map(AccountId),
            account_type: acct
                .account_type
                .as_deref()
                .and_then(|t| t.parse::<AccountType>().ok()),
            name: acct.name,
            bank_account_id: acct
                .bankaccount_id
                .as_ref()
                .or(acct.bankaccount.as_ref())
                .and_then(id_from_value)
                .map(BankAccountId),
        },
        None => AccountRef {
            account_id: flat.map(AccountId),
            account_type: None,
            name: None,
            bank_account_id: None,
        },
    }
}

fn parse_links(links: WireLinks) -> Result<Vec<BankLink>, RecordError> {
    let entries = match links {
        WireLinks::List(entries) => entries,
        WireLinks::Encoded(raw) if raw.trim().is_empty() => Vec::new(),
        WireLinks::Encoded(raw) => serde_json::from_str::<Vec<WireLink>>(&raw)
            .map_err(|e| RecordError::MalformedLinks(e.to_string()))?,
    };
    Ok(entries
        .into_iter()
        .filter_map(|l| {
            let bank_transaction_id = l.id.as_ref().and_then(id_from_value)?;
            Some(BankLink {
                bank_transaction_id: BankTransactionId(bank_transaction_id),
                bank_account_id: l
                    .bankaccount_id
                    .as_ref()
                    .or(l.bankaccount.as_ref())
                    .and_then(id_from_value)
                    .map(BankAccountId),
            })
        })
        .collect())
}

// ── Bank transactions ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WireBankTransaction {
    pub id: Option<i64>,
    pub transaction_id: Option<Value>,
    pub amount: Option<Value>,
    pub date: Option<String>,
    pub name: Option<String>,
    pub counterparty_name: Option<String>,
    pub bankaccount_id: Option<Value>,
    pub bankaccount: Option<Value>,
    #[serde(alias = "transaction_link", alias = "linked_transactions")]
    pub linked_transaction: Option<Value>,
}

impl TryFrom<WireBankTransaction> for BankTransaction {
    type Error = RecordError;

    fn try_from(w: WireBankTransaction) -> Result<Self, Self::Error> {
        let id = w.id.ok_or(RecordError::MissingField("id"))?;
        let amount = w
            .amount
            .as_ref()
            .ok_or(RecordError::MissingField("amount"))
            .and_then(amount_from_value)?;
        let date = parse_date(w.date.as_deref().ok_or(RecordError::MissingField("date"))?)?;
        let bank_account_id = w
            .bankaccount_id
            .as_ref()
            .or(w.bankaccount.as_ref())
            .and_then(id_from_value)
            .ok_or(RecordError::MissingField("bankaccount_id"))?;
        let external_ref = w.transaction_id.as_ref().and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(ExternalRef(s.trim().to_string())),
            Value::Number(n) => Some(ExternalRef(n.to_string())),
            _ => None,
        });

        Ok(BankTransaction {
            id: BankTransactionId(id),
            external_ref,
            amount,
            date,
            name: w.name.unwrap_or_default(),
            counterparty: w.counterparty_name.filter(|c| !c.trim().is_empty()),
            bank_account_id: BankAccountId(bank_account_id),
            linked_to: w
                .linked_transaction
                .as_ref()
                .and_then(linked_id)
                .map(PlatformTransactionId),
        })
    }
}

/// The link field is a bare id, an object, or a list of either; 0 and empty mean unlinked.
fn linked_id(value: &Value) -> Option<i64> {
    match value {
        Value::Array(items) => items.iter().find_map(linked_id),
        other => id_from_value(other).filter(|id| *id != 0),
    }
}

// ── Processor payments ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WireProcessorPayment {
    pub id: Option<i64>,
    pub amount: Option<Value>,
    pub direction: Option<String>,
    pub recipient: Option<Value>,
    pub description: Option<String>,
    #[serde(alias = "timestamp")]
    pub date: Option<i64>,
}

impl TryFrom<WireProcessorPayment> for ProcessorPayment {
    type Error = RecordError;

    fn try_from(w: WireProcessorPayment) -> Result<Self, Self::Error> {
        let id = w.id.ok_or(RecordError::MissingField("id"))?;
        let amount = w
            .amount
            .as_ref()
            .ok_or(RecordError::MissingField("amount"))
            .and_then(amount_from_value)?;
        let direction: PaymentDirection = w
            .direction
            .as_deref()
            .ok_or(RecordError::MissingField("direction"))?
            .parse()?;
        let timestamp =
            ProcessorPayment::from_epoch_millis(w.date.ok_or(RecordError::MissingField("date"))?)?;

        Ok(ProcessorPayment {
            id: ProcessorPaymentId(id),
            amount,
            direction,
            recipient: w.recipient.as_ref().and_then(id_from_value).map(UserId),
            description: w.description.unwrap_or_default(),
            timestamp,
        })
    }
}

// ── Scraped lines ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WireScrapedLine {
    pub id: Option<i64>,
    #[serde(rename = "Gross", alias = "gross")]
    pub gross: Option<Value>,
    #[serde(rename = "Net", alias = "net")]
    pub net: Option<Value>,
    #[serde(rename = "Type", alias = "type")]
    pub kind: Option<String>,
    #[serde(rename = "Source", alias = "source")]
    pub source: Option<String>,
    #[serde(rename = "Transaction Date", alias = "date")]
    pub date: Option<String>,
}

impl TryFrom<WireScrapedLine> for ScrapedLine {
    type Error = RecordError;

    fn try_from(w: WireScrapedLine) -> Result<Self, Self::Error> {
        let id = w.id.ok_or(RecordError::MissingField("id"))?;
        let gross = w
            .gross
            .as_ref()
            .ok_or(RecordError::MissingField("Gross"))
            .and_then(amount_from_value)?;
        let net = w
            .net
            .as_ref()
            .ok_or(RecordError::MissingField("Net"))
            .and_then(amount_from_value)?;
        let date = parse_date(
            w.date
                .as_deref()
                .ok_or(RecordError::MissingField("Transaction Date"))?,
        )?;

        Ok(ScrapedLine {
            id: ScrapedLineId(id),
            gross,
            net,
            kind: w.kind.unwrap_or_default().trim().to_lowercase(),
            source: w.source,
            date,
        })
    }
}

// ── Batch parsing ─────────────────────────────────────────────────────────────

/// Validates each raw record independently, collecting failures as skipped rows.
pub fn parse_records<W, T>(stream: RecordStream, values: Vec<Value>) -> Fetched<T>
where
    W: DeserializeOwned + TryInto<T, Error = RecordError>,
{
    let mut fetched = Fetched::default();
    for value in values {
        let id = value.get("id").and_then(id_from_value);
        let parsed = serde_json::from_value::<W>(value)
            .map_err(|e| e.to_string())
            .and_then(|w| w.try_into().map_err(|e: RecordError| e.to_string()));
        match parsed {
            Ok(record) => fetched.records.push(record),
            Err(reason) => {
                tracing::warn!("Skipping {stream} {id:?}: {reason}");
                fetched.skipped.push(SkippedRecord { stream, id, reason });
            }
        }
    }
    fetched
}

/// Pulls the record array out of a bare array or a `{"<key>": [...]}` envelope.
pub fn extract_array(document: Value, keys: &[&str]) -> Option<Vec<Value>> {
    match document {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => keys
            .iter()
            .chain(["data", "results"].iter())
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

// ── Scalars ───────────────────────────────────────────────────────────────────

fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("id").and_then(id_from_value),
        _ => None,
    }
}

pub fn amount_from_value(value: &Value) -> Result<Money, RecordError> {
    match value {
        Value::Number(n) => parse_amount(&n.to_string()),
        Value::String(s) => parse_amount(s),
        other => Err(RecordError::InvalidAmount(other.to_string())),
    }
}

/// Accepts plain decimals, `$` and thousands separators, and accounting parentheses.
pub fn parse_amount(s: &str) -> Result<Money, RecordError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned = s.replace([',', '$', ' '], "");
    let mut dec = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| RecordError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(Money::from_decimal(dec))
}

/// Calendar date from a plain date or any of the timestamp shapes the ledger emits.
pub fn parse_date(s: &str) -> Result<NaiveDate, RecordError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    for fmt in &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    for fmt in &["%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(RecordError::InvalidDate(s.to_string()))
}
