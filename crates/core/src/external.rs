//! Records observed outside the platform ledger: bank activity, processor
//! payments and scraped statement lines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::account::{BankAccountId, UserId};
use super::money::Money;
use super::transaction::{PlatformTransactionId, RecordError};

/// Internal correlation id of a bank record. Never accepted by the link command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankTransactionId(pub i64);

impl fmt::Display for BankTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The bank feed's own transaction reference, the only key the ledger links by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalRef(pub String);

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: BankTransactionId,
    pub external_ref: Option<ExternalRef>,
    /// Signed: positive leaves the account, negative arrives.
    pub amount: Money,
    pub date: NaiveDate,
    pub name: String,
    pub counterparty: Option<String>,
    pub bank_account_id: BankAccountId,
    /// Set when the ledger already links this record to a platform transaction.
    pub linked_to: Option<PlatformTransactionId>,
}

impl BankTransaction {
    pub fn description(&self, include_counterparty: bool) -> String {
        match (&self.counterparty, include_counterparty) {
            (Some(cp), true) if !cp.trim().is_empty() => format!("{} {}", self.name, cp),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorPaymentId(pub i64);

impl fmt::Display for ProcessorPaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentDirection {
    Outgoing,
    Incoming,
}

impl FromStr for PaymentDirection {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OUTGOING" => Ok(PaymentDirection::Outgoing),
            "INCOMING" => Ok(PaymentDirection::Incoming),
            other => Err(RecordError::InvalidDirection(other.to_string())),
        }
    }
}

/// A payment-processor ("checkbook") record corroborating a received transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorPayment {
    pub id: ProcessorPaymentId,
    pub amount: Money,
    pub direction: PaymentDirection,
    pub recipient: Option<UserId>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl ProcessorPayment {
    pub fn from_epoch_millis(millis: i64) -> Result<DateTime<Utc>, RecordError> {
        DateTime::from_timestamp_millis(millis).ok_or(RecordError::InvalidTimestamp(millis))
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScrapedLineId(pub i64);

impl fmt::Display for ScrapedLineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A statement line scraped from a processor (PayPal, Play+) portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedLine {
    pub id: ScrapedLineId,
    pub gross: Money,
    pub net: Money,
    pub kind: String,
    pub source: Option<String>,
    pub date: NaiveDate,
}

impl ScrapedLine {
    /// Scrapers disagree on sign conventions, so only magnitudes are compared.
    pub fn gross_abs(&self) -> Money {
        self.gross.abs()
    }

    pub fn net_abs(&self) -> Money {
        self.net.abs()
    }

    pub fn fee(&self) -> Money {
        self.gross_abs() - self.net_abs()
    }
}
