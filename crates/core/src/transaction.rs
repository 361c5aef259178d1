use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::account::{AccountRef, BankAccountId, Side, UserId};
use super::external::BankTransactionId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformTransactionId(pub i64);

impl fmt::Display for PlatformTransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Received,
    Returned,
    Transfer,
    Deposit,
    Withdrawal,
    Fees,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Received => write!(f, "received"),
            TransactionKind::Returned => write!(f, "returned"),
            TransactionKind::Transfer => write!(f, "transfer"),
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdrawal => write!(f, "withdrawal"),
            TransactionKind::Fees => write!(f, "fees"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "received" => Ok(TransactionKind::Received),
            "returned" => Ok(TransactionKind::Returned),
            "transfer" => Ok(TransactionKind::Transfer),
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "fees" | "fee" => Ok(TransactionKind::Fees),
            other => Err(RecordError::UnknownKind(other.to_string())),
        }
    }
}

/// A link the ledger already holds between a platform transaction and a bank record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankLink {
    pub bank_transaction_id: BankTransactionId,
    pub bank_account_id: Option<BankAccountId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformTransaction {
    pub id: PlatformTransactionId,
    pub kind: TransactionKind,
    /// Always positive; direction is carried by `from` / `to`.
    pub amount: Money,
    pub date: NaiveDate,
    pub from: AccountRef,
    pub to: AccountRef,
    pub links: Vec<BankLink>,
    pub notes: Option<String>,
    /// Counterparty label (the casino for deposits and withdrawals).
    pub name: Option<String>,
    pub added_by: Option<UserId>,
}

impl PlatformTransaction {
    pub fn account(&self, side: Side) -> &AccountRef {
        match side {
            Side::From => &self.from,
            Side::To => &self.to,
        }
    }

    pub fn is_linked(&self) -> bool {
        !self.links.is_empty()
    }

    /// Existing links that settle the given bank account.
    pub fn links_for(&self, bank_account_id: BankAccountId) -> impl Iterator<Item = &BankLink> {
        self.links
            .iter()
            .filter(move |l| l.bank_account_id == Some(bank_account_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Unknown transaction kind: {0}")]
    UnknownKind(String),
    #[error("Invalid direction: {0}")]
    InvalidDirection(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
    #[error("Malformed link list: {0}")]
    MalformedLinks(String),
}
