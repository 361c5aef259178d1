use chrono::NaiveDate;
use ledgerlink_core::{
    AccountId, ExternalRef, Money, PlatformTransaction, PlatformTransactionId, TransactionKind,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Field-level changes to an existing platform transaction. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PlatformChanges {
    pub fn is_empty(&self) -> bool {
        *self == PlatformChanges::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlatformTransaction {
    pub kind: TransactionKind,
    pub amount: Money,
    pub date: NaiveDate,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub user: UserId,
    pub added_by: UserId,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Link,
    Update,
    Create,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Link => write!(f, "link"),
            CommandKind::Update => write!(f, "update"),
            CommandKind::Create => write!(f, "create"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Ledger rejected {kind}: {reason}")]
    Rejected { kind: CommandKind, reason: String },
    #[error("Platform transaction not found: {0}")]
    NotFound(PlatformTransactionId),
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Mutations the reconciliation core may request from the platform ledger.
pub trait LedgerCommands: Send + Sync {
    /// Links by the bank feed's reference; internal bank ids are not accepted.
    fn link_bank_transaction(
        &self,
        external_ref: &ExternalRef,
        platform: PlatformTransactionId,
    ) -> Result<(), CommandError>;

    fn update_platform_transaction(
        &self,
        id: PlatformTransactionId,
        changes: &PlatformChanges,
    ) -> Result<PlatformTransaction, CommandError>;

    fn create_platform_transaction(
        &self,
        fields: &NewPlatformTransaction,
    ) -> Result<PlatformTransaction, CommandError>;
}

/// One command as issued, in order. The dry-run output of a reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlannedCommand {
    LinkBankTransaction {
        external_ref: ExternalRef,
        platform: PlatformTransactionId,
    },
    UpdatePlatformTransaction {
        id: PlatformTransactionId,
        changes: PlatformChanges,
    },
    CreatePlatformTransaction {
        provisional_id: PlatformTransactionId,
        fields: NewPlatformTransaction,
    },
}

impl PlannedCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            PlannedCommand::LinkBankTransaction { .. } => CommandKind::Link,
            PlannedCommand::UpdatePlatformTransaction { .. } => CommandKind::Update,
            PlannedCommand::CreatePlatformTransaction { .. } => CommandKind::Create,
        }
    }
}
