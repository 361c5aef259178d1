//! Turning a three-way match into ledger commands.
//!
//! The original transfer is repointed at the clearing account for the gross
//! amount; a fee transaction and a net transfer then leave the clearing
//! account, so it nets to zero once all three exist.

use chrono::NaiveDate;
use ledgerlink_core::{
    money::CENT, AccountId, BankTransaction, BankTransactionId, ExternalRef, Money,
    PlatformTransaction, PlatformTransactionId, TransactionKind, UserId,
};
use ledgerlink_ledger::{
    CommandError, LedgerCommands, NewPlatformTransaction, PlatformChanges,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::config::SplitAccounts;
use crate::outcome::ThreeWayMatch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitPlan {
    pub platform: PlatformTransactionId,
    pub gross: Money,
    pub fee: Money,
    pub net: Money,
    pub update: PlatformChanges,
    pub fee_transaction: NewPlatformTransaction,
    pub net_transaction: NewPlatformTransaction,
    /// Linked to the original once it carries the gross amount.
    pub gross_link: Option<ExternalRef>,
    /// Linked to the new net transfer.
    pub net_link: Option<ExternalRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStep {
    UpdateOriginal,
    CreateFee,
    CreateNet,
    LinkGross,
    LinkNet,
}

impl fmt::Display for SplitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitStep::UpdateOriginal => write!(f, "update original"),
            SplitStep::CreateFee => write!(f, "create fee"),
            SplitStep::CreateNet => write!(f, "create net transfer"),
            SplitStep::LinkGross => write!(f, "link gross"),
            SplitStep::LinkNet => write!(f, "link net"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("No fee to split: gross {gross}, net {net}")]
    NoFee { gross: Money, net: Money },
    #[error("{0} has no destination account")]
    MissingDestination(PlatformTransactionId),
    #[error("Bank transaction {0} has no external reference")]
    MissingExternalRef(BankTransactionId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Updating {platform} failed, nothing applied: {source}")]
    Update {
        platform: PlatformTransactionId,
        #[source]
        source: CommandError,
    },
    /// The ledger now holds part of a split and needs manual follow-up.
    #[error("Split of {platform} left partial: {failed} failed after {applied:?}: {source}")]
    PartialSplit {
        platform: PlatformTransactionId,
        applied: Vec<SplitStep>,
        failed: SplitStep,
        #[source]
        source: CommandError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitOutcome {
    pub platform: PlatformTransactionId,
    pub fee_transaction: PlatformTransactionId,
    pub net_transaction: PlatformTransactionId,
    pub applied: Vec<SplitStep>,
}

fn link_ref(bank: Option<&BankTransaction>) -> Result<Option<ExternalRef>, SplitError> {
    match bank {
        None => Ok(None),
        Some(bt) => bt
            .external_ref
            .clone()
            .map(Some)
            .ok_or(SplitError::MissingExternalRef(bt.id)),
    }
}

fn append_note(existing: Option<&str>, note: &str) -> String {
    match existing.map(str::trim).filter(|s| !s.is_empty()) {
        Some(prev) => format!("{prev}\n{note}"),
        None => note.to_string(),
    }
}

/// Builds the commands that split `tx` into gross, fee and net.
///
/// Without a gross-side bank record the original is still repointed and the
/// scraped date is used; only the gross link is omitted.
pub fn plan_split(
    found: &ThreeWayMatch,
    tx: &PlatformTransaction,
    accounts: &SplitAccounts,
    player: UserId,
) -> Result<SplitPlan, SplitError> {
    let (gross, net) = (found.gross, found.net);
    let fee = gross - net;
    if fee <= CENT {
        return Err(SplitError::NoFee { gross, net });
    }
    let destination: AccountId = tx
        .to
        .account_id
        .ok_or(SplitError::MissingDestination(tx.id))?;

    let gross_link = link_ref(found.gross_bank.as_ref())?;
    let net_link = link_ref(found.net_bank.as_ref())?;
    let date: NaiveDate = found
        .gross_bank
        .as_ref()
        .map_or(found.scraped.date, |bt| bt.date);

    let note = format!(
        "System split: gross {gross}, fee {fee}, net {net} (scraped line {})",
        found.scraped.id
    );
    let created = |kind: TransactionKind, amount: Money, to: AccountId, what: &str| {
        NewPlatformTransaction {
            kind,
            amount,
            date,
            from_account: accounts.clearing_account,
            to_account: to,
            user: player,
            added_by: accounts.automation_user,
            notes: Some(format!("System created: {what} for {}", tx.id)),
        }
    };

    Ok(SplitPlan {
        platform: tx.id,
        gross,
        fee,
        net,
        update: PlatformChanges {
            amount: Some(gross),
            date: Some(date),
            to_account: Some(accounts.clearing_account),
            notes: Some(append_note(tx.notes.as_deref(), &note)),
            ..Default::default()
        },
        fee_transaction: created(
            TransactionKind::Fees,
            fee,
            accounts.fees_account,
            "transfer fee",
        ),
        net_transaction: created(TransactionKind::Transfer, net, destination, "net transfer"),
        gross_link,
        net_link,
    })
}

/// Issues the plan's commands in order and stops at the first failure.
pub fn execute_split(
    plan: &SplitPlan,
    commands: &dyn LedgerCommands,
) -> Result<SplitOutcome, ExecutionError> {
    commands
        .update_platform_transaction(plan.platform, &plan.update)
        .map_err(|source| ExecutionError::Update {
            platform: plan.platform,
            source,
        })?;
    let mut applied = vec![SplitStep::UpdateOriginal];

    let partial = |applied: &[SplitStep], failed: SplitStep, source: CommandError| {
        tracing::error!(
            "Split of {} left partial after {:?}: {} failed: {}",
            plan.platform,
            applied,
            failed,
            source
        );
        ExecutionError::PartialSplit {
            platform: plan.platform,
            applied: applied.to_vec(),
            failed,
            source,
        }
    };

    let fee = commands
        .create_platform_transaction(&plan.fee_transaction)
        .map_err(|e| partial(&applied, SplitStep::CreateFee, e))?;
    applied.push(SplitStep::CreateFee);

    let net = commands
        .create_platform_transaction(&plan.net_transaction)
        .map_err(|e| partial(&applied, SplitStep::CreateNet, e))?;
    applied.push(SplitStep::CreateNet);

    if let Some(gross_ref) = &plan.gross_link {
        commands
            .link_bank_transaction(gross_ref, plan.platform)
            .map_err(|e| partial(&applied, SplitStep::LinkGross, e))?;
        applied.push(SplitStep::LinkGross);
    }
    if let Some(net_ref) = &plan.net_link {
        commands
            .link_bank_transaction(net_ref, net.id)
            .map_err(|e| partial(&applied, SplitStep::LinkNet, e))?;
        applied.push(SplitStep::LinkNet);
    }

    tracing::info!(
        "Split {} into fee {} ({}) and net {} ({})",
        plan.platform,
        fee.id,
        plan.fee,
        net.id,
        plan.net
    );
    Ok(SplitOutcome {
        platform: plan.platform,
        fee_transaction: fee.id,
        net_transaction: net.id,
        applied,
    })
}
