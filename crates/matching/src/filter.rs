//! Candidate predicates shared by the engine and the diagnostic reasoner.
//!
//! Every predicate is evaluated even after one fails, so an outcome can
//! explain exactly which criteria a bank record missed.

use chrono::NaiveDate;
use ledgerlink_core::{
    day_offset, AccountRef, BankTransaction, BankTransactionId, DateWindow, Money,
    PlatformTransaction,
};
use serde::Serialize;
use std::collections::HashSet;

use crate::config::{BankSign, CompiledLeg, LegKeywords};
use crate::consumption::ClaimView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum KeywordOutcome {
    /// The leg has no keyword list.
    Skipped,
    Matched { keyword: String },
    Failed,
    /// Casino-keyed leg, but no keywords are configured for this casino.
    NoKeywordsFor { casino: String },
}

impl KeywordOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, KeywordOutcome::Skipped | KeywordOutcome::Matched { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateOutcome {
    pub account: bool,
    pub amount: bool,
    pub date: bool,
    pub keyword: KeywordOutcome,
    pub day_offset: u32,
}

impl PredicateOutcome {
    pub fn passed(&self) -> bool {
        self.account && self.amount && self.date && self.keyword.passed()
    }
}

/// Signed bank amount has the leg's sign and the platform magnitude, within tolerance.
pub fn amount_matches(platform_amount: Money, bank_amount: Money, sign: BankSign, tolerance: Money) -> bool {
    sign.accepts(bank_amount) && bank_amount.approx_eq(sign.expected(platform_amount), tolerance)
}

pub fn date_matches(platform_date: NaiveDate, bank_date: NaiveDate, window: DateWindow) -> bool {
    window.contains(platform_date, bank_date)
}

pub fn account_matches(account: &AccountRef, bt: &BankTransaction) -> bool {
    account.bank_account_id == Some(bt.bank_account_id)
}

pub fn keyword_matches(leg: &CompiledLeg, tx: &PlatformTransaction, bt: &BankTransaction) -> KeywordOutcome {
    let set = match &leg.keywords {
        LegKeywords::None => return KeywordOutcome::Skipped,
        LegKeywords::Fixed(set) => set,
        LegKeywords::ByCasino(casinos) => {
            let casino = tx.name.as_deref().unwrap_or("");
            match casinos.get(casino) {
                Some(set) => set,
                None => {
                    return KeywordOutcome::NoKeywordsFor {
                        casino: casino.to_string(),
                    }
                }
            }
        }
    };
    match set.first_match(&bt.description(leg.include_counterparty)) {
        Some(keyword) => KeywordOutcome::Matched {
            keyword: keyword.to_string(),
        },
        None => KeywordOutcome::Failed,
    }
}

pub fn evaluate(
    tx: &PlatformTransaction,
    bt: &BankTransaction,
    leg: &CompiledLeg,
    window: DateWindow,
    tolerance: Money,
) -> PredicateOutcome {
    PredicateOutcome {
        account: account_matches(tx.account(leg.side), bt),
        amount: amount_matches(tx.amount, bt.amount, leg.sign, tolerance),
        date: date_matches(tx.date, bt.date, window),
        keyword: keyword_matches(leg, tx, bt),
        day_offset: day_offset(tx.date, bt.date),
    }
}

#[derive(Debug, Clone)]
pub struct Candidate<'r> {
    pub bank: &'r BankTransaction,
    pub outcome: PredicateOutcome,
}

/// Bank records that pass every predicate for one leg, best first: exact date,
/// then smallest day offset, then lowest id. Claimed records and `taken` ids
/// are excluded before any predicate runs.
pub fn candidates<'r>(
    tx: &PlatformTransaction,
    leg: &CompiledLeg,
    window: DateWindow,
    tolerance: Money,
    pool: &[&'r BankTransaction],
    claims: &dyn ClaimView,
    taken: &HashSet<BankTransactionId>,
) -> Vec<Candidate<'r>> {
    let mut found: Vec<Candidate<'r>> = pool
        .iter()
        .copied()
        .filter(|bt| claims.bank_claim(bt.id).is_none() && !taken.contains(&bt.id))
        .map(|bt| Candidate {
            bank: bt,
            outcome: evaluate(tx, bt, leg, window, tolerance),
        })
        .filter(|c| c.outcome.passed())
        .collect();
    found.sort_by_key(|c| (c.outcome.day_offset, c.bank.id));
    found
}
