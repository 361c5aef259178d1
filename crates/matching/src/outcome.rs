use chrono::NaiveDate;
use ledgerlink_core::{
    BankAccountId, BankTransaction, BankTransactionId, Money, PlatformTransactionId,
    ProcessorPaymentId, ScrapedLine, Side,
};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Flavor;
use crate::filter::PredicateOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    /// The ledger already held the link.
    Direct,
    Discovered,
    /// Resolved among platform transactions sharing date, amount and account.
    DuplicateGroup,
}

/// One bank record settling one side of a platform transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub matcher: String,
    pub flavor: Flavor,
    pub platform: PlatformTransactionId,
    pub platform_date: NaiveDate,
    pub side: Side,
    pub bank: BankTransaction,
    pub payment: Option<ProcessorPaymentId>,
    /// Predicate evidence; absent for direct links.
    pub criteria: Option<PredicateOutcome>,
    pub origin: MatchOrigin,
}

/// A transfer whose scraped statement line shows a fee deducted in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreeWayMatch {
    pub matcher: String,
    pub platform: PlatformTransactionId,
    pub scraped: ScrapedLine,
    /// Absent in the fallback case where only the net arrival was found.
    pub gross_bank: Option<BankTransaction>,
    pub net_bank: Option<BankTransaction>,
    pub gross: Money,
    pub net: Money,
    pub fee: Money,
}

impl ThreeWayMatch {
    pub fn is_fallback(&self) -> bool {
        self.gross_bank.is_none()
    }
}

/// Several equally valid candidates where guessing is not allowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguityReport {
    pub matcher: String,
    pub platform: PlatformTransactionId,
    pub side: Side,
    pub candidates: Vec<BankTransactionId>,
}

/// Facts the engine learned while matching that only it can observe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum EngineNote {
    PaymentClaimed {
        bank: BankTransactionId,
        payment: ProcessorPaymentId,
        by: PlatformTransactionId,
    },
    LegsShareBankAccount {
        bank_account: BankAccountId,
    },
    AnchorMissing {
        anchor: Side,
    },
    LinkConflict {
        bank: BankTransactionId,
        by: PlatformTransactionId,
    },
    Ambiguous {
        side: Side,
        candidates: Vec<BankTransactionId>,
    },
    DuplicateGroup {
        members: Vec<PlatformTransactionId>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct FlavorOutcome {
    pub matcher: String,
    pub considered: usize,
    pub matches: Vec<Match>,
    pub three_way: Vec<ThreeWayMatch>,
    pub ambiguous: Vec<AmbiguityReport>,
    /// Still fully unmatched after every phase, in processing order.
    pub unmatched: Vec<PlatformTransactionId>,
    /// Linked to records outside the fetched data; nothing to do.
    pub settled: Vec<PlatformTransactionId>,
    pub notes: BTreeMap<PlatformTransactionId, Vec<EngineNote>>,
}

impl FlavorOutcome {
    pub fn new(matcher: &str) -> Self {
        FlavorOutcome {
            matcher: matcher.to_string(),
            ..Default::default()
        }
    }

    pub fn note(&mut self, platform: PlatformTransactionId, note: EngineNote) {
        self.notes.entry(platform).or_default().push(note);
    }

    pub fn notes_for(&self, platform: PlatformTransactionId) -> &[EngineNote] {
        self.notes.get(&platform).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Platform transactions with at least one match or a three-way match.
    pub fn matched_count(&self) -> usize {
        let mut ids: Vec<PlatformTransactionId> = self
            .matches
            .iter()
            .map(|m| m.platform)
            .chain(self.three_way.iter().map(|t| t.platform))
            .collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }
}
