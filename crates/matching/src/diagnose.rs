//! Explains why platform transactions stayed unmatched.
//!
//! The reasoner re-runs the engine's candidate filter with claims made during
//! the run hidden, so a record another platform transaction won still shows up
//! and can be named. Links that predate the run stay excluded.

use chrono::NaiveDate;
use ledgerlink_core::{
    BankAccountId, BankTransactionId, DateWindow, Money, PlatformTransaction,
    PlatformTransactionId, ProcessorPaymentId, Side,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::config::{CompiledFlavor, CompiledLeg};
use crate::consumption::{ClaimOrigin, ClaimView, ConsumptionLedger, PreexistingOnly};
use crate::filter::{candidates, evaluate, KeywordOutcome};
use crate::outcome::{EngineNote, FlavorOutcome};
use crate::payments::best_payment;
use crate::records::{BankIndex, PlayerRecords};

/// Which rule decided a duplicate group in favor of another member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    AddedByCounterpart,
    LowestId,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::AddedByCounterpart => write!(f, "the entry added by the player wins"),
            TieBreak::LowestId => write!(f, "the lowest id wins"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnmatchedReason {
    MissingBankAccount {
        side: Side,
    },
    NoBankTransactions {
        side: Side,
        bank_account: BankAccountId,
    },
    NoAmountMatch {
        side: Side,
        expected: Money,
    },
    OutsideWindow {
        side: Side,
        window: DateWindow,
        dates: Vec<NaiveDate>,
    },
    KeywordMismatch {
        side: Side,
        descriptions: Vec<String>,
    },
    NoCasinoKeywords {
        side: Side,
        casino: String,
    },
    BankClaimed {
        side: Side,
        bank: BankTransactionId,
        by: PlatformTransactionId,
        tie_break: Option<TieBreak>,
    },
    NoProcessorPayment {
        bank: BankTransactionId,
    },
    ProcessorPaymentClaimed {
        bank: BankTransactionId,
        payment: ProcessorPaymentId,
        by: PlatformTransactionId,
    },
    Ambiguous {
        side: Side,
        candidates: Vec<BankTransactionId>,
    },
    LegsShareBankAccount {
        bank_account: BankAccountId,
    },
    AnchorLegMissing {
        anchor: Side,
    },
    LinkConflict {
        bank: BankTransactionId,
        by: PlatformTransactionId,
    },
    NoCandidates,
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedReason::MissingBankAccount { side } => {
                write!(f, "No bank account on the {side} side")
            }
            UnmatchedReason::NoBankTransactions { bank_account, .. } => {
                write!(f, "No bank transactions found for account {bank_account}")
            }
            UnmatchedReason::NoAmountMatch { side, expected } => {
                write!(f, "No {side}-side bank transaction for amount {expected}")
            }
            UnmatchedReason::OutsideWindow {
                side,
                window,
                dates,
            } => write!(
                f,
                "{side}-side amount matched but outside the {window} window: {}",
                join(dates)
            ),
            UnmatchedReason::KeywordMismatch { side, descriptions } => write!(
                f,
                "{side}-side amount and date matched but keywords failed: {}",
                descriptions
                    .iter()
                    .map(|d| format!("'{d}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            UnmatchedReason::NoCasinoKeywords { casino, .. } => {
                write!(f, "No keywords configured for casino '{casino}'")
            }
            UnmatchedReason::BankClaimed {
                bank,
                by,
                tie_break,
                ..
            } => {
                write!(f, "Bank transaction {bank} was matched to {by}")?;
                if let Some(rule) = tie_break {
                    write!(f, " (duplicate group: {rule})")?;
                }
                Ok(())
            }
            UnmatchedReason::NoProcessorPayment { bank } => {
                write!(f, "Bank transaction {bank} has no matching processor payment")
            }
            UnmatchedReason::ProcessorPaymentClaimed { bank, payment, by } => write!(
                f,
                "Processor payment {payment} for bank transaction {bank} was used by {by}"
            ),
            UnmatchedReason::Ambiguous { side, candidates } => write!(
                f,
                "Multiple {side}-side candidates, needs manual review: {}",
                join(candidates)
            ),
            UnmatchedReason::LegsShareBankAccount { bank_account } => {
                write!(f, "Both legs resolved to bank account {bank_account}")
            }
            UnmatchedReason::AnchorLegMissing { anchor } => {
                write!(f, "Required {anchor}-side bank transaction not found")
            }
            UnmatchedReason::LinkConflict { bank, by } => {
                write!(f, "Linked bank transaction {bank} is already linked to {by}")
            }
            UnmatchedReason::NoCandidates => write!(f, "No candidates found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedTransaction {
    pub matcher: String,
    pub platform: PlatformTransactionId,
    pub date: NaiveDate,
    pub amount: Money,
    pub reasons: Vec<UnmatchedReason>,
}

impl UnmatchedTransaction {
    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

struct Reasoner<'a, 'r> {
    flavor: &'a CompiledFlavor,
    outcome: &'a FlavorOutcome,
    records: &'a PlayerRecords,
    index: &'a BankIndex<'r>,
    ledger: &'a ConsumptionLedger,
    tolerance: Money,
}

/// Reasons for every platform transaction `outcome` left unmatched, in the
/// engine's processing order.
pub fn diagnose(
    flavor: &CompiledFlavor,
    outcome: &FlavorOutcome,
    records: &PlayerRecords,
    index: &BankIndex<'_>,
    ledger: &ConsumptionLedger,
    tolerance: Money,
) -> Vec<UnmatchedTransaction> {
    let reasoner = Reasoner {
        flavor,
        outcome,
        records,
        index,
        ledger,
        tolerance,
    };
    outcome
        .unmatched
        .iter()
        .filter_map(|id| records.platform_by_id(*id))
        .map(|tx| UnmatchedTransaction {
            matcher: flavor.name.clone(),
            platform: tx.id,
            date: tx.date,
            amount: tx.amount,
            reasons: reasoner.reasons(tx),
        })
        .collect()
}

impl Reasoner<'_, '_> {
    fn reasons(&self, tx: &PlatformTransaction) -> Vec<UnmatchedReason> {
        let mut reasons: Vec<UnmatchedReason> = self
            .outcome
            .notes_for(tx.id)
            .iter()
            .filter_map(|note| match note {
                EngineNote::LinkConflict { bank, by } => Some(UnmatchedReason::LinkConflict {
                    bank: *bank,
                    by: *by,
                }),
                EngineNote::Ambiguous { side, candidates } => Some(UnmatchedReason::Ambiguous {
                    side: *side,
                    candidates: candidates.clone(),
                }),
                EngineNote::LegsShareBankAccount { bank_account } => {
                    Some(UnmatchedReason::LegsShareBankAccount {
                        bank_account: *bank_account,
                    })
                }
                EngineNote::AnchorMissing { anchor } => {
                    Some(UnmatchedReason::AnchorLegMissing { anchor: *anchor })
                }
                EngineNote::PaymentClaimed { .. } | EngineNote::DuplicateGroup { .. } => None,
            })
            .collect();

        for leg in &self.flavor.legs {
            if let Some(reason) = self.leg_reason(tx, leg) {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }

        if reasons.is_empty() {
            reasons.push(UnmatchedReason::NoCandidates);
        }
        reasons
    }

    /// The first predicate stage at which every bank record of the leg's
    /// account dropped out. `None` when valid candidates remain.
    fn leg_reason(&self, tx: &PlatformTransaction, leg: &CompiledLeg) -> Option<UnmatchedReason> {
        let side = leg.side;
        let Some(account) = tx.account(side).bank_account_id else {
            return Some(UnmatchedReason::MissingBankAccount { side });
        };
        let pool = self.index.for_account(account);
        if pool.is_empty() {
            return Some(UnmatchedReason::NoBankTransactions {
                side,
                bank_account: account,
            });
        }

        let view = PreexistingOnly(self.ledger);
        let passing = candidates(
            tx,
            leg,
            self.flavor.window,
            self.tolerance,
            pool,
            &view,
            &HashSet::new(),
        );
        if passing.is_empty() {
            return Some(self.predicate_failure(tx, leg, account, pool, &view));
        }

        let mut open = Vec::new();
        let mut first_claim = None;
        for c in &passing {
            match self.ledger.bank_claim(c.bank.id) {
                Some(claim) if claim.origin == ClaimOrigin::Run && claim.platform != tx.id => {
                    first_claim.get_or_insert((c.bank.id, claim.platform));
                }
                _ => open.push(c.bank),
            }
        }
        if open.is_empty() {
            let (bank, by) = first_claim?;
            return Some(UnmatchedReason::BankClaimed {
                side,
                bank,
                by,
                tie_break: self.tie_break(tx, by),
            });
        }

        let rule = self.flavor.processor.as_ref()?;
        let mut first_used = None;
        for bt in &open {
            let pick = best_payment(
                tx,
                bt,
                &self.records.payments,
                self.records.player,
                rule,
                self.tolerance,
            );
            if let Some(pick) = pick {
                match self.ledger.payment_claimant(pick.payment.id) {
                    Some(by) if by != tx.id => {
                        first_used.get_or_insert(UnmatchedReason::ProcessorPaymentClaimed {
                            bank: bt.id,
                            payment: pick.payment.id,
                            by,
                        });
                    }
                    _ => return None,
                }
            }
        }
        Some(first_used.unwrap_or(UnmatchedReason::NoProcessorPayment { bank: open[0].id }))
    }

    /// Walks the predicates in order over the leg's pool: amount, then date,
    /// then keywords.
    fn predicate_failure(
        &self,
        tx: &PlatformTransaction,
        leg: &CompiledLeg,
        account: BankAccountId,
        pool: &[&ledgerlink_core::BankTransaction],
        view: &dyn ClaimView,
    ) -> UnmatchedReason {
        let side = leg.side;
        let evaluated: Vec<_> = pool
            .iter()
            .filter(|bt| view.bank_claim(bt.id).is_none())
            .map(|bt| (*bt, evaluate(tx, bt, leg, self.flavor.window, self.tolerance)))
            .collect();
        if evaluated.is_empty() {
            return UnmatchedReason::NoBankTransactions {
                side,
                bank_account: account,
            };
        }

        let amount_ok: Vec<_> = evaluated
            .iter()
            .filter(|(_, o)| o.account && o.amount)
            .collect();
        if amount_ok.is_empty() {
            return UnmatchedReason::NoAmountMatch {
                side,
                expected: leg.sign.expected(tx.amount),
            };
        }

        let dated: Vec<_> = amount_ok.iter().filter(|(_, o)| o.date).collect();
        if dated.is_empty() {
            return UnmatchedReason::OutsideWindow {
                side,
                window: self.flavor.window,
                dates: amount_ok.iter().map(|(bt, _)| bt.date).collect(),
            };
        }

        if let Some(casino) = dated.iter().find_map(|(_, o)| match &o.keyword {
            KeywordOutcome::NoKeywordsFor { casino } => Some(casino.clone()),
            _ => None,
        }) {
            return UnmatchedReason::NoCasinoKeywords { side, casino };
        }
        UnmatchedReason::KeywordMismatch {
            side,
            descriptions: dated
                .iter()
                .map(|(bt, _)| bt.description(leg.include_counterparty))
                .collect(),
        }
    }

    /// Set when `winner` took the record as a fellow duplicate-group member.
    fn tie_break(&self, tx: &PlatformTransaction, winner: PlatformTransactionId) -> Option<TieBreak> {
        let same_group = self.outcome.notes_for(tx.id).iter().any(|note| {
            matches!(note, EngineNote::DuplicateGroup { members } if members.contains(&winner))
        });
        if !same_group {
            return None;
        }
        let player = Some(self.records.player);
        let winner_by_player = self
            .records
            .platform_by_id(winner)
            .is_some_and(|w| w.added_by == player);
        if winner_by_player && tx.added_by != player {
            Some(TieBreak::AddedByCounterpart)
        } else {
            Some(TieBreak::LowestId)
        }
    }
}
