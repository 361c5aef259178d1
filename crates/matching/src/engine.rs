//! One matching algorithm, instantiated per flavor.
//!
//! A run walks the flavor's platform transactions in `(date, id)` order twice:
//! existing links are honored first, then fresh candidates are discovered for
//! everything still open. Platform transactions that look like duplicates of
//! one another are resolved as a group at their place in the second walk.

use ledgerlink_core::{
    BankAccountId, BankTransaction, BankTransactionId, Money, PlatformTransaction,
    PlatformTransactionId, ProcessorPaymentId, UserId,
};
use std::collections::{HashMap, HashSet};

use crate::config::{AmbiguityPolicy, CompiledFlavor, CompiledLeg, CompiledProcessor};
use crate::consumption::{ClaimError, ConsumptionLedger};
use crate::filter::{candidates, Candidate, PredicateOutcome};
use crate::outcome::{AmbiguityReport, EngineNote, FlavorOutcome, Match, MatchOrigin};
use crate::payments::best_payment;
use crate::records::{BankIndex, PlayerRecords};
use crate::threeway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegState {
    Open,
    Matched,
    /// Linked to a bank record outside the fetched data.
    Settled,
}

struct Resolved<'r> {
    leg: usize,
    bank: &'r BankTransaction,
    payment: Option<ProcessorPaymentId>,
    criteria: PredicateOutcome,
}

type GroupKey = (chrono::NaiveDate, Money, Vec<Option<BankAccountId>>);

/// Mutable state threaded through one flavor run.
struct Run<'a, 'r> {
    records: &'a PlayerRecords,
    index: &'a BankIndex<'r>,
    ledger: &'a mut ConsumptionLedger,
    outcome: FlavorOutcome,
}

pub struct MatchEngine<'c> {
    flavor: &'c CompiledFlavor,
    tolerance: Money,
}

impl<'c> MatchEngine<'c> {
    pub fn new(flavor: &'c CompiledFlavor, tolerance: Money) -> Self {
        Self { flavor, tolerance }
    }

    /// Matches every platform transaction the flavor selects. Platform
    /// transactions already matched by an earlier flavor of the same run are
    /// left alone; everything claimed here is recorded in `ledger`.
    pub fn run(
        &self,
        records: &PlayerRecords,
        index: &BankIndex<'_>,
        ledger: &mut ConsumptionLedger,
    ) -> FlavorOutcome {
        let selected: Vec<&PlatformTransaction> = records
            .platform
            .iter()
            .filter(|tx| self.flavor.selects(tx) && !ledger.is_matched(tx.id))
            .collect();

        let mut run = Run {
            records,
            index,
            ledger,
            outcome: FlavorOutcome::new(&self.flavor.name),
        };
        run.outcome.considered = selected.len();

        let mut legs: Vec<Vec<LegState>> = selected
            .iter()
            .map(|tx| self.honor_links(tx, &mut run))
            .collect();

        let groups = self.duplicate_groups(&selected, &legs);
        let mut group_at: HashMap<usize, usize> = HashMap::new();
        for (g, group) in groups.iter().enumerate() {
            for &pos in group {
                group_at.insert(pos, g);
            }
        }

        // Groups are resolved where their first member sits in the walk, so
        // later-dated transactions never pick ahead of them.
        for (pos, tx) in selected.iter().enumerate() {
            match group_at.get(&pos) {
                Some(&g) if groups[g][0] == pos => {
                    self.resolve_group(&groups[g], &selected, &mut legs, &mut run);
                }
                Some(_) => {}
                None if legs[pos].contains(&LegState::Open) => {
                    self.discover(tx, &mut legs[pos], MatchOrigin::Discovered, &mut run);
                }
                None => {}
            }
        }

        for (tx, state) in selected.iter().zip(&legs) {
            if state.contains(&LegState::Matched) {
                continue;
            }
            if state.iter().all(|s| *s == LegState::Settled) {
                run.outcome.settled.push(tx.id);
            } else {
                run.outcome.unmatched.push(tx.id);
            }
        }

        tracing::info!(
            "{}: {} considered, {} matched, {} three-way, {} unmatched",
            self.flavor.name,
            run.outcome.considered,
            run.outcome.matched_count(),
            run.outcome.three_way.len(),
            run.outcome.unmatched.len()
        );
        run.outcome
    }

    /// Phase A: existing links are matches as they stand.
    fn honor_links(&self, tx: &PlatformTransaction, run: &mut Run<'_, '_>) -> Vec<LegState> {
        let mut state = vec![LegState::Open; self.flavor.legs.len()];
        for link in &tx.links {
            let bank = run.index.get(link.bank_transaction_id);
            let account = link
                .bank_account_id
                .or_else(|| bank.map(|bt| bt.bank_account_id));
            let Some(leg) = self.leg_for_account(tx, account) else {
                continue;
            };
            let Some(bank) = bank else {
                state[leg] = LegState::Settled;
                continue;
            };
            match run.ledger.claim_bank(bank.id, tx.id) {
                Ok(()) => {
                    state[leg] = LegState::Matched;
                    run.ledger.mark_matched(tx.id);
                    run.outcome.matches.push(Match {
                        matcher: self.flavor.name.clone(),
                        flavor: self.flavor.flavor,
                        platform: tx.id,
                        platform_date: tx.date,
                        side: self.flavor.legs[leg].side,
                        bank: bank.clone(),
                        payment: None,
                        criteria: None,
                        origin: MatchOrigin::Direct,
                    });
                }
                Err(ClaimError::BankClaimed { by, .. }) => {
                    tracing::warn!(
                        "{}: {} links {} which is already linked to {}",
                        self.flavor.name,
                        tx.id,
                        bank.id,
                        by
                    );
                    run.outcome
                        .note(tx.id, EngineNote::LinkConflict { bank: bank.id, by });
                }
                Err(e) => tracing::warn!("{}: {e}", self.flavor.name),
            }
        }
        state
    }

    /// Single-leg flavors take every link; two-leg flavors pick the leg by
    /// bank account.
    fn leg_for_account(
        &self,
        tx: &PlatformTransaction,
        account: Option<BankAccountId>,
    ) -> Option<usize> {
        if self.flavor.legs.len() == 1 {
            return Some(0);
        }
        let account = account?;
        self.flavor
            .legs
            .iter()
            .position(|leg| tx.account(leg.side).bank_account_id == Some(account))
    }

    /// Positions of fully open platform transactions sharing date, amount
    /// and leg accounts, for every such set with more than one member.
    fn duplicate_groups(
        &self,
        selected: &[&PlatformTransaction],
        legs: &[Vec<LegState>],
    ) -> Vec<Vec<usize>> {
        let mut slots: HashMap<GroupKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (pos, tx) in selected.iter().enumerate() {
            if legs[pos].iter().any(|s| *s != LegState::Open) {
                continue;
            }
            let key: GroupKey = (
                tx.date,
                tx.amount.abs(),
                self.flavor
                    .legs
                    .iter()
                    .map(|leg| tx.account(leg.side).bank_account_id)
                    .collect(),
            );
            let slot = *slots.entry(key).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(pos);
        }
        groups.retain(|g| g.len() > 1);
        groups
    }

    /// Phase C: every member of a duplicate group takes the best remaining
    /// candidate in tie-break order.
    fn resolve_group(
        &self,
        group: &[usize],
        selected: &[&PlatformTransaction],
        legs: &mut [Vec<LegState>],
        run: &mut Run<'_, '_>,
    ) {
        let members: Vec<PlatformTransactionId> =
            group.iter().map(|&pos| selected[pos].id).collect();
        tracing::debug!(
            "{}: duplicate group of {} on {}",
            self.flavor.name,
            members.len(),
            selected[group[0]].date
        );
        for &pos in group {
            run.outcome.note(
                selected[pos].id,
                EngineNote::DuplicateGroup {
                    members: members.clone(),
                },
            );
        }
        for pos in self.group_order(group, selected, run.records.player) {
            self.discover(
                selected[pos],
                &mut legs[pos],
                MatchOrigin::DuplicateGroup,
                run,
            );
        }
    }

    /// Members entered by the player come first, then lowest id.
    fn group_order(
        &self,
        group: &[usize],
        selected: &[&PlatformTransaction],
        player: UserId,
    ) -> Vec<usize> {
        let mut order = group.to_vec();
        order.sort_by_key(|&pos| {
            let tx = selected[pos];
            (tx.added_by != Some(player), tx.id)
        });
        order
    }

    /// Phases B and C: finds and claims bank records for the open legs of
    /// `tx`. Returns whether anything was matched.
    fn discover(
        &self,
        tx: &PlatformTransaction,
        state: &mut [LegState],
        origin: MatchOrigin,
        run: &mut Run<'_, '_>,
    ) -> bool {
        if let Some(split) = &self.flavor.fee_split {
            if state.iter().all(|s| *s == LegState::Open) {
                if let Some(found) = threeway::find(
                    tx,
                    self.flavor,
                    split,
                    run.records,
                    run.index,
                    run.ledger,
                    self.tolerance,
                ) {
                    let banks = found.gross_bank.iter().chain(found.net_bank.iter());
                    for bt in banks {
                        if let Err(e) = run.ledger.claim_bank(bt.id, tx.id) {
                            tracing::warn!("{}: {e}", self.flavor.name);
                        }
                    }
                    if let Err(e) = run.ledger.claim_scraped(found.scraped.id, tx.id) {
                        tracing::warn!("{}: {e}", self.flavor.name);
                    }
                    run.ledger.mark_matched(tx.id);
                    state.fill(LegState::Matched);
                    tracing::info!(
                        "{}: {} three-way on scraped line {} (gross {}, net {}, fee {}{})",
                        self.flavor.name,
                        tx.id,
                        found.scraped.id,
                        found.gross,
                        found.net,
                        found.fee,
                        if found.is_fallback() { ", fallback" } else { "" }
                    );
                    run.outcome.three_way.push(found);
                    return true;
                }
            }
        }

        let mut taken: HashSet<BankTransactionId> = HashSet::new();
        let mut found: Vec<Resolved<'_>> = Vec::new();
        for (i, leg) in self.flavor.legs.iter().enumerate() {
            if state[i] != LegState::Open {
                continue;
            }
            if let Some(resolved) = self.resolve_leg(tx, i, leg, &taken, run) {
                taken.insert(resolved.bank.id);
                found.push(resolved);
            }
        }

        if let [a, b] = found.as_slice() {
            if a.bank.bank_account_id == b.bank.bank_account_id {
                tracing::warn!(
                    "{}: both legs of {} resolved to bank account {}",
                    self.flavor.name,
                    tx.id,
                    a.bank.bank_account_id
                );
                run.outcome.note(
                    tx.id,
                    EngineNote::LegsShareBankAccount {
                        bank_account: a.bank.bank_account_id,
                    },
                );
                return false;
            }
        }

        if let Some(anchor) = self.flavor.anchor {
            let anchor_open = self
                .flavor
                .legs
                .iter()
                .position(|l| l.side == anchor)
                .filter(|&i| state[i] == LegState::Open);
            if let Some(ai) = anchor_open {
                if !found.is_empty() && !found.iter().any(|r| r.leg == ai) {
                    tracing::debug!(
                        "{}: {} found a {} leg without its {} anchor",
                        self.flavor.name,
                        tx.id,
                        self.flavor.legs[found[0].leg].side,
                        anchor
                    );
                    run.outcome.note(tx.id, EngineNote::AnchorMissing { anchor });
                    return false;
                }
            }
        }

        let mut matched = false;
        for resolved in found {
            if let Err(e) = run.ledger.claim_bank(resolved.bank.id, tx.id) {
                tracing::warn!("{}: {e}", self.flavor.name);
                continue;
            }
            if let Some(payment) = resolved.payment {
                if let Err(e) = run.ledger.claim_payment(payment, tx.id) {
                    tracing::warn!("{}: {e}", self.flavor.name);
                }
            }
            state[resolved.leg] = LegState::Matched;
            matched = true;
            let side = self.flavor.legs[resolved.leg].side;
            tracing::info!(
                "{}: {} {} leg matched {} ({} on {})",
                self.flavor.name,
                tx.id,
                side,
                resolved.bank.id,
                resolved.bank.amount,
                resolved.bank.date
            );
            run.outcome.matches.push(Match {
                matcher: self.flavor.name.clone(),
                flavor: self.flavor.flavor,
                platform: tx.id,
                platform_date: tx.date,
                side,
                bank: resolved.bank.clone(),
                payment: resolved.payment,
                criteria: Some(resolved.criteria),
                origin,
            });
        }
        if matched {
            run.ledger.mark_matched(tx.id);
        }
        matched
    }

    fn resolve_leg<'r>(
        &self,
        tx: &PlatformTransaction,
        index: usize,
        leg: &CompiledLeg,
        taken: &HashSet<BankTransactionId>,
        run: &mut Run<'_, 'r>,
    ) -> Option<Resolved<'r>> {
        let account = tx.account(leg.side).bank_account_id?;
        let bank_index = run.index;
        let found = candidates(
            tx,
            leg,
            self.flavor.window,
            self.tolerance,
            bank_index.for_account(account),
            &*run.ledger,
            taken,
        );

        let viable: Vec<(Candidate<'r>, Option<ProcessorPaymentId>)> = match &self.flavor.processor {
            Some(rule) => self.with_payments(tx, found, rule, run),
            None => found.into_iter().map(|c| (c, None)).collect(),
        };

        if viable.len() > 1 && self.flavor.ambiguity == AmbiguityPolicy::RejectMultiple {
            let ids: Vec<BankTransactionId> = viable.iter().map(|(c, _)| c.bank.id).collect();
            tracing::warn!(
                "{}: {} has {} candidates on its {} leg, leaving for manual review",
                self.flavor.name,
                tx.id,
                ids.len(),
                leg.side
            );
            run.outcome.ambiguous.push(AmbiguityReport {
                matcher: self.flavor.name.clone(),
                platform: tx.id,
                side: leg.side,
                candidates: ids.clone(),
            });
            run.outcome.note(
                tx.id,
                EngineNote::Ambiguous {
                    side: leg.side,
                    candidates: ids,
                },
            );
            return None;
        }

        let (candidate, payment) = viable.into_iter().next()?;
        Some(Resolved {
            leg: index,
            bank: candidate.bank,
            payment,
            criteria: candidate.outcome,
        })
    }

    /// Pairs each candidate with its best processor payment, ranked by day
    /// offset, then payment time delta, then bank id. Candidates whose best
    /// payment belongs to another platform transaction are dropped.
    fn with_payments<'r>(
        &self,
        tx: &PlatformTransaction,
        found: Vec<Candidate<'r>>,
        rule: &CompiledProcessor,
        run: &mut Run<'_, 'r>,
    ) -> Vec<(Candidate<'r>, Option<ProcessorPaymentId>)> {
        let records = run.records;
        let mut picked: Vec<_> = found
            .into_iter()
            .filter_map(|c| {
                let pick = best_payment(
                    tx,
                    c.bank,
                    &records.payments,
                    records.player,
                    rule,
                    self.tolerance,
                );
                if pick.is_none() {
                    tracing::debug!(
                        "{}: {} candidate {} has no processor payment",
                        self.flavor.name,
                        tx.id,
                        c.bank.id
                    );
                }
                pick.map(|p| (c, p))
            })
            .collect();
        picked.sort_by_key(|(c, p)| (c.outcome.day_offset, p.delta_secs, c.bank.id));

        let mut viable = Vec::with_capacity(picked.len());
        for (candidate, pick) in picked {
            match run.ledger.payment_claimant(pick.payment.id) {
                Some(by) if by != tx.id => {
                    tracing::debug!(
                        "{}: {} candidate {} rejected, payment {} used by {}",
                        self.flavor.name,
                        tx.id,
                        candidate.bank.id,
                        pick.payment.id,
                        by
                    );
                    run.outcome.note(
                        tx.id,
                        EngineNote::PaymentClaimed {
                            bank: candidate.bank.id,
                            payment: pick.payment.id,
                            by,
                        },
                    );
                }
                _ => viable.push((candidate, Some(pick.payment.id))),
            }
        }
        viable
    }
}
