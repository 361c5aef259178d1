use ledgerlink_core::{
    BankTransactionId, DateRange, PlatformTransactionId, UserId,
};
use ledgerlink_ledger::{
    LedgerCommands, PlatformChanges, RecordSource, SkippedRecord, SourceError,
};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::CompiledConfig;
use crate::consumption::ConsumptionLedger;
use crate::diagnose::{diagnose, UnmatchedTransaction};
use crate::engine::MatchEngine;
use crate::outcome::{AmbiguityReport, Match, MatchOrigin, ThreeWayMatch};
use crate::records::{BankIndex, PlayerRecords};
use crate::split::{execute_split, plan_split, ExecutionError, SplitOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlavorSummary {
    pub matcher: String,
    /// Platform transactions the matcher selected.
    pub candidates: usize,
    pub matched: usize,
    pub three_way: usize,
    pub unmatched: usize,
    pub settled: usize,
    pub match_rate: f64,
}

/// Everything one player's matching run decided, before any command is issued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub player: UserId,
    pub matches: Vec<Match>,
    pub three_way: Vec<ThreeWayMatch>,
    pub ambiguous: Vec<AmbiguityReport>,
    pub unmatched: Vec<UnmatchedTransaction>,
    pub summaries: Vec<FlavorSummary>,
}

impl Reconciliation {
    /// Matches that need a link command; direct ones are already linked.
    pub fn new_matches(&self) -> impl Iterator<Item = &Match> {
        self.matches
            .iter()
            .filter(|m| m.origin != MatchOrigin::Direct)
    }
}

/// Runs every configured matcher over one player's records, sharing one
/// consumption ledger, then explains whatever stayed unmatched.
pub fn reconcile(records: &PlayerRecords, config: &CompiledConfig) -> Reconciliation {
    let index = BankIndex::new(&records.bank);
    let mut ledger = ConsumptionLedger::seeded(&records.bank);

    let outcomes: Vec<_> = config
        .flavors
        .iter()
        .map(|flavor| {
            let outcome = MatchEngine::new(flavor, config.tolerance).run(records, &index, &mut ledger);
            (flavor, outcome)
        })
        .collect();

    let mut result = Reconciliation {
        player: records.player,
        matches: Vec::new(),
        three_way: Vec::new(),
        ambiguous: Vec::new(),
        unmatched: Vec::new(),
        summaries: Vec::new(),
    };

    for (flavor, mut outcome) in outcomes {
        // A later matcher may have picked up what this one could not.
        outcome.unmatched.retain(|id| !ledger.is_matched(*id));
        let matched = outcome.matched_count();
        result.summaries.push(FlavorSummary {
            matcher: flavor.name.clone(),
            candidates: outcome.considered,
            matched,
            three_way: outcome.three_way.len(),
            unmatched: outcome.unmatched.len(),
            settled: outcome.settled.len(),
            match_rate: if outcome.considered == 0 {
                0.0
            } else {
                matched as f64 / outcome.considered as f64
            },
        });
        result.unmatched.extend(diagnose(
            flavor,
            &outcome,
            records,
            &index,
            &ledger,
            config.tolerance,
        ));
        result.matches.append(&mut outcome.matches);
        result.three_way.append(&mut outcome.three_way);
        result.ambiguous.append(&mut outcome.ambiguous);
    }

    tracing::info!(
        "Player {}: {} matches, {} three-way, {} unmatched, {} ambiguous",
        records.player,
        result.matches.len(),
        result.three_way.len(),
        result.unmatched.len(),
        result.ambiguous.len()
    );
    result
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Link {
        platform: PlatformTransactionId,
        bank: BankTransactionId,
    },
    SyncDate {
        platform: PlatformTransactionId,
    },
    Split {
        platform: PlatformTransactionId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationFailure {
    pub operation: Operation,
    pub error: String,
    /// The ledger holds part of a split and needs manual follow-up.
    pub partial_split: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub linked: usize,
    pub dates_synced: usize,
    pub splits: Vec<SplitOutcome>,
    pub failures: Vec<OperationFailure>,
}

impl ExecutionReport {
    fn fail(&mut self, operation: Operation, error: impl ToString) {
        let error = error.to_string();
        tracing::warn!("{operation:?} failed: {error}");
        self.failures.push(OperationFailure {
            operation,
            error,
            partial_split: false,
        });
    }

    pub fn partial_splits(&self) -> impl Iterator<Item = &OperationFailure> {
        self.failures.iter().filter(|f| f.partial_split)
    }
}

/// Issues the commands a reconciliation calls for. Every failure is recorded
/// against its operation and execution carries on with the next one.
pub fn apply(
    reconciliation: &Reconciliation,
    records: &PlayerRecords,
    commands: &dyn LedgerCommands,
    config: &CompiledConfig,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    let mut synced: HashSet<PlatformTransactionId> = HashSet::new();

    for m in reconciliation.new_matches() {
        let operation = Operation::Link {
            platform: m.platform,
            bank: m.bank.id,
        };
        let Some(external_ref) = &m.bank.external_ref else {
            report.fail(
                operation,
                format!("Bank transaction {} has no external reference", m.bank.id),
            );
            continue;
        };
        if let Err(e) = commands.link_bank_transaction(external_ref, m.platform) {
            report.fail(operation, e);
            continue;
        }
        report.linked += 1;

        let sync = config.flavor(&m.matcher).is_some_and(|f| f.sync_dates);
        if !sync || m.bank.date == m.platform_date || !synced.insert(m.platform) {
            continue;
        }
        let previous = records.platform_by_id(m.platform).and_then(|tx| tx.notes.as_deref());
        let note = format!(
            "System matched: date updated from {} to {}",
            m.platform_date, m.bank.date
        );
        let changes = PlatformChanges {
            date: Some(m.bank.date),
            notes: Some(match previous.map(str::trim).filter(|s| !s.is_empty()) {
                Some(prev) => format!("{prev}\n{note}"),
                None => note,
            }),
            ..Default::default()
        };
        match commands.update_platform_transaction(m.platform, &changes) {
            Ok(_) => report.dates_synced += 1,
            Err(e) => report.fail(Operation::SyncDate { platform: m.platform }, e),
        }
    }

    for found in &reconciliation.three_way {
        let operation = Operation::Split {
            platform: found.platform,
        };
        let Some(tx) = records.platform_by_id(found.platform) else {
            report.fail(operation, format!("{} is not in the fetched records", found.platform));
            continue;
        };
        let plan = match plan_split(found, tx, &config.accounts, records.player) {
            Ok(plan) => plan,
            Err(e) => {
                report.fail(operation, e);
                continue;
            }
        };
        match execute_split(&plan, commands) {
            Ok(outcome) => report.splits.push(outcome),
            Err(e) => {
                let partial_split = matches!(e, ExecutionError::PartialSplit { .. });
                report.failures.push(OperationFailure {
                    operation,
                    error: e.to_string(),
                    partial_split,
                });
            }
        }
    }

    report
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerReport {
    pub player: UserId,
    pub skipped: Vec<SkippedRecord>,
    pub reconciliation: Reconciliation,
    pub execution: ExecutionReport,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Fetching records for player {player} failed: {source}")]
    Fetch {
        player: UserId,
        #[source]
        source: SourceError,
    },
}

/// Fetches and validates the four record streams for one player.
pub fn load_player(
    source: &dyn RecordSource,
    player: UserId,
    range: Option<DateRange>,
) -> Result<(PlayerRecords, Vec<SkippedRecord>), PlayerError> {
    let fetch = |source| PlayerError::Fetch { player, source };
    let platform = source.platform_transactions(player, range).map_err(fetch)?;
    let bank = source.bank_transactions(player, range).map_err(fetch)?;
    let payments = source.processor_payments(player, range).map_err(fetch)?;
    let scraped = source.scraped_lines(player).map_err(fetch)?;

    let mut skipped = Vec::new();
    skipped.extend(platform.skipped);
    skipped.extend(bank.skipped);
    skipped.extend(payments.skipped);
    skipped.extend(scraped.skipped);

    let records = PlayerRecords::new(
        player,
        platform.records,
        bank.records,
        payments.records,
        scraped.records,
    );
    Ok((records, skipped))
}

/// Fetch, match and apply for one player. Only a failed fetch is an error;
/// everything after it is reported inside the returned report.
pub fn reconcile_player(
    source: &dyn RecordSource,
    commands: &dyn LedgerCommands,
    config: &CompiledConfig,
    player: UserId,
    range: Option<DateRange>,
) -> Result<PlayerReport, PlayerError> {
    let (records, skipped) = load_player(source, player, range)?;
    let reconciliation = reconcile(&records, config);
    let execution = apply(&reconciliation, &records, commands, config);
    if !execution.failures.is_empty() {
        tracing::warn!(
            "Player {player}: {} operation(s) failed",
            execution.failures.len()
        );
    }
    Ok(PlayerReport {
        player,
        skipped,
        reconciliation,
        execution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use chrono::{NaiveDate, TimeZone, Utc};
    use ledgerlink_core::{
        AccountId, AccountRef, BankAccountId, BankTransaction, ExternalRef, Money,
        PaymentDirection, PlatformTransaction, ProcessorPayment, ProcessorPaymentId,
        TransactionKind,
    };
    use ledgerlink_ledger::{
        CommandKind, InMemorySource, PlannedCommand, PlayerSnapshot, RecordingLedger,
    };

    const PLAYER: UserId = UserId(81);
    const CHECKING: BankAccountId = BankAccountId(300);

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn received(id: i64, on: NaiveDate) -> PlatformTransaction {
        PlatformTransaction {
            id: PlatformTransactionId(id),
            kind: TransactionKind::Received,
            amount: Money::from_cents(250_000),
            date: on,
            from: AccountRef::new(AccountId(1)),
            to: AccountRef::new(AccountId(2)).with_bank_account(CHECKING),
            links: Vec::new(),
            notes: Some("wire".to_string()),
            name: None,
            added_by: None,
        }
    }

    fn bank(id: i64, on: NaiveDate, reference: Option<&str>) -> BankTransaction {
        BankTransaction {
            id: BankTransactionId(id),
            external_ref: reference.map(|r| ExternalRef(r.to_string())),
            amount: Money::from_cents(-250_000),
            date: on,
            name: "CHECKBOOK".to_string(),
            counterparty: None,
            bank_account_id: CHECKING,
            linked_to: None,
        }
    }

    fn payment() -> ProcessorPayment {
        ProcessorPayment {
            id: ProcessorPaymentId(3),
            amount: Money::from_cents(250_000),
            direction: PaymentDirection::Outgoing,
            recipient: Some(PLAYER),
            description: "Deposit from external source".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 8, 6, 9, 0, 0).unwrap(),
        }
    }

    fn snapshot(on: NaiveDate, reference: Option<&str>) -> PlayerSnapshot {
        PlayerSnapshot {
            platform: vec![received(1, date(6))],
            bank: vec![bank(10, on, reference)],
            payments: vec![payment()],
            scraped: Vec::new(),
        }
    }

    fn config() -> CompiledConfig {
        MatcherConfig::default().compile().unwrap()
    }

    #[test]
    fn summary_counts_match_rate() {
        let snap = snapshot(date(6), Some("ext-10"));
        let records = PlayerRecords::new(PLAYER, snap.platform, snap.bank, snap.payments, snap.scraped);
        let result = reconcile(&records, &config());
        let received = result
            .summaries
            .iter()
            .find(|s| s.matcher == "received")
            .unwrap();
        assert_eq!(received.candidates, 1);
        assert_eq!(received.matched, 1);
        assert_eq!(received.match_rate, 1.0);
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn player_run_links_and_syncs_date() {
        let source = InMemorySource::new().with_player(PLAYER, snapshot(date(7), Some("ext-10")));
        let ledger = RecordingLedger::new([received(1, date(6))]);
        let report = reconcile_player(&source, &ledger, &config(), PLAYER, None).unwrap();

        assert_eq!(report.execution.linked, 1);
        assert_eq!(report.execution.dates_synced, 1);
        let planned = ledger.planned();
        assert_eq!(
            planned[0],
            PlannedCommand::LinkBankTransaction {
                external_ref: ExternalRef("ext-10".to_string()),
                platform: PlatformTransactionId(1),
            }
        );
        let updated = ledger.transaction(PlatformTransactionId(1)).unwrap();
        assert_eq!(updated.date, date(7));
        assert_eq!(
            updated.notes.as_deref(),
            Some("wire\nSystem matched: date updated from 2025-08-06 to 2025-08-07")
        );
    }

    #[test]
    fn missing_external_ref_fails_only_that_link() {
        let source = InMemorySource::new().with_player(PLAYER, snapshot(date(6), None));
        let ledger = RecordingLedger::new([received(1, date(6))]);
        let report = reconcile_player(&source, &ledger, &config(), PLAYER, None).unwrap();
        assert_eq!(report.execution.linked, 0);
        assert_eq!(report.execution.failures.len(), 1);
        assert!(report.execution.failures[0].error.contains("no external reference"));
        assert!(ledger.planned().is_empty());
    }

    #[test]
    fn rejected_link_is_reported_not_thrown() {
        let source = InMemorySource::new().with_player(PLAYER, snapshot(date(6), Some("ext-10")));
        let ledger = RecordingLedger::new([received(1, date(6))]).fail_on(CommandKind::Link);
        let report = reconcile_player(&source, &ledger, &config(), PLAYER, None).unwrap();
        assert_eq!(report.execution.failures.len(), 1);
        assert_eq!(
            report.execution.failures[0].operation,
            Operation::Link {
                platform: PlatformTransactionId(1),
                bank: BankTransactionId(10)
            }
        );
    }

    #[test]
    fn fetch_failure_is_a_player_error() {
        let source = InMemorySource::new()
            .with_player(PLAYER, snapshot(date(6), None))
            .with_unavailable(PLAYER);
        let ledger = RecordingLedger::new(Vec::new());
        assert!(matches!(
            reconcile_player(&source, &ledger, &config(), PLAYER, None),
            Err(PlayerError::Fetch { .. })
        ));
    }

    #[test]
    fn direct_matches_issue_no_commands() {
        let mut snap = snapshot(date(6), Some("ext-10"));
        snap.platform[0].links.push(ledgerlink_core::BankLink {
            bank_transaction_id: BankTransactionId(10),
            bank_account_id: Some(CHECKING),
        });
        snap.bank[0].linked_to = Some(PlatformTransactionId(1));
        let source = InMemorySource::new().with_player(PLAYER, snap);
        let ledger = RecordingLedger::new([received(1, date(6))]);
        let report = reconcile_player(&source, &ledger, &config(), PLAYER, None).unwrap();
        assert_eq!(report.reconciliation.matches.len(), 1);
        assert_eq!(report.reconciliation.new_matches().count(), 0);
        assert!(ledger.planned().is_empty());
    }
}
