use ledgerlink_core::{
    AccountRef, BankTransaction, DateRange, ExternalRef, PlatformTransaction,
    PlatformTransactionId, ProcessorPayment, ScrapedLine, UserId,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::commands::{
    CommandError, CommandKind, LedgerCommands, NewPlatformTransaction, PlannedCommand,
    PlatformChanges,
};
use crate::source::{in_range, Fetched, RecordSource, SourceError};

// ── In-memory source ──────────────────────────────────────────────────────────

/// Already-validated records for one player.
#[derive(Debug, Clone, Default)]
pub struct PlayerSnapshot {
    pub platform: Vec<PlatformTransaction>,
    pub bank: Vec<BankTransaction>,
    pub payments: Vec<ProcessorPayment>,
    pub scraped: Vec<ScrapedLine>,
}

#[derive(Debug, Default)]
pub struct InMemorySource {
    players: BTreeMap<UserId, PlayerSnapshot>,
    unavailable: HashSet<UserId>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_player(mut self, player: UserId, snapshot: PlayerSnapshot) -> Self {
        self.players.insert(player, snapshot);
        self
    }

    /// Every fetch for `player` fails, as if the ledger API were down.
    pub fn with_unavailable(mut self, player: UserId) -> Self {
        self.unavailable.insert(player);
        self
    }

    pub fn players(&self) -> Vec<UserId> {
        self.players.keys().copied().collect()
    }

    fn snapshot(&self, player: UserId) -> Result<&PlayerSnapshot, SourceError> {
        if self.unavailable.contains(&player) {
            return Err(SourceError::Unavailable(format!("player {player} fetch failed")));
        }
        self.players
            .get(&player)
            .ok_or(SourceError::PlayerNotFound(player))
    }
}

impl RecordSource for InMemorySource {
    fn platform_transactions(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<PlatformTransaction>, SourceError> {
        Ok(Fetched::new(self.snapshot(player)?.platform.clone())
            .retain(|tx| in_range(range, tx.date)))
    }

    fn bank_transactions(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<BankTransaction>, SourceError> {
        Ok(Fetched::new(self.snapshot(player)?.bank.clone()).retain(|bt| in_range(range, bt.date)))
    }

    fn processor_payments(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<ProcessorPayment>, SourceError> {
        Ok(Fetched::new(self.snapshot(player)?.payments.clone())
            .retain(|p| in_range(range, p.date())))
    }

    fn scraped_lines(&self, player: UserId) -> Result<Fetched<ScrapedLine>, SourceError> {
        Ok(Fetched::new(self.snapshot(player)?.scraped.clone()))
    }
}

// ── Recording ledger ──────────────────────────────────────────────────────────

struct RecordingState {
    transactions: BTreeMap<PlatformTransactionId, PlatformTransaction>,
    planned: Vec<PlannedCommand>,
    next_provisional: i64,
}

/// Applies commands to a private copy of the platform ledger and keeps the
/// ordered command log. Created transactions get negative provisional ids.
pub struct RecordingLedger {
    state: Mutex<RecordingState>,
    failing: HashSet<CommandKind>,
}

impl RecordingLedger {
    pub fn new(seed: impl IntoIterator<Item = PlatformTransaction>) -> Self {
        RecordingLedger {
            state: Mutex::new(RecordingState {
                transactions: seed.into_iter().map(|tx| (tx.id, tx)).collect(),
                planned: Vec::new(),
                next_provisional: -1,
            }),
            failing: HashSet::new(),
        }
    }

    /// Every command of `kind` is rejected. Used to exercise partial failures.
    pub fn fail_on(mut self, kind: CommandKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn planned(&self) -> Vec<PlannedCommand> {
        self.lock().map(|s| s.planned.clone()).unwrap_or_default()
    }

    pub fn transaction(&self, id: PlatformTransactionId) -> Option<PlatformTransaction> {
        self.lock().ok()?.transactions.get(&id).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordingState>, CommandError> {
        self.state
            .lock()
            .map_err(|_| CommandError::Unavailable("recording ledger lock poisoned".to_string()))
    }

    fn check(&self, kind: CommandKind) -> Result<(), CommandError> {
        if self.failing.contains(&kind) {
            return Err(CommandError::Rejected {
                kind,
                reason: "configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

impl LedgerCommands for RecordingLedger {
    fn link_bank_transaction(
        &self,
        external_ref: &ExternalRef,
        platform: PlatformTransactionId,
    ) -> Result<(), CommandError> {
        self.check(CommandKind::Link)?;
        if external_ref.0.trim().is_empty() {
            return Err(CommandError::Rejected {
                kind: CommandKind::Link,
                reason: "empty external reference".to_string(),
            });
        }
        let mut state = self.lock()?;
        if !state.transactions.contains_key(&platform) {
            return Err(CommandError::NotFound(platform));
        }
        state.planned.push(PlannedCommand::LinkBankTransaction {
            external_ref: external_ref.clone(),
            platform,
        });
        Ok(())
    }

    fn update_platform_transaction(
        &self,
        id: PlatformTransactionId,
        changes: &PlatformChanges,
    ) -> Result<PlatformTransaction, CommandError> {
        self.check(CommandKind::Update)?;
        let mut state = self.lock()?;
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or(CommandError::NotFound(id))?;
        if let Some(amount) = changes.amount {
            tx.amount = amount;
        }
        if let Some(date) = changes.date {
            tx.date = date;
        }
        if let Some(account) = changes.from_account {
            tx.from = AccountRef::new(account);
        }
        if let Some(account) = changes.to_account {
            tx.to = AccountRef::new(account);
        }
        if let Some(notes) = &changes.notes {
            tx.notes = Some(notes.clone());
        }
        let updated = tx.clone();
        state.planned.push(PlannedCommand::UpdatePlatformTransaction {
            id,
            changes: changes.clone(),
        });
        Ok(updated)
    }

    fn create_platform_transaction(
        &self,
        fields: &NewPlatformTransaction,
    ) -> Result<PlatformTransaction, CommandError> {
        self.check(CommandKind::Create)?;
        let mut state = self.lock()?;
        let id = PlatformTransactionId(state.next_provisional);
        state.next_provisional -= 1;
        let tx = PlatformTransaction {
            id,
            kind: fields.kind,
            amount: fields.amount,
            date: fields.date,
            from: AccountRef::new(fields.from_account),
            to: AccountRef::new(fields.to_account),
            links: Vec::new(),
            notes: fields.notes.clone(),
            name: None,
            added_by: Some(fields.added_by),
        };
        state.transactions.insert(id, tx.clone());
        state.planned.push(PlannedCommand::CreatePlatformTransaction {
            provisional_id: id,
            fields: fields.clone(),
        });
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerlink_core::{AccountId, Money, TransactionKind};

    fn seed() -> PlatformTransaction {
        PlatformTransaction {
            id: PlatformTransactionId(1),
            kind: TransactionKind::Transfer,
            amount: Money::from_cents(50_000),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            from: AccountRef::new(AccountId(10)),
            to: AccountRef::new(AccountId(20)),
            links: Vec::new(),
            notes: None,
            name: None,
            added_by: None,
        }
    }

    fn new_fee() -> NewPlatformTransaction {
        NewPlatformTransaction {
            kind: TransactionKind::Fees,
            amount: Money::from_cents(1_500),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            from_account: AccountId(36715),
            to_account: AccountId(18),
            user: UserId(81),
            added_by: UserId(35047),
            notes: None,
        }
    }

    #[test]
    fn update_applies_changes_and_records() {
        let ledger = RecordingLedger::new([seed()]);
        let changes = PlatformChanges {
            to_account: Some(AccountId(36715)),
            ..Default::default()
        };
        let updated = ledger
            .update_platform_transaction(PlatformTransactionId(1), &changes)
            .unwrap();
        assert_eq!(updated.to.account_id, Some(AccountId(36715)));
        assert_eq!(ledger.planned().len(), 1);
    }

    #[test]
    fn created_transactions_get_provisional_ids() {
        let ledger = RecordingLedger::new([seed()]);
        let a = ledger.create_platform_transaction(&new_fee()).unwrap();
        let b = ledger.create_platform_transaction(&new_fee()).unwrap();
        assert_eq!(a.id, PlatformTransactionId(-1));
        assert_eq!(b.id, PlatformTransactionId(-2));
        assert!(ledger.transaction(PlatformTransactionId(-2)).is_some());
    }

    #[test]
    fn link_requires_known_platform_transaction() {
        let ledger = RecordingLedger::new([seed()]);
        let r = ExternalRef("t1".to_string());
        assert!(ledger.link_bank_transaction(&r, PlatformTransactionId(1)).is_ok());
        assert_eq!(
            ledger.link_bank_transaction(&r, PlatformTransactionId(2)),
            Err(CommandError::NotFound(PlatformTransactionId(2)))
        );
    }

    #[test]
    fn configured_failures_reject_without_recording() {
        let ledger = RecordingLedger::new([seed()]).fail_on(CommandKind::Create);
        assert!(matches!(
            ledger.create_platform_transaction(&new_fee()),
            Err(CommandError::Rejected { kind: CommandKind::Create, .. })
        ));
        assert!(ledger.planned().is_empty());
    }

    #[test]
    fn unavailable_player_fails_fetch() {
        let source = InMemorySource::new()
            .with_player(UserId(1), PlayerSnapshot::default())
            .with_unavailable(UserId(1));
        assert!(matches!(
            source.bank_transactions(UserId(1), None),
            Err(SourceError::Unavailable(_))
        ));
        assert!(matches!(
            source.bank_transactions(UserId(2), None),
            Err(SourceError::PlayerNotFound(_))
        ));
    }
}
