use ledgerlink_core::{DateRange, UserId};
use ledgerlink_ledger::{PlannedCommand, RecordSource, RecordingLedger};
use ledgerlink_match::{apply, load_player, reconcile, CompiledConfig, PlayerReport};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const MAX_CONCURRENCY: usize = 15;

/// One reconciled player plus the commands that would be sent to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerPlan {
    #[serde(flatten)]
    pub report: PlayerReport,
    pub planned: Vec<PlannedCommand>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerFailure {
    pub player: UserId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub players: Vec<PlayerPlan>,
    pub failed: Vec<PlayerFailure>,
}

impl BatchReport {
    pub fn matched(&self) -> usize {
        self.players
            .iter()
            .map(|p| p.report.reconciliation.matches.len() + p.report.reconciliation.three_way.len())
            .sum()
    }

    pub fn unmatched(&self) -> usize {
        self.players
            .iter()
            .map(|p| p.report.reconciliation.unmatched.len())
            .sum()
    }
}

/// Reconciles one player against a private recording ledger seeded with the
/// player's own platform transactions.
fn plan_player(
    source: &dyn RecordSource,
    config: &CompiledConfig,
    player: UserId,
    range: Option<DateRange>,
) -> Result<PlayerPlan, String> {
    let (records, skipped) = load_player(source, player, range).map_err(|e| e.to_string())?;
    let ledger = RecordingLedger::new(records.platform.iter().cloned());
    let reconciliation = reconcile(&records, config);
    let execution = apply(&reconciliation, &records, &ledger, config);

    tracing::info!(
        "Player {player}: {} matched, {} three-way, {} unmatched, {} failed operation(s)",
        reconciliation.matches.len(),
        reconciliation.three_way.len(),
        reconciliation.unmatched.len(),
        execution.failures.len()
    );

    Ok(PlayerPlan {
        report: PlayerReport {
            player,
            skipped,
            reconciliation,
            execution,
        },
        planned: ledger.planned(),
    })
}

/// Runs every player on the blocking pool, at most `concurrency` at a time.
/// A failing player is reported and never stops the others.
pub async fn run_batch(
    source: Arc<dyn RecordSource>,
    config: Arc<CompiledConfig>,
    players: Vec<UserId>,
    range: Option<DateRange>,
    concurrency: usize,
) -> BatchReport {
    let permits = Arc::new(Semaphore::new(concurrency.clamp(1, MAX_CONCURRENCY)));
    let mut tasks = JoinSet::new();

    for player in players {
        let source = Arc::clone(&source);
        let config = Arc::clone(&config);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (player, Err(e.to_string())),
            };
            let handle = tokio::task::spawn_blocking(move || {
                plan_player(source.as_ref(), config.as_ref(), player, range)
            });
            match handle.await {
                Ok(result) => (player, result),
                Err(e) => (player, Err(format!("reconciliation task failed: {e}"))),
            }
        });
    }

    let mut report = BatchReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(plan))) => report.players.push(plan),
            Ok((player, Err(error))) => {
                tracing::warn!("Player {player} failed: {error}");
                report.failed.push(PlayerFailure { player, error });
            }
            Err(e) => tracing::error!("Batch task aborted: {e}"),
        }
    }

    report.players.sort_by_key(|p| p.report.player);
    report.failed.sort_by_key(|f| f.player);
    report
}
