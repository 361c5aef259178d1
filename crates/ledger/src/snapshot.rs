use ledgerlink_core::{
    BankTransaction, DateRange, PlatformTransaction, ProcessorPayment, ScrapedLine, UserId,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::source::{in_range, Fetched, RecordSource, RecordStream, SourceError};
use crate::wire::{
    extract_array, parse_records, WireBankTransaction, WirePlatformTransaction,
    WireProcessorPayment, WireScrapedLine,
};

pub const PLATFORM_FILE: &str = "platform_transactions.json";
pub const BANK_FILE: &str = "bank_transactions.json";
pub const PROCESSOR_FILE: &str = "checkbook_payments.json";
pub const SCRAPED_FILE: &str = "scraped_transactions.json";

/// Ledger API responses saved to disk, one directory per player:
///
/// ```text
/// <root>/<player_id>/platform_transactions.json
/// <root>/<player_id>/bank_transactions.json
/// <root>/<player_id>/checkbook_payments.json      (optional)
/// <root>/<player_id>/scraped_transactions.json    (optional)
/// ```
pub struct SnapshotSource {
    root: PathBuf,
}

impl SnapshotSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SnapshotSource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every numeric sub-directory of the root, ascending.
    pub fn players(&self) -> Result<Vec<UserId>, SourceError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| SourceError::Io {
            path: self.root.clone(),
            source,
        })?;
        let mut players: Vec<UserId> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<i64>().ok())
            .map(UserId)
            .collect();
        players.sort();
        Ok(players)
    }

    fn read_stream(
        &self,
        player: UserId,
        file: &str,
        envelope_keys: &[&str],
        required: bool,
    ) -> Result<Vec<Value>, SourceError> {
        let dir = self.root.join(player.0.to_string());
        if !dir.is_dir() {
            return Err(SourceError::PlayerNotFound(player));
        }
        let path = dir.join(file);
        if !path.exists() && !required {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let document: Value = serde_json::from_str(&content).map_err(|source| SourceError::Json {
            path: path.clone(),
            source,
        })?;
        extract_array(document, envelope_keys).ok_or(SourceError::Shape(path))
    }
}

impl RecordSource for SnapshotSource {
    fn platform_transactions(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<PlatformTransaction>, SourceError> {
        let values = self.read_stream(player, PLATFORM_FILE, &["transactions"], true)?;
        Ok(
            parse_records::<WirePlatformTransaction, _>(RecordStream::Platform, values)
                .retain(|tx: &PlatformTransaction| in_range(range, tx.date)),
        )
    }

    fn bank_transactions(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<BankTransaction>, SourceError> {
        let values = self.read_stream(player, BANK_FILE, &["bankTransactions", "transactions"], true)?;
        Ok(parse_records::<WireBankTransaction, _>(RecordStream::Bank, values)
            .retain(|bt: &BankTransaction| in_range(range, bt.date)))
    }

    fn processor_payments(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<ProcessorPayment>, SourceError> {
        let values = self.read_stream(player, PROCESSOR_FILE, &["checkbookPayments", "payments"], false)?;
        Ok(
            parse_records::<WireProcessorPayment, _>(RecordStream::Processor, values)
                .retain(|p: &ProcessorPayment| in_range(range, p.date())),
        )
    }

    fn scraped_lines(&self, player: UserId) -> Result<Fetched<ScrapedLine>, SourceError> {
        let values = self.read_stream(player, SCRAPED_FILE, &["scrapedTransactions", "transactions"], false)?;
        Ok(parse_records::<WireScrapedLine, _>(RecordStream::Scraped, values))
    }
}
