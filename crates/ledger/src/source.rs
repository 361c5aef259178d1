use ledgerlink_core::{
    BankTransaction, DateRange, PlatformTransaction, ProcessorPayment, ScrapedLine, UserId,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStream {
    Platform,
    Bank,
    Processor,
    Scraped,
}

impl fmt::Display for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStream::Platform => write!(f, "platform transaction"),
            RecordStream::Bank => write!(f, "bank transaction"),
            RecordStream::Processor => write!(f, "processor payment"),
            RecordStream::Scraped => write!(f, "scraped line"),
        }
    }
}

/// A record that failed validation at the boundary and was left out of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub stream: RecordStream,
    pub id: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRecord>,
}

impl<T> Default for Fetched<T> {
    fn default() -> Self {
        Fetched {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Fetched<T> {
    pub fn new(records: Vec<T>) -> Self {
        Fetched {
            records,
            skipped: Vec::new(),
        }
    }

    pub fn retain(mut self, keep: impl FnMut(&T) -> bool) -> Self {
        self.records.retain(keep);
        self
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected document shape in {0}")]
    Shape(PathBuf),
    #[error("No records for player {0}")]
    PlayerNotFound(UserId),
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the four record streams of one player.
///
/// Implementations validate at the boundary: malformed records are returned in
/// [`Fetched::skipped`], never as errors. An `Err` means the stream itself
/// could not be read, which aborts the run for that player only.
pub trait RecordSource: Send + Sync {
    fn platform_transactions(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<PlatformTransaction>, SourceError>;

    fn bank_transactions(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<BankTransaction>, SourceError>;

    fn processor_payments(
        &self,
        player: UserId,
        range: Option<DateRange>,
    ) -> Result<Fetched<ProcessorPayment>, SourceError>;

    fn scraped_lines(&self, player: UserId) -> Result<Fetched<ScrapedLine>, SourceError>;
}

pub(crate) fn in_range(range: Option<DateRange>, date: chrono::NaiveDate) -> bool {
    range.map_or(true, |r| r.contains(date))
}
