pub mod commands;
pub mod memory;
pub mod snapshot;
pub mod source;
pub mod wire;

pub use commands::{
    CommandError, CommandKind, LedgerCommands, NewPlatformTransaction, PlannedCommand,
    PlatformChanges,
};
pub use memory::{InMemorySource, PlayerSnapshot, RecordingLedger};
pub use snapshot::SnapshotSource;
pub use source::{Fetched, RecordSource, RecordStream, SkippedRecord, SourceError};
