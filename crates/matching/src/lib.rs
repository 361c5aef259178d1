pub mod config;
pub mod consumption;
pub mod defaults;
pub mod diagnose;
pub mod engine;
pub mod filter;
pub mod keywords;
pub mod outcome;
pub mod payments;
pub mod reconcile;
pub mod records;
pub mod split;
pub(crate) mod threeway;

pub use config::{CompiledConfig, CompiledFlavor, ConfigError, Flavor, FlavorSpec, MatcherConfig, SplitAccounts};
pub use consumption::{ClaimError, ConsumptionLedger};
pub use diagnose::{diagnose, TieBreak, UnmatchedReason, UnmatchedTransaction};
pub use engine::MatchEngine;
pub use keywords::{casino_table_from_json, KeywordSpec};
pub use outcome::{AmbiguityReport, EngineNote, FlavorOutcome, Match, MatchOrigin, ThreeWayMatch};
pub use reconcile::{
    apply, load_player, reconcile, reconcile_player, ExecutionReport, FlavorSummary, Operation,
    OperationFailure, PlayerError, PlayerReport, Reconciliation,
};
pub use records::{BankIndex, PlayerRecords};
pub use split::{execute_split, plan_split, ExecutionError, SplitError, SplitOutcome, SplitPlan, SplitStep};
