use ledgerlink_core::{
    AccountId, AccountType, DateWindow, Money, PlatformTransaction, Side, TransactionKind, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::defaults;
use crate::keywords::{CasinoKeywords, KeywordSet, KeywordSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    Received,
    Returned,
    Transfer,
    Fee,
    Deposit,
    Withdrawal,
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Received => write!(f, "received"),
            Flavor::Returned => write!(f, "returned"),
            Flavor::Transfer => write!(f, "transfer"),
            Flavor::Fee => write!(f, "fee"),
            Flavor::Deposit => write!(f, "deposit"),
            Flavor::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// Sign the bank record must carry. Platform amounts are unsigned; the bank
/// feed reports money leaving an account as positive and arriving as negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankSign {
    Positive,
    Negative,
}

impl BankSign {
    /// The signed bank amount expected for an unsigned platform amount.
    pub fn expected(self, platform_amount: Money) -> Money {
        match self {
            BankSign::Positive => platform_amount.abs(),
            BankSign::Negative => -platform_amount.abs(),
        }
    }

    pub fn accepts(self, bank_amount: Money) -> bool {
        match self {
            BankSign::Positive => bank_amount.is_positive(),
            BankSign::Negative => bank_amount.is_negative(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Take the highest-priority candidate.
    #[default]
    BestCandidate,
    /// More than one candidate leaves the transaction for manual review.
    RejectMultiple,
}

/// Which platform transactions a matcher looks at, beyond their kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub from_type: Option<AccountType>,
    #[serde(default)]
    pub to_type: Option<AccountType>,
    #[serde(default)]
    pub from_account: Option<AccountId>,
    #[serde(default)]
    pub to_account: Option<AccountId>,
}

impl RouteSpec {
    pub fn accepts(&self, tx: &PlatformTransaction) -> bool {
        fn same<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            want.as_ref().map_or(true, |w| have.as_ref() == Some(w))
        }
        same(&self.from_type, &tx.from.account_type)
            && same(&self.to_type, &tx.to.account_type)
            && same(&self.from_account, &tx.from.account_id)
            && same(&self.to_account, &tx.to.account_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegSpec {
    pub side: Side,
    pub sign: BankSign,
    #[serde(default)]
    pub keywords: Option<KeywordSpec>,
    /// Select keywords by the platform transaction's casino name.
    #[serde(default)]
    pub casino_keywords: bool,
    /// Match keywords against name and counterparty instead of name alone.
    #[serde(default)]
    pub include_counterparty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSpec {
    #[serde(default = "defaults::processor_window_days")]
    pub window_days: u32,
    #[serde(default)]
    pub keywords: Option<KeywordSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSplitSpec {
    #[serde(default = "defaults::scraped_kind")]
    pub scraped_kind: String,
    #[serde(default = "defaults::fee_split_window_days")]
    pub window_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorSpec {
    pub name: String,
    pub flavor: Flavor,
    pub kind: TransactionKind,
    #[serde(default)]
    pub route: RouteSpec,
    pub date_window_days: u32,
    pub legs: Vec<LegSpec>,
    /// A leg that must be found for any leg of the match to count.
    #[serde(default)]
    pub anchor: Option<Side>,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    #[serde(default)]
    pub processor: Option<ProcessorSpec>,
    #[serde(default)]
    pub fee_split: Option<FeeSplitSpec>,
    /// Move the platform date onto the bank date after a discovered match.
    #[serde(default)]
    pub sync_dates: bool,
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitAccounts {
    /// Intermediate "transfer" account that fee splits route through.
    pub clearing_account: AccountId,
    pub fees_account: AccountId,
    /// Recorded as `added_by` on transactions the reconciler creates.
    pub automation_user: UserId,
}

impl Default for SplitAccounts {
    fn default() -> Self {
        SplitAccounts {
            clearing_account: AccountId(defaults::CLEARING_ACCOUNT_ID),
            fees_account: AccountId(defaults::FEES_ACCOUNT_ID),
            automation_user: UserId(defaults::AUTOMATION_USER_ID),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "defaults::amount_tolerance_cents")]
    pub amount_tolerance_cents: i64,
    #[serde(default)]
    pub accounts: SplitAccounts,
    #[serde(default = "defaults::matchers")]
    pub matchers: Vec<FlavorSpec>,
    #[serde(default)]
    pub casino_keywords: BTreeMap<String, Vec<String>>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            amount_tolerance_cents: defaults::amount_tolerance_cents(),
            accounts: SplitAccounts::default(),
            matchers: defaults::matchers(),
            casino_keywords: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Matcher '{matcher}': invalid keyword pattern: {source}")]
    InvalidPattern {
        matcher: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid casino keyword: {0}")]
    InvalidCasinoKeyword(#[source] regex::Error),
    #[error("Matcher '{0}' has no legs")]
    NoLegs(String),
    #[error("Matcher '{0}' has two legs on the same side")]
    DuplicateLeg(String),
    #[error("Matcher '{matcher}': anchor side '{side}' is not one of its legs")]
    AnchorNotALeg { matcher: String, side: Side },
    #[error("Matcher '{0}': fee split needs one leg per side")]
    FeeSplitNeedsTwoLegs(String),
    #[error("Duplicate matcher name '{0}'")]
    DuplicateName(String),
    #[error("Unknown matcher '{0}'")]
    UnknownMatcher(String),
    #[error("Amount tolerance must not be negative: {0}")]
    NegativeTolerance(i64),
}

impl MatcherConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Keeps only the named matchers, in configuration order.
    pub fn restrict_to(mut self, names: &[String]) -> Result<Self, ConfigError> {
        if let Some(unknown) = names
            .iter()
            .find(|n| !self.matchers.iter().any(|m| &m.name == *n))
        {
            return Err(ConfigError::UnknownMatcher(unknown.clone()));
        }
        self.matchers.retain(|m| names.contains(&m.name));
        Ok(self)
    }

    /// Validates the configuration and precompiles every keyword set.
    pub fn compile(&self) -> Result<CompiledConfig, ConfigError> {
        if self.amount_tolerance_cents < 0 {
            return Err(ConfigError::NegativeTolerance(self.amount_tolerance_cents));
        }
        let casinos = Arc::new(
            CasinoKeywords::compile(&self.casino_keywords)
                .map_err(ConfigError::InvalidCasinoKeyword)?,
        );

        let mut seen = HashSet::new();
        let mut flavors = Vec::new();
        for spec in &self.matchers {
            if !seen.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
            if spec.enabled {
                flavors.push(CompiledFlavor::compile(spec, &casinos)?);
            }
        }

        Ok(CompiledConfig {
            tolerance: Money::from_cents(self.amount_tolerance_cents),
            accounts: self.accounts,
            flavors,
        })
    }
}

// ── Compiled form ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum LegKeywords {
    None,
    Fixed(KeywordSet),
    ByCasino(Arc<CasinoKeywords>),
}

#[derive(Debug, Clone)]
pub struct CompiledLeg {
    pub side: Side,
    pub sign: BankSign,
    pub keywords: LegKeywords,
    pub include_counterparty: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledProcessor {
    pub window: DateWindow,
    pub keywords: Option<KeywordSet>,
}

#[derive(Debug, Clone)]
pub struct CompiledFeeSplit {
    pub scraped_kind: String,
    pub window: DateWindow,
}

#[derive(Debug, Clone)]
pub struct CompiledFlavor {
    pub name: String,
    pub flavor: Flavor,
    pub kind: TransactionKind,
    pub route: RouteSpec,
    pub window: DateWindow,
    pub legs: Vec<CompiledLeg>,
    pub anchor: Option<Side>,
    pub ambiguity: AmbiguityPolicy,
    pub processor: Option<CompiledProcessor>,
    pub fee_split: Option<CompiledFeeSplit>,
    pub sync_dates: bool,
}

impl CompiledFlavor {
    fn compile(spec: &FlavorSpec, casinos: &Arc<CasinoKeywords>) -> Result<Self, ConfigError> {
        let invalid = |source| ConfigError::InvalidPattern {
            matcher: spec.name.clone(),
            source,
        };

        if spec.legs.is_empty() {
            return Err(ConfigError::NoLegs(spec.name.clone()));
        }
        if spec.legs.len() > 2 || (spec.legs.len() == 2 && spec.legs[0].side == spec.legs[1].side) {
            return Err(ConfigError::DuplicateLeg(spec.name.clone()));
        }
        if let Some(side) = spec.anchor {
            if !spec.legs.iter().any(|l| l.side == side) {
                return Err(ConfigError::AnchorNotALeg {
                    matcher: spec.name.clone(),
                    side,
                });
            }
        }
        if spec.fee_split.is_some() && spec.legs.len() != 2 {
            return Err(ConfigError::FeeSplitNeedsTwoLegs(spec.name.clone()));
        }

        let mut legs = Vec::with_capacity(spec.legs.len());
        for leg in &spec.legs {
            let keywords = match (&leg.keywords, leg.casino_keywords) {
                (_, true) => LegKeywords::ByCasino(Arc::clone(casinos)),
                (Some(k), false) if !k.is_empty() => {
                    LegKeywords::Fixed(KeywordSet::compile(k).map_err(invalid)?)
                }
                _ => LegKeywords::None,
            };
            legs.push(CompiledLeg {
                side: leg.side,
                sign: leg.sign,
                keywords,
                include_counterparty: leg.include_counterparty,
            });
        }

        let processor = match &spec.processor {
            Some(p) => Some(CompiledProcessor {
                window: DateWindow::days(p.window_days),
                keywords: match &p.keywords {
                    Some(k) if !k.is_empty() => Some(KeywordSet::compile(k).map_err(invalid)?),
                    _ => None,
                },
            }),
            None => None,
        };

        Ok(CompiledFlavor {
            name: spec.name.clone(),
            flavor: spec.flavor,
            kind: spec.kind,
            route: spec.route.clone(),
            window: DateWindow::days(spec.date_window_days),
            legs,
            anchor: spec.anchor,
            ambiguity: spec.ambiguity,
            processor,
            fee_split: spec.fee_split.as_ref().map(|f| CompiledFeeSplit {
                scraped_kind: f.scraped_kind.trim().to_lowercase(),
                window: DateWindow::days(f.window_days),
            }),
            sync_dates: spec.sync_dates,
        })
    }

    pub fn selects(&self, tx: &PlatformTransaction) -> bool {
        tx.kind == self.kind && self.route.accepts(tx)
    }

    pub fn leg(&self, side: Side) -> Option<&CompiledLeg> {
        self.legs.iter().find(|l| l.side == side)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub tolerance: Money,
    pub accounts: SplitAccounts,
    pub flavors: Vec<CompiledFlavor>,
}

impl CompiledConfig {
    pub fn flavor(&self, name: &str) -> Option<&CompiledFlavor> {
        self.flavors.iter().find(|f| f.name == name)
    }
}
