use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally observed bank (or PayPal) account that bank transactions belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankAccountId(pub i64);

impl fmt::Display for BankAccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    BettingBank,
    BettingPaypal,
    BackerBank,
    PlayerBank,
    External,
    Fees,
    Transfer,
    Other(String),
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::BettingBank => write!(f, "Betting bank account"),
            AccountType::BettingPaypal => write!(f, "Betting PayPal account"),
            AccountType::BackerBank => write!(f, "Backer bank account"),
            AccountType::PlayerBank => write!(f, "Player bank account"),
            AccountType::External => write!(f, "External account"),
            AccountType::Fees => write!(f, "Fees"),
            AccountType::Transfer => write!(f, "Transfer"),
            AccountType::Other(raw) => write!(f, "{raw}"),
        }
    }
}

impl FromStr for AccountType {
    type Err = std::convert::Infallible;

    /// The ledger stores account types as free text; unknown labels are kept verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Ok(match normalized.as_str() {
            "betting bank account" | "betting bank" => AccountType::BettingBank,
            "betting paypal account" | "betting paypal" => AccountType::BettingPaypal,
            "backer bank account" | "backer bank" => AccountType::BackerBank,
            "player bank account" | "player bank" => AccountType::PlayerBank,
            "external account" | "external" => AccountType::External,
            "fees" | "fees account" => AccountType::Fees,
            "transfer" | "transfer account" => AccountType::Transfer,
            _ => AccountType::Other(s.trim().to_string()),
        })
    }
}

/// One side (`from` or `to`) of a platform transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub account_id: Option<AccountId>,
    pub account_type: Option<AccountType>,
    pub name: Option<String>,
    /// Bank account the ledger account is mirrored by, when it has one.
    pub bank_account_id: Option<BankAccountId>,
}

impl AccountRef {
    pub fn new(account_id: AccountId) -> Self {
        AccountRef {
            account_id: Some(account_id),
            account_type: None,
            name: None,
            bank_account_id: None,
        }
    }

    pub fn with_type(mut self, account_type: AccountType) -> Self {
        self.account_type = Some(account_type);
        self
    }

    pub fn with_bank_account(mut self, bank_account_id: BankAccountId) -> Self {
        self.bank_account_id = Some(bank_account_id);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Which side of a platform transaction a bank record settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    From,
    To,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::From => write!(f, "from"),
            Side::To => write!(f, "to"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_parses_ledger_labels() {
        assert_eq!("Betting bank account".parse::<AccountType>().unwrap(), AccountType::BettingBank);
        assert_eq!(" betting PayPal account ".parse::<AccountType>().unwrap(), AccountType::BettingPaypal);
        assert_eq!("Fees".parse::<AccountType>().unwrap(), AccountType::Fees);
    }

    #[test]
    fn unknown_account_type_is_kept_verbatim() {
        let parsed: AccountType = "Casino wallet".parse().unwrap();
        assert_eq!(parsed, AccountType::Other("Casino wallet".to_string()));
        assert_eq!(parsed.to_string(), "Casino wallet");
    }

    #[test]
    fn account_type_serde_is_snake_case() {
        let json = serde_json::to_string(&AccountType::BettingPaypal).unwrap();
        assert_eq!(json, "\"betting_paypal\"");
    }

    #[test]
    fn account_ref_builder() {
        let acct = AccountRef::new(AccountId(7))
            .with_type(AccountType::BettingBank)
            .with_bank_account(BankAccountId(300));
        assert_eq!(acct.bank_account_id, Some(BankAccountId(300)));
        assert_eq!(acct.account_type, Some(AccountType::BettingBank));
    }
}
