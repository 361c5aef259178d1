//! Built-in matcher configurations, used when no configuration file overrides them.

use ledgerlink_core::{AccountId, AccountType, Side, TransactionKind};

use crate::config::{
    AmbiguityPolicy, BankSign, FeeSplitSpec, Flavor, FlavorSpec, LegSpec, ProcessorSpec,
    RouteSpec,
};
use crate::keywords::KeywordSpec;

pub const CLEARING_ACCOUNT_ID: i64 = 36715;
pub const FEES_ACCOUNT_ID: i64 = 18;
pub const AUTOMATION_USER_ID: i64 = 35047;

/// "individual" matches broadly, but links already in the ledger were made
/// with this list. Narrowing it changes which records are rematched.
pub const RETURNED_KEYWORDS: &[&str] = &["checkbook", "reel ventures", "rv enhanced wall", "individual"];

/// Bank-side descriptions of a betting bank → PayPal transfer.
pub const BANK_TO_PAYPAL_KEYWORDS: &[&str] = &[
    "^paypal transfer$",
    "^paypal transfer.*add to balance",
    "add to balance paypal transfer$",
    "paypal inst xfer",
    "inst xfer paypal",
    "paypal acctverify",
    "paypal retry pymt",
    "money transfer authorized",
    "paypal reversal",
    "paypal recovery",
    "recovery paypal",
    "paypal des",
    "pmnt sent",
    "visa.*paypal",
    "paypal.*visa direct",
    "^paypal$",
];

/// Bank-side descriptions of a PayPal → betting bank transfer.
pub const PAYPAL_TO_BANK_KEYWORDS: &[&str] = &[
    "^paypal transfer$",
    "paypal transfer",
    "transfer.*paypal",
    "^paypal",
    "rtp.*paypal",
    "instant.*paypal",
    "paypal paypal",
    "money transfer authorized",
];

pub const BETTING_BANK_TO_FEES_KEYWORDS: &[&str] = &[
    "MONTHLY SERVICE FEE",
    "OVERDRAFT",
    "CHECKBOOK INC",
    "PAYPAL ACCTVERIFY",
    "HSAWCSPCUSTODIAN ACCTVERIFY",
];

pub const FEES_TO_BETTING_BANK_KEYWORDS: &[&str] = &[
    "Checkbook Inc MICRO DEP",
    "CHECKBOOK INC ACCTVERIFY",
    "PAYPAL ACCTVERIFY",
    "SIGHTLINE_BNKGEO ACCOUNTREG",
    "HSAWCSPCUSTODIAN ACCTVERIFY",
];

pub fn amount_tolerance_cents() -> i64 {
    1
}

pub fn processor_window_days() -> u32 {
    3
}

pub fn scraped_kind() -> String {
    "transfer_sent".to_string()
}

pub fn fee_split_window_days() -> u32 {
    7
}

pub fn enabled() -> bool {
    true
}

fn leg(side: Side, sign: BankSign) -> LegSpec {
    LegSpec {
        side,
        sign,
        keywords: None,
        casino_keywords: false,
        include_counterparty: false,
    }
}

fn flavor(name: &str, flavor: Flavor, kind: TransactionKind, window: u32, legs: Vec<LegSpec>) -> FlavorSpec {
    FlavorSpec {
        name: name.to_string(),
        flavor,
        kind,
        route: RouteSpec::default(),
        date_window_days: window,
        legs,
        anchor: None,
        ambiguity: AmbiguityPolicy::BestCandidate,
        processor: None,
        fee_split: None,
        sync_dates: false,
        enabled: true,
    }
}

pub fn matchers() -> Vec<FlavorSpec> {
    // Money arriving at the player's betting bank, corroborated by the processor.
    let received = FlavorSpec {
        processor: Some(ProcessorSpec {
            window_days: processor_window_days(),
            keywords: None,
        }),
        sync_dates: true,
        ..flavor(
            "received",
            Flavor::Received,
            TransactionKind::Received,
            5,
            vec![leg(Side::To, BankSign::Negative)],
        )
    };

    let returned = FlavorSpec {
        sync_dates: true,
        ..flavor(
            "returned",
            Flavor::Returned,
            TransactionKind::Returned,
            5,
            vec![LegSpec {
                keywords: Some(KeywordSpec::contains(RETURNED_KEYWORDS)),
                ..leg(Side::From, BankSign::Positive)
            }],
        )
    };

    let bank_to_paypal = FlavorSpec {
        route: RouteSpec {
            from_type: Some(AccountType::BettingBank),
            to_type: Some(AccountType::BettingPaypal),
            ..Default::default()
        },
        ..flavor(
            "transfer_bank_to_paypal",
            Flavor::Transfer,
            TransactionKind::Transfer,
            7,
            vec![
                LegSpec {
                    keywords: Some(KeywordSpec::patterns(BANK_TO_PAYPAL_KEYWORDS)),
                    ..leg(Side::From, BankSign::Positive)
                },
                LegSpec {
                    keywords: Some(KeywordSpec::patterns(&["money transfer from"])),
                    ..leg(Side::To, BankSign::Negative)
                },
            ],
        )
    };

    // A PayPal-side hit alone is not evidence the money reached the bank.
    let paypal_to_bank = FlavorSpec {
        route: RouteSpec {
            from_type: Some(AccountType::BettingPaypal),
            to_type: Some(AccountType::BettingBank),
            ..Default::default()
        },
        anchor: Some(Side::To),
        fee_split: Some(FeeSplitSpec {
            scraped_kind: scraped_kind(),
            window_days: fee_split_window_days(),
        }),
        ..flavor(
            "transfer_paypal_to_bank",
            Flavor::Transfer,
            TransactionKind::Transfer,
            7,
            vec![
                LegSpec {
                    keywords: Some(KeywordSpec::patterns(&["money transfer to"])),
                    ..leg(Side::From, BankSign::Positive)
                },
                LegSpec {
                    keywords: Some(KeywordSpec::patterns(PAYPAL_TO_BANK_KEYWORDS)),
                    ..leg(Side::To, BankSign::Negative)
                },
            ],
        )
    };

    let fee_outbound = FlavorSpec {
        route: RouteSpec {
            to_account: Some(AccountId(FEES_ACCOUNT_ID)),
            ..Default::default()
        },
        ambiguity: AmbiguityPolicy::RejectMultiple,
        ..flavor(
            "fee_outbound",
            Flavor::Fee,
            TransactionKind::Fees,
            9,
            vec![LegSpec {
                keywords: Some(KeywordSpec::contains(BETTING_BANK_TO_FEES_KEYWORDS)),
                include_counterparty: true,
                ..leg(Side::From, BankSign::Positive)
            }],
        )
    };

    let fee_inbound = FlavorSpec {
        route: RouteSpec {
            from_account: Some(AccountId(FEES_ACCOUNT_ID)),
            ..Default::default()
        },
        ambiguity: AmbiguityPolicy::RejectMultiple,
        ..flavor(
            "fee_inbound",
            Flavor::Fee,
            TransactionKind::Fees,
            9,
            vec![LegSpec {
                keywords: Some(KeywordSpec::contains(FEES_TO_BETTING_BANK_KEYWORDS)),
                include_counterparty: true,
                ..leg(Side::To, BankSign::Negative)
            }],
        )
    };

    let deposit = flavor(
        "deposit",
        Flavor::Deposit,
        TransactionKind::Deposit,
        9,
        vec![LegSpec {
            casino_keywords: true,
            include_counterparty: true,
            ..leg(Side::From, BankSign::Positive)
        }],
    );

    let withdrawal = flavor(
        "withdrawal",
        Flavor::Withdrawal,
        TransactionKind::Withdrawal,
        9,
        vec![LegSpec {
            casino_keywords: true,
            include_counterparty: true,
            ..leg(Side::To, BankSign::Negative)
        }],
    );

    vec![
        received,
        returned,
        bank_to_paypal,
        paypal_to_bank,
        fee_outbound,
        fee_inbound,
        deposit,
        withdrawal,
    ]
}
