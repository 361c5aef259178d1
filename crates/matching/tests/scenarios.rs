use chrono::{NaiveDate, TimeZone, Utc};
use ledgerlink_core::{
    AccountId, AccountRef, AccountType, BankAccountId, BankLink, BankTransaction,
    BankTransactionId, ExternalRef, Money, PaymentDirection, PlatformTransaction,
    PlatformTransactionId, ProcessorPayment, ProcessorPaymentId, ScrapedLine, ScrapedLineId,
    TransactionKind, UserId,
};
use ledgerlink_ledger::{InMemorySource, PlannedCommand, PlayerSnapshot, RecordingLedger};
use ledgerlink_match::{
    apply, reconcile, reconcile_player, CompiledConfig, MatchOrigin, MatcherConfig,
    PlayerRecords, TieBreak, UnmatchedReason,
};
use std::collections::HashSet;
use std::io::Write;

const PLAYER: UserId = UserId(4242);

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn defaults() -> CompiledConfig {
    MatcherConfig::default().compile().unwrap()
}

fn platform(id: i64, kind: TransactionKind, cents: i64, date: NaiveDate) -> PlatformTransaction {
    PlatformTransaction {
        id: PlatformTransactionId(id),
        kind,
        amount: Money::from_cents(cents),
        date,
        from: AccountRef::new(AccountId(1)),
        to: AccountRef::new(AccountId(2)),
        links: Vec::new(),
        notes: None,
        name: None,
        added_by: None,
    }
}

fn received(id: i64, cents: i64, date: NaiveDate, account: i64) -> PlatformTransaction {
    let mut tx = platform(id, TransactionKind::Received, cents, date);
    tx.to = tx.to.with_bank_account(BankAccountId(account));
    tx
}

fn returned(id: i64, cents: i64, date: NaiveDate, account: i64) -> PlatformTransaction {
    let mut tx = platform(id, TransactionKind::Returned, cents, date);
    tx.from = tx.from.with_bank_account(BankAccountId(account));
    tx
}

fn bank(id: i64, cents: i64, date: NaiveDate, account: i64, name: &str) -> BankTransaction {
    BankTransaction {
        id: BankTransactionId(id),
        external_ref: Some(ExternalRef(format!("ext-{id}"))),
        amount: Money::from_cents(cents),
        date,
        name: name.to_string(),
        counterparty: None,
        bank_account_id: BankAccountId(account),
        linked_to: None,
    }
}

fn payment(id: i64, cents: i64, at: (u32, u32, u32)) -> ProcessorPayment {
    ProcessorPayment {
        id: ProcessorPaymentId(id),
        amount: Money::from_cents(cents),
        direction: PaymentDirection::Outgoing,
        recipient: Some(PLAYER),
        description: "Deposit from external source".to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, at.0, at.1, at.2, 0, 0).unwrap(),
    }
}

fn records(platform: Vec<PlatformTransaction>, bank: Vec<BankTransaction>) -> PlayerRecords {
    PlayerRecords::new(PLAYER, platform, bank, Vec::new(), Vec::new())
}

#[test]
fn received_with_processor_payment_links_all_three() {
    let records = PlayerRecords::new(
        PLAYER,
        vec![received(1, 250_000, day(2025, 8, 6), 18668)],
        vec![bank(1, -250_000, day(2025, 8, 6), 18668, "CHECKBOOK INC")],
        vec![payment(9, 250_000, (8, 6, 14))],
        Vec::new(),
    );
    let config = defaults();
    let result = reconcile(&records, &config);

    assert_eq!(result.matches.len(), 1);
    let m = &result.matches[0];
    assert_eq!(m.platform, PlatformTransactionId(1));
    assert_eq!(m.bank.id, BankTransactionId(1));
    assert_eq!(m.payment, Some(ProcessorPaymentId(9)));
    assert!(result.unmatched.is_empty());

    let ledger = RecordingLedger::new(records.platform.clone());
    let report = apply(&result, &records, &ledger, &config);
    assert_eq!(report.linked, 1);
    assert_eq!(
        ledger.planned(),
        vec![PlannedCommand::LinkBankTransaction {
            external_ref: ExternalRef("ext-1".to_string()),
            platform: PlatformTransactionId(1),
        }]
    );
}

#[test]
fn duplicate_platform_entries_share_one_bank_record() {
    let toml = r#"
        [[matchers]]
        name = "outbound_transfer"
        flavor = "transfer"
        kind = "transfer"
        date_window_days = 3

        [[matchers.legs]]
        side = "from"
        sign = "negative"
    "#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    let config = MatcherConfig::load(file.path()).unwrap().compile().unwrap();

    let mut first = platform(1, TransactionKind::Transfer, 10_000, day(2025, 1, 1));
    first.from = first.from.with_bank_account(BankAccountId(50));
    let mut second = first.clone();
    second.id = PlatformTransactionId(2);

    let records = records(
        vec![second, first],
        vec![bank(7, -10_000, day(2025, 1, 1), 50, "TRANSFER")],
    );
    let result = reconcile(&records, &config);

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].platform, PlatformTransactionId(1));
    assert_eq!(result.matches[0].origin, MatchOrigin::DuplicateGroup);
    assert_eq!(result.unmatched.len(), 1);
    let loser = &result.unmatched[0];
    assert_eq!(loser.platform, PlatformTransactionId(2));
    assert_eq!(
        loser.reasons,
        vec![UnmatchedReason::BankClaimed {
            side: ledgerlink_core::Side::From,
            bank: BankTransactionId(7),
            by: PlatformTransactionId(1),
            tie_break: Some(TieBreak::LowestId),
        }]
    );
    assert!(loser.summary().contains("duplicate group"));
}

#[test]
fn duplicate_group_is_resolved_before_later_dates() {
    let mut first = returned(1, 10_000, day(2025, 8, 6), 300);
    first.added_by = Some(PLAYER);
    let second = returned(2, 10_000, day(2025, 8, 6), 300);
    let later = returned(3, 10_000, day(2025, 8, 9), 300);

    let records = records(
        vec![later, second, first],
        vec![bank(50, 10_000, day(2025, 8, 6), 300, "CHECKBOOK TRANSFER")],
    );
    let result = reconcile(&records, &defaults());

    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].platform, PlatformTransactionId(1));
    assert_eq!(result.matches[0].bank.id, BankTransactionId(50));
    assert_eq!(result.matches[0].origin, MatchOrigin::DuplicateGroup);

    let reasons = |id: i64| {
        result
            .unmatched
            .iter()
            .find(|u| u.platform == PlatformTransactionId(id))
            .map(|u| u.reasons.clone())
            .unwrap()
    };
    assert_eq!(
        reasons(2),
        vec![UnmatchedReason::BankClaimed {
            side: ledgerlink_core::Side::From,
            bank: BankTransactionId(50),
            by: PlatformTransactionId(1),
            tie_break: Some(TieBreak::AddedByCounterpart),
        }]
    );
    assert_eq!(
        reasons(3),
        vec![UnmatchedReason::BankClaimed {
            side: ledgerlink_core::Side::From,
            bank: BankTransactionId(50),
            by: PlatformTransactionId(1),
            tie_break: None,
        }]
    );
}

fn paypal_fee_snapshot() -> PlayerSnapshot {
    let mut tx = platform(1, TransactionKind::Transfer, 50_000, day(2025, 6, 2));
    tx.from = AccountRef::new(AccountId(10))
        .with_type(AccountType::BettingPaypal)
        .with_bank_account(BankAccountId(400));
    tx.to = AccountRef::new(AccountId(11))
        .with_type(AccountType::BettingBank)
        .with_bank_account(BankAccountId(300));
    PlayerSnapshot {
        platform: vec![tx],
        bank: vec![
            bank(21, 50_000, day(2025, 6, 2), 400, "Money Transfer to Bank"),
            bank(22, -48_500, day(2025, 6, 4), 300, "PAYPAL TRANSFER"),
        ],
        payments: Vec::new(),
        scraped: vec![ScrapedLine {
            id: ScrapedLineId(1),
            gross: Money::from_cents(-50_000),
            net: Money::from_cents(-48_500),
            kind: "transfer_sent".to_string(),
            source: Some("paypal".to_string()),
            date: day(2025, 6, 2),
        }],
    }
}

#[test]
fn paypal_transfer_with_fee_splits_three_ways() {
    let snapshot = paypal_fee_snapshot();
    let ledger = RecordingLedger::new(snapshot.platform.clone());
    let source = InMemorySource::new().with_player(PLAYER, snapshot);
    let config = defaults();
    let report = reconcile_player(&source, &ledger, &config, PLAYER, None).unwrap();

    let found = &report.reconciliation.three_way;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].fee, Money::from_cents(1_500));
    assert_eq!(found[0].net, Money::from_cents(48_500));
    assert!(report.execution.failures.is_empty());
    assert_eq!(report.execution.splits.len(), 1);

    let split = &report.execution.splits[0];
    let original = ledger.transaction(PlatformTransactionId(1)).unwrap();
    assert_eq!(original.to.account_id, Some(config.accounts.clearing_account));
    assert_eq!(original.amount, Money::from_cents(50_000));

    let fee = ledger.transaction(split.fee_transaction).unwrap();
    let net = ledger.transaction(split.net_transaction).unwrap();
    assert_eq!(fee.amount, Money::from_cents(1_500));
    assert_eq!(fee.to.account_id, Some(config.accounts.fees_account));
    assert_eq!(net.amount, Money::from_cents(48_500));
    assert_eq!(net.to.account_id, Some(AccountId(11)));
    assert_eq!(fee.amount + net.amount, original.amount);

    let links: Vec<(String, PlatformTransactionId)> = ledger
        .planned()
        .into_iter()
        .filter_map(|c| match c {
            PlannedCommand::LinkBankTransaction {
                external_ref,
                platform,
            } => Some((external_ref.0, platform)),
            _ => None,
        })
        .collect();
    assert_eq!(
        links,
        vec![
            ("ext-21".to_string(), PlatformTransactionId(1)),
            ("ext-22".to_string(), split.net_transaction),
        ]
    );
}

#[test]
fn empty_account_reads_no_bank_transactions_found() {
    let result = reconcile(
        &records(
            vec![received(1, 10_000, day(2025, 3, 1), 777)],
            vec![bank(1, -10_000, day(2025, 3, 1), 888, "CHECKBOOK")],
        ),
        &defaults(),
    );
    assert_eq!(result.unmatched.len(), 1);
    assert_eq!(
        result.unmatched[0].summary(),
        "No bank transactions found for account 777"
    );
}

#[test]
fn keyword_failure_lists_rejected_descriptions() {
    let result = reconcile(
        &records(
            vec![returned(1, 10_000, day(2025, 3, 1), 300)],
            vec![
                bank(1, 10_000, day(2025, 3, 1), 300, "ZELLE TO MOM"),
                bank(2, 10_000, day(2025, 3, 2), 300, "VENMO CASHOUT"),
            ],
        ),
        &defaults(),
    );
    let summary = result.unmatched[0].summary();
    assert!(summary.contains("'ZELLE TO MOM'"), "{summary}");
    assert!(summary.contains("'VENMO CASHOUT'"), "{summary}");
}

#[test]
fn no_bank_record_or_payment_is_consumed_twice() {
    let platform: Vec<PlatformTransaction> = (1..=6)
        .map(|i| received(i, 10_000, day(2025, 4, 1 + (i as u32 % 3)), 300))
        .collect();
    let bank: Vec<BankTransaction> = (1..=4)
        .map(|i| bank(i, -10_000, day(2025, 4, 1 + (i as u32 % 2)), 300, "CHECKBOOK"))
        .collect();
    let payments = vec![
        payment(1, 10_000, (4, 1, 10)),
        payment(2, 10_000, (4, 2, 10)),
        payment(3, 10_000, (4, 2, 11)),
    ];
    let records = PlayerRecords::new(PLAYER, platform, bank, payments, Vec::new());
    let result = reconcile(&records, &defaults());

    let mut banks = HashSet::new();
    let mut used = HashSet::new();
    for m in &result.matches {
        assert!(banks.insert(m.bank.id), "bank {} consumed twice", m.bank.id);
        if let Some(p) = m.payment {
            assert!(used.insert(p), "payment {p} consumed twice");
        }
    }
    // Each payment backs at most one match, and the best payment decides.
    assert_eq!(result.matches.len(), 2);
    assert_eq!(result.unmatched.len(), 4);
}

#[test]
fn existing_links_are_preserved() {
    let mut tx = returned(1, 10_000, day(2025, 3, 1), 300);
    tx.links.push(BankLink {
        bank_transaction_id: BankTransactionId(5),
        bank_account_id: Some(BankAccountId(300)),
    });
    let mut linked = bank(5, 99_999, day(2024, 1, 1), 300, "ANYTHING");
    linked.linked_to = Some(PlatformTransactionId(1));
    let better = bank(6, 10_000, day(2025, 3, 1), 300, "CHECKBOOK");

    let result = reconcile(&records(vec![tx], vec![linked, better]), &defaults());
    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].bank.id, BankTransactionId(5));
    assert_eq!(result.matches[0].origin, MatchOrigin::Direct);
}

#[test]
fn amount_tolerance_is_one_cent_either_way() {
    let matched = |bank_cents: i64| {
        let result = reconcile(
            &records(
                vec![returned(1, 10_000, day(2025, 3, 1), 300)],
                vec![bank(1, bank_cents, day(2025, 3, 1), 300, "CHECKBOOK")],
            ),
            &defaults(),
        );
        result.matches.len() == 1
    };
    assert!(matched(10_001));
    assert!(matched(9_999));
    assert!(!matched(10_002));
    assert!(!matched(9_998));
}

#[test]
fn date_window_boundary_per_flavor() {
    let config = defaults();
    let returned_at = |offset: u64| {
        let bank_date = day(2025, 3, 1) + chrono::Days::new(offset);
        reconcile(
            &records(
                vec![returned(1, 10_000, day(2025, 3, 1), 300)],
                vec![bank(1, 10_000, bank_date, 300, "CHECKBOOK")],
            ),
            &config,
        )
        .matches
        .len()
    };
    assert_eq!(returned_at(5), 1);
    assert_eq!(returned_at(6), 0);

    let fee_at = |offset: u64| {
        let mut tx = platform(1, TransactionKind::Fees, 2_500, day(2025, 3, 1));
        tx.from = tx.from.with_bank_account(BankAccountId(300));
        tx.to = AccountRef::new(AccountId(18));
        let bank_date = day(2025, 3, 1) - chrono::Days::new(offset);
        reconcile(
            &records(
                vec![tx],
                vec![bank(1, 2_500, bank_date, 300, "OVERDRAFT ITEM FEE")],
            ),
            &config,
        )
        .matches
        .len()
    };
    assert_eq!(fee_at(9), 1);
    assert_eq!(fee_at(10), 0);
}

#[test]
fn identical_input_gives_identical_output() {
    let snapshot = paypal_fee_snapshot();
    let mut platform = snapshot.platform.clone();
    platform.push(received(2, 10_000, day(2025, 6, 3), 300));
    platform.push(received(3, 10_000, day(2025, 6, 3), 300));
    let mut bank = snapshot.bank.clone();
    bank.push(self::bank(30, -10_000, day(2025, 6, 3), 300, "CHECKBOOK"));
    let records = PlayerRecords::new(
        PLAYER,
        platform,
        bank,
        vec![payment(1, 10_000, (6, 3, 8))],
        snapshot.scraped.clone(),
    );
    let config = defaults();
    let first = serde_json::to_string(&reconcile(&records, &config)).unwrap();
    let second = serde_json::to_string(&reconcile(&records, &config)).unwrap();
    assert_eq!(first, second);
}
