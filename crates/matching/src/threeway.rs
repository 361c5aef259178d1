use ledgerlink_core::{
    day_offset, money::CENT, BankTransaction, DateWindow, Money, PlatformTransaction, ScrapedLine,
    Side,
};

use crate::config::{BankSign, CompiledFeeSplit, CompiledFlavor};
use crate::consumption::{ClaimView, ConsumptionLedger};
use crate::filter::amount_matches;
use crate::outcome::ThreeWayMatch;
use crate::records::{BankIndex, PlayerRecords};

/// Bank records of one account, with the sign money must carry there.
struct AccountSide<'i, 'r> {
    sign: BankSign,
    pool: &'i [&'r BankTransaction],
}

impl<'r> AccountSide<'_, 'r> {
    fn best(
        &self,
        magnitude: Money,
        line: &ScrapedLine,
        window: DateWindow,
        ledger: &ConsumptionLedger,
        tolerance: Money,
    ) -> Option<&'r BankTransaction> {
        self.pool
            .iter()
            .copied()
            .filter(|bt| ledger.bank_claim(bt.id).is_none())
            .filter(|bt| amount_matches(magnitude, bt.amount, self.sign, tolerance))
            .filter(|bt| window.contains(line.date, bt.date))
            .min_by_key(|bt| (day_offset(line.date, bt.date), bt.id))
    }
}

/// Looks for a scraped line proving a fee was taken out of `tx` in flight,
/// plus the bank records on either end of it.
///
/// Gross and net are compared by magnitude. The gross departure on the source
/// account makes a full match; when only the net arrival on the destination
/// exists the result is a fallback match without a gross-side record.
pub fn find(
    tx: &PlatformTransaction,
    flavor: &CompiledFlavor,
    split: &CompiledFeeSplit,
    records: &PlayerRecords,
    index: &BankIndex<'_>,
    ledger: &ConsumptionLedger,
    tolerance: Money,
) -> Option<ThreeWayMatch> {
    let source_leg = flavor.leg(Side::From)?;
    let dest_leg = flavor.leg(Side::To)?;
    let source = tx.from.bank_account_id.map(|acct| AccountSide {
        sign: source_leg.sign,
        pool: index.for_account(acct),
    });
    let dest = tx.to.bank_account_id.map(|acct| AccountSide {
        sign: dest_leg.sign,
        pool: index.for_account(acct),
    });

    let lines = records
        .scraped
        .iter()
        .filter(|l| l.kind == split.scraped_kind)
        .filter(|l| ledger.scraped_claimant(l.id).is_none())
        .filter(|l| split.window.contains(tx.date, l.date));

    for line in lines {
        let (gross, net) = (line.gross_abs(), line.net_abs());
        let amount = tx.amount.abs();
        if !amount.approx_eq(gross, tolerance) && !amount.approx_eq(net, tolerance) {
            continue;
        }
        let fee = gross - net;
        if fee <= CENT {
            continue;
        }

        let gross_bank = source
            .as_ref()
            .and_then(|s| s.best(gross, line, split.window, ledger, tolerance));
        let net_bank = dest
            .as_ref()
            .and_then(|s| s.best(net, line, split.window, ledger, tolerance));
        if gross_bank.is_none() && net_bank.is_none() {
            continue;
        }

        return Some(ThreeWayMatch {
            matcher: flavor.name.clone(),
            platform: tx.id,
            scraped: line.clone(),
            gross_bank: gross_bank.cloned(),
            net_bank: net_bank.cloned(),
            gross,
            net,
            fee,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use chrono::NaiveDate;
    use ledgerlink_core::{
        AccountId, AccountRef, AccountType, BankAccountId, BankTransactionId,
        PlatformTransactionId, ScrapedLineId, TransactionKind, UserId,
    };

    const PAYPAL: BankAccountId = BankAccountId(400);
    const CHECKING: BankAccountId = BankAccountId(300);

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn transfer(cents: i64) -> PlatformTransaction {
        PlatformTransaction {
            id: PlatformTransactionId(1),
            kind: TransactionKind::Transfer,
            amount: Money::from_cents(cents),
            date: date(1),
            from: AccountRef::new(AccountId(10))
                .with_type(AccountType::BettingPaypal)
                .with_bank_account(PAYPAL),
            to: AccountRef::new(AccountId(11))
                .with_type(AccountType::BettingBank)
                .with_bank_account(CHECKING),
            links: Vec::new(),
            notes: None,
            name: None,
            added_by: None,
        }
    }

    fn bank(id: i64, cents: i64, d: u32, account: BankAccountId) -> BankTransaction {
        BankTransaction {
            id: BankTransactionId(id),
            external_ref: None,
            amount: Money::from_cents(cents),
            date: date(d),
            name: "PAYPAL TRANSFER".to_string(),
            counterparty: None,
            bank_account_id: account,
            linked_to: None,
        }
    }

    fn line(id: i64, gross: i64, net: i64, kind: &str) -> ScrapedLine {
        ScrapedLine {
            id: ScrapedLineId(id),
            gross: Money::from_cents(gross),
            net: Money::from_cents(net),
            kind: kind.to_string(),
            source: Some("paypal".to_string()),
            date: date(2),
        }
    }

    fn run(
        tx: &PlatformTransaction,
        bank: Vec<BankTransaction>,
        scraped: Vec<ScrapedLine>,
        ledger: &ConsumptionLedger,
    ) -> Option<ThreeWayMatch> {
        let config = MatcherConfig::default().compile().unwrap();
        let flavor = config.flavor("transfer_paypal_to_bank").unwrap();
        let split = flavor.fee_split.as_ref().unwrap();
        let records = PlayerRecords::new(UserId(81), vec![tx.clone()], bank, Vec::new(), scraped);
        let index = BankIndex::new(&records.bank);
        find(tx, flavor, split, &records, &index, ledger, CENT)
    }

    #[test]
    fn finds_both_ends_of_a_fee_split() {
        let tx = transfer(50_000);
        let found = run(
            &tx,
            vec![bank(1, 50_000, 2, PAYPAL), bank(2, -48_500, 3, CHECKING)],
            vec![line(7, -50_000, -48_500, "transfer_sent")],
            &ConsumptionLedger::default(),
        )
        .unwrap();

        assert!(!found.is_fallback());
        assert_eq!(found.gross_bank.unwrap().id, BankTransactionId(1));
        assert_eq!(found.net_bank.unwrap().id, BankTransactionId(2));
        assert_eq!(found.fee, Money::from_cents(1_500));
        assert_eq!(found.gross, found.net + found.fee);
    }

    #[test]
    fn net_arrival_alone_is_a_fallback() {
        let tx = transfer(48_500);
        let found = run(
            &tx,
            vec![bank(2, -48_500, 3, CHECKING)],
            vec![line(7, -50_000, -48_500, "transfer_sent")],
            &ConsumptionLedger::default(),
        )
        .unwrap();

        assert!(found.is_fallback());
        assert_eq!(found.net, Money::from_cents(48_500));
    }

    #[test]
    fn lines_without_a_fee_are_ignored() {
        let tx = transfer(50_000);
        let found = run(
            &tx,
            vec![bank(1, 50_000, 2, PAYPAL)],
            vec![line(7, -50_000, -50_000, "transfer_sent")],
            &ConsumptionLedger::default(),
        );
        assert!(found.is_none());
    }

    #[test]
    fn other_line_kinds_are_ignored() {
        let tx = transfer(50_000);
        let found = run(
            &tx,
            vec![bank(1, 50_000, 2, PAYPAL)],
            vec![line(7, -50_000, -48_500, "payment_received")],
            &ConsumptionLedger::default(),
        );
        assert!(found.is_none());
    }

    #[test]
    fn claimed_lines_and_banks_are_skipped() {
        let tx = transfer(50_000);
        let mut ledger = ConsumptionLedger::default();
        ledger
            .claim_scraped(ScrapedLineId(7), PlatformTransactionId(99))
            .unwrap();
        let found = run(
            &tx,
            vec![bank(1, 50_000, 2, PAYPAL)],
            vec![line(7, -50_000, -48_500, "transfer_sent")],
            &ledger,
        );
        assert!(found.is_none());

        let mut ledger = ConsumptionLedger::default();
        ledger
            .claim_bank(BankTransactionId(1), PlatformTransactionId(99))
            .unwrap();
        let found = run(
            &tx,
            vec![bank(1, 50_000, 2, PAYPAL)],
            vec![line(8, -50_000, -48_500, "transfer_sent")],
            &ledger,
        );
        assert!(found.is_none());
    }
}
