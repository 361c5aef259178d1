use ledgerlink_core::{
    BankAccountId, BankTransaction, BankTransactionId, PlatformTransaction, ProcessorPayment,
    ScrapedLine, UserId,
};
use std::collections::{BTreeMap, HashMap};

/// Everything fetched for one player, sorted into processing order.
#[derive(Debug, Clone)]
pub struct PlayerRecords {
    pub player: UserId,
    pub platform: Vec<PlatformTransaction>,
    pub bank: Vec<BankTransaction>,
    pub payments: Vec<ProcessorPayment>,
    pub scraped: Vec<ScrapedLine>,
}

impl PlayerRecords {
    pub fn new(
        player: UserId,
        mut platform: Vec<PlatformTransaction>,
        mut bank: Vec<BankTransaction>,
        mut payments: Vec<ProcessorPayment>,
        mut scraped: Vec<ScrapedLine>,
    ) -> Self {
        platform.sort_by_key(|tx| (tx.date, tx.id));
        bank.sort_by_key(|bt| (bt.date, bt.id));
        payments.sort_by_key(|p| (p.timestamp, p.id));
        scraped.sort_by_key(|s| (s.date, s.id));
        PlayerRecords {
            player,
            platform,
            bank,
            payments,
            scraped,
        }
    }

    pub fn platform_by_id(
        &self,
        id: ledgerlink_core::PlatformTransactionId,
    ) -> Option<&PlatformTransaction> {
        self.platform.iter().find(|tx| tx.id == id)
    }
}

/// Bank records grouped by bank account, each group in `(date, id)` order.
#[derive(Debug)]
pub struct BankIndex<'r> {
    by_account: BTreeMap<BankAccountId, Vec<&'r BankTransaction>>,
    by_id: HashMap<BankTransactionId, &'r BankTransaction>,
}

impl<'r> BankIndex<'r> {
    pub fn new(bank: &'r [BankTransaction]) -> Self {
        let mut by_account: BTreeMap<BankAccountId, Vec<&'r BankTransaction>> = BTreeMap::new();
        let mut by_id = HashMap::with_capacity(bank.len());
        for bt in bank {
            by_account.entry(bt.bank_account_id).or_default().push(bt);
            by_id.insert(bt.id, bt);
        }
        for group in by_account.values_mut() {
            group.sort_by_key(|bt| (bt.date, bt.id));
        }
        BankIndex { by_account, by_id }
    }

    pub fn for_account(&self, account: BankAccountId) -> &[&'r BankTransaction] {
        self.by_account
            .get(&account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, id: BankTransactionId) -> Option<&'r BankTransaction> {
        self.by_id.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerlink_core::{AccountId, AccountRef, Money, PlatformTransactionId, TransactionKind};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    fn platform(id: i64, on: NaiveDate) -> PlatformTransaction {
        PlatformTransaction {
            id: PlatformTransactionId(id),
            kind: TransactionKind::Deposit,
            amount: Money::from_cents(1_000),
            date: on,
            from: AccountRef::new(AccountId(1)),
            to: AccountRef::new(AccountId(2)),
            links: Vec::new(),
            notes: None,
            name: None,
            added_by: None,
        }
    }

    fn bank(id: i64, on: NaiveDate, account: i64) -> BankTransaction {
        BankTransaction {
            id: BankTransactionId(id),
            external_ref: None,
            amount: Money::from_cents(1_000),
            date: on,
            name: "DEPOSIT".to_string(),
            counterparty: None,
            bank_account_id: BankAccountId(account),
            linked_to: None,
        }
    }

    #[test]
    fn records_are_sorted_by_date_then_id() {
        let records = PlayerRecords::new(
            UserId(81),
            vec![platform(3, date(2)), platform(2, date(1)), platform(1, date(2))],
            vec![bank(9, date(3), 300), bank(4, date(1), 300)],
            Vec::new(),
            Vec::new(),
        );
        let ids: Vec<i64> = records.platform.iter().map(|tx| tx.id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(records.player, UserId(81));
        assert!(records.platform_by_id(PlatformTransactionId(3)).is_some());
    }

    #[test]
    fn bank_index_groups_by_account() {
        let bank = vec![bank(9, date(3), 300), bank(4, date(1), 300), bank(5, date(2), 400)];
        let index = BankIndex::new(&bank);
        let ids: Vec<i64> = index
            .for_account(BankAccountId(300))
            .iter()
            .map(|bt| bt.id.0)
            .collect();
        assert_eq!(ids, vec![4, 9]);
        assert!(index.for_account(BankAccountId(999)).is_empty());
        assert_eq!(index.get(BankTransactionId(5)).map(|bt| bt.bank_account_id), Some(BankAccountId(400)));
    }
}
