use ledgerlink_core::{
    BankTransaction, BankTransactionId, PlatformTransactionId, ProcessorPaymentId, ScrapedLineId,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrigin {
    /// The ledger already linked the record before this run.
    Preexisting,
    /// Claimed by a match made in this run.
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub platform: PlatformTransactionId,
    pub origin: ClaimOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("Bank transaction {bank} already claimed by {by}")]
    BankClaimed {
        bank: BankTransactionId,
        by: PlatformTransactionId,
    },
    #[error("Processor payment {payment} already claimed by {by}")]
    PaymentClaimed {
        payment: ProcessorPaymentId,
        by: PlatformTransactionId,
    },
    #[error("Scraped line {line} already claimed by {by}")]
    ScrapedClaimed {
        line: ScrapedLineId,
        by: PlatformTransactionId,
    },
}

/// Read-only view of which bank records are off the table.
pub trait ClaimView {
    fn bank_claim(&self, id: BankTransactionId) -> Option<Claim>;
}

/// Records consumed during one player run. Every bank record, processor
/// payment and scraped line has at most one claiming platform transaction.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionLedger {
    banks: HashMap<BankTransactionId, Claim>,
    payments: HashMap<ProcessorPaymentId, PlatformTransactionId>,
    scraped: HashMap<ScrapedLineId, PlatformTransactionId>,
    matched: HashSet<PlatformTransactionId>,
}

impl ConsumptionLedger {
    /// Starts a run with the links the ledger already holds.
    pub fn seeded<'a>(bank: impl IntoIterator<Item = &'a BankTransaction>) -> Self {
        let mut ledger = ConsumptionLedger::default();
        for bt in bank {
            if let Some(platform) = bt.linked_to {
                ledger.banks.insert(
                    bt.id,
                    Claim {
                        platform,
                        origin: ClaimOrigin::Preexisting,
                    },
                );
            }
        }
        ledger
    }

    /// Claiming again for the same platform transaction is a no-op.
    pub fn claim_bank(
        &mut self,
        bank: BankTransactionId,
        platform: PlatformTransactionId,
    ) -> Result<(), ClaimError> {
        match self.banks.get(&bank) {
            Some(claim) if claim.platform != platform => Err(ClaimError::BankClaimed {
                bank,
                by: claim.platform,
            }),
            Some(_) => Ok(()),
            None => {
                self.banks.insert(
                    bank,
                    Claim {
                        platform,
                        origin: ClaimOrigin::Run,
                    },
                );
                Ok(())
            }
        }
    }

    pub fn payment_claimant(&self, payment: ProcessorPaymentId) -> Option<PlatformTransactionId> {
        self.payments.get(&payment).copied()
    }

    pub fn claim_payment(
        &mut self,
        payment: ProcessorPaymentId,
        platform: PlatformTransactionId,
    ) -> Result<(), ClaimError> {
        match self.payments.get(&payment) {
            Some(by) if *by != platform => Err(ClaimError::PaymentClaimed { payment, by: *by }),
            _ => {
                self.payments.insert(payment, platform);
                Ok(())
            }
        }
    }

    pub fn scraped_claimant(&self, line: ScrapedLineId) -> Option<PlatformTransactionId> {
        self.scraped.get(&line).copied()
    }

    pub fn claim_scraped(
        &mut self,
        line: ScrapedLineId,
        platform: PlatformTransactionId,
    ) -> Result<(), ClaimError> {
        match self.scraped.get(&line) {
            Some(by) if *by != platform => Err(ClaimError::ScrapedClaimed { line, by: *by }),
            _ => {
                self.scraped.insert(line, platform);
                Ok(())
            }
        }
    }

    pub fn mark_matched(&mut self, platform: PlatformTransactionId) {
        self.matched.insert(platform);
    }

    pub fn is_matched(&self, platform: PlatformTransactionId) -> bool {
        self.matched.contains(&platform)
    }

    pub fn run_claims(&self) -> usize {
        self.banks
            .values()
            .filter(|c| c.origin == ClaimOrigin::Run)
            .count()
    }
}

impl ClaimView for ConsumptionLedger {
    fn bank_claim(&self, id: BankTransactionId) -> Option<Claim> {
        self.banks.get(&id).copied()
    }
}

/// Only links that predate the run; claims made during the run are invisible.
pub struct PreexistingOnly<'a>(pub &'a ConsumptionLedger);

impl ClaimView for PreexistingOnly<'_> {
    fn bank_claim(&self, id: BankTransactionId) -> Option<Claim> {
        self.0
            .bank_claim(id)
            .filter(|c| c.origin == ClaimOrigin::Preexisting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerlink_core::{BankAccountId, Money};

    fn bank(id: i64, linked_to: Option<i64>) -> BankTransaction {
        BankTransaction {
            id: BankTransactionId(id),
            external_ref: None,
            amount: Money::from_cents(100),
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            name: String::new(),
            counterparty: None,
            bank_account_id: BankAccountId(1),
            linked_to: linked_to.map(PlatformTransactionId),
        }
    }

    #[test]
    fn seeded_with_preexisting_links() {
        let banks = [bank(1, Some(10)), bank(2, None)];
        let ledger = ConsumptionLedger::seeded(&banks);
        let claim = ledger.bank_claim(BankTransactionId(1)).unwrap();
        assert_eq!(claim.platform, PlatformTransactionId(10));
        assert_eq!(claim.origin, ClaimOrigin::Preexisting);
        assert!(ledger.bank_claim(BankTransactionId(2)).is_none());
        assert_eq!(ledger.run_claims(), 0);
    }

    #[test]
    fn bank_has_at_most_one_claimant() {
        let mut ledger = ConsumptionLedger::default();
        ledger
            .claim_bank(BankTransactionId(1), PlatformTransactionId(10))
            .unwrap();
        ledger
            .claim_bank(BankTransactionId(1), PlatformTransactionId(10))
            .unwrap();
        assert_eq!(
            ledger.claim_bank(BankTransactionId(1), PlatformTransactionId(11)),
            Err(ClaimError::BankClaimed {
                bank: BankTransactionId(1),
                by: PlatformTransactionId(10)
            })
        );
        assert_eq!(ledger.run_claims(), 1);
    }

    #[test]
    fn payment_has_at_most_one_claimant() {
        let mut ledger = ConsumptionLedger::default();
        ledger
            .claim_payment(ProcessorPaymentId(5), PlatformTransactionId(1))
            .unwrap();
        assert!(ledger
            .claim_payment(ProcessorPaymentId(5), PlatformTransactionId(2))
            .is_err());
        assert_eq!(
            ledger.payment_claimant(ProcessorPaymentId(5)),
            Some(PlatformTransactionId(1))
        );
    }

    #[test]
    fn preexisting_view_hides_run_claims() {
        let banks = [bank(1, Some(10))];
        let mut ledger = ConsumptionLedger::seeded(&banks);
        ledger
            .claim_bank(BankTransactionId(2), PlatformTransactionId(11))
            .unwrap();
        let view = PreexistingOnly(&ledger);
        assert!(view.bank_claim(BankTransactionId(1)).is_some());
        assert!(view.bank_claim(BankTransactionId(2)).is_none());
    }
}
