use chrono::{DateTime, NaiveTime, Utc};
use ledgerlink_core::{
    BankTransaction, Money, PaymentDirection, PlatformTransaction, ProcessorPayment, UserId,
};

use crate::config::CompiledProcessor;

/// Why a processor payment cannot corroborate a given bank record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentCheck {
    Valid,
    WrongDirection,
    WrongRecipient,
    DescriptionMismatch,
    AmountMismatch,
    OutsideWindow,
}

#[derive(Debug, Clone)]
pub struct PaymentPick<'r> {
    pub payment: &'r ProcessorPayment,
    /// The payment falls on the platform transaction's calendar day.
    pub same_day: bool,
    /// Seconds between the payment and midnight UTC of the bank date.
    pub delta_secs: i64,
}

fn bank_instant(bt: &BankTransaction) -> DateTime<Utc> {
    bt.date.and_time(NaiveTime::MIN).and_utc()
}

pub fn check(
    payment: &ProcessorPayment,
    bt: &BankTransaction,
    player: UserId,
    rule: &CompiledProcessor,
    tolerance: Money,
) -> PaymentCheck {
    if payment.direction != PaymentDirection::Outgoing {
        return PaymentCheck::WrongDirection;
    }
    if payment.recipient != Some(player) {
        return PaymentCheck::WrongRecipient;
    }
    if let Some(keywords) = &rule.keywords {
        if !keywords.is_match(&payment.description) {
            return PaymentCheck::DescriptionMismatch;
        }
    }
    if !payment.amount.abs().approx_eq(bt.amount.abs(), tolerance) {
        return PaymentCheck::AmountMismatch;
    }
    let delta = (payment.timestamp - bank_instant(bt)).num_seconds().abs();
    if delta > i64::from(rule.window.days) * 86_400 {
        return PaymentCheck::OutsideWindow;
    }
    PaymentCheck::Valid
}

/// The processor payment that best corroborates `bt` for `tx`, ignoring claims:
/// same calendar day as the platform transaction first, then nearest in time,
/// then lowest id.
pub fn best_payment<'r>(
    tx: &PlatformTransaction,
    bt: &BankTransaction,
    payments: &'r [ProcessorPayment],
    player: UserId,
    rule: &CompiledProcessor,
    tolerance: Money,
) -> Option<PaymentPick<'r>> {
    let anchor = bank_instant(bt);
    payments
        .iter()
        .filter(|p| check(p, bt, player, rule, tolerance) == PaymentCheck::Valid)
        .map(|p| PaymentPick {
            payment: p,
            same_day: p.date() == tx.date,
            delta_secs: (p.timestamp - anchor).num_seconds().abs(),
        })
        .min_by_key(|pick| (!pick.same_day, pick.delta_secs, pick.payment.id))
}
