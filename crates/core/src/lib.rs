pub mod account;
pub mod external;
pub mod money;
pub mod period;
pub mod transaction;

pub use account::{AccountId, AccountRef, AccountType, BankAccountId, Side, UserId};
pub use external::{
    BankTransaction, BankTransactionId, ExternalRef, PaymentDirection, ProcessorPayment,
    ProcessorPaymentId, ScrapedLine, ScrapedLineId,
};
pub use money::{is_amount_match, Money};
pub use period::{day_offset, DateRange, DateWindow};
pub use transaction::{
    BankLink, PlatformTransaction, PlatformTransactionId, RecordError, TransactionKind,
};
