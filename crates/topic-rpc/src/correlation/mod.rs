//! Matching replies on a shared broadcast topic back to the calls that caused them.
//!
//! Every client's requests and every server's replies travel over topics that
//! all participants see. A client therefore observes replies meant for other
//! clients and repeats of replies it already consumed. The ledger matches on
//! `(client guid, sequence number)` equality and silently drops the rest.

mod key;
mod ledger;

pub use key::{ClientGuid, CorrelationKey, SequenceGenerator, SequenceNumber};
pub use ledger::{CorrelationLedger, Delivery, LedgerError, Outcome, RequestHandle};
