use thiserror::Error;
use transport_bus::BusError;

use crate::correlation::LedgerError;
use crate::names::{AllocationError, NamingError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid graph name: {0}")]
    Naming(#[from] NamingError),
    #[error("could not derive wire topics for {name}: {source}")]
    Derivation {
        name: String,
        #[source]
        source: AllocationError,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("envelope codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
