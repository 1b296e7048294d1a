use crate::domain::status::{Operation, PaymentStatus};
use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Diagnostic, Debug)]
pub enum PaymentError {
    /// The guard rejected a state change; no remote call was made.
    #[error("cannot {operation} a payment in status {status}")]
    #[diagnostic(code(paysync::invalid_transition))]
    InvalidTransition {
        operation: Operation,
        status: PaymentStatus,
    },

    #[error("remote object not found: {0}")]
    #[diagnostic(code(paysync::remote::not_found))]
    RemoteNotFound(String),

    #[error("remote rejected the request: {0}")]
    #[diagnostic(code(paysync::remote::invalid_request))]
    RemoteInvalidRequest(String),

    #[error("remote processor unavailable: {0}")]
    #[diagnostic(
        code(paysync::remote::unavailable),
        help("this failure is transient; the next reconciliation pass retries")
    )]
    RemoteUnavailable(String),

    #[error("payment {0} is not in the ledger")]
    #[diagnostic(code(paysync::ledger::not_found))]
    LedgerNotFound(String),

    /// The row changed between read and write.
    #[error("payment {external_id} was modified concurrently")]
    #[diagnostic(code(paysync::ledger::conflict))]
    LedgerConflict { external_id: String },

    #[error("validation error: {0}")]
    #[diagnostic(code(paysync::validation))]
    ValidationError(String),

    #[error("configuration error: {0}")]
    #[diagnostic(code(paysync::config))]
    ConfigError(String),

    #[error("CSV error: {0}")]
    #[diagnostic(code(paysync::csv))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(paysync::io))]
    IoError(#[from] std::io::Error),

    #[error("internal error: {0}")]
    #[diagnostic(code(paysync::internal))]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Errors from the remote side that are worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::RemoteUnavailable(_))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}
