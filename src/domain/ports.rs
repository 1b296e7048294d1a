use super::payment::{Amount, Currency, Payment, RemoteIntent, StatusHistoryEntry};
use super::status::PaymentStatus;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Local record of known payments and their append-only status history.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Finds the row for `external_id`, creating it if absent, and refreshes
    /// amount, currency and `updated_at`. A newly created row has no status
    /// until the first `record_status_change`. Never writes history.
    async fn upsert_by_external_id(
        &self,
        external_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<Payment>;

    /// Mirrors `new_status` onto the row read as `payment`, appending a history
    /// row when the status changes or an error is recorded.
    ///
    /// The write is conditioned on the stored row still being at
    /// `payment.version`; otherwise it fails with `LedgerConflict`.
    async fn record_status_change(
        &self,
        payment: &Payment,
        new_status: PaymentStatus,
        error_message: Option<String>,
    ) -> Result<Payment>;

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Payment>>;

    async fn list_all(&self) -> Result<Vec<Payment>>;

    async fn list_by_statuses(&self, statuses: &[PaymentStatus]) -> Result<Vec<Payment>>;

    async fn list_known_external_ids(&self) -> Result<HashSet<String>>;

    /// History of one payment, newest first.
    async fn history(&self, payment_id: u64) -> Result<Vec<StatusHistoryEntry>>;

    /// Deletes a payment together with its history.
    async fn remove(&self, payment_id: u64) -> Result<()>;
}

/// The remote card-payment processor.
///
/// Implementations translate processor failures into `RemoteNotFound`,
/// `RemoteInvalidRequest` or `RemoteUnavailable` and never retry.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create(&self, amount: Amount, currency: &Currency) -> Result<RemoteIntent>;
    async fn confirm(&self, id: &str, payment_method: &str) -> Result<RemoteIntent>;
    async fn capture(&self, id: &str) -> Result<RemoteIntent>;
    async fn cancel(&self, id: &str) -> Result<RemoteIntent>;
    async fn update_amount(&self, id: &str, amount: Amount) -> Result<RemoteIntent>;
    async fn retrieve(&self, id: &str) -> Result<RemoteIntent>;
    /// Most recent intents first; `starting_after` is the pagination cursor.
    async fn list(&self, limit: u32, starting_after: Option<&str>) -> Result<Vec<RemoteIntent>>;
}

pub type LedgerRef = Arc<dyn PaymentLedger>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
