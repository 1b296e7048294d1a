use crate::application::mirror::{mirror, reconcile_one};
use crate::domain::card::PaymentMethodRef;
use crate::domain::payment::{Amount, Currency, Payment, RemoteIntent, StatusHistoryEntry};
use crate::domain::ports::{GatewayRef, LedgerRef};
use crate::domain::status::{Operation, PaymentStatus, ensure};
use crate::error::{PaymentError, Result};
use tracing::{info, warn};

/// Single-step payment operations.
///
/// Each mutation is checked against the ledger's last known status before
/// the processor is called, and every processor response is mirrored back.
#[derive(Clone)]
pub struct PaymentService {
    ledger: LedgerRef,
    gateway: GatewayRef,
}

impl PaymentService {
    pub fn new(ledger: LedgerRef, gateway: GatewayRef) -> Self {
        Self { ledger, gateway }
    }

    pub async fn create(&self, amount: Amount, currency: Currency) -> Result<RemoteIntent> {
        let intent = self.gateway.create(amount, &currency).await?;
        mirror(self.ledger.as_ref(), &intent).await?;
        info!(external_id = %intent.id, amount = intent.amount, currency = %intent.currency, "payment created");
        Ok(intent)
    }

    pub async fn confirm(&self, id: &str, method: &PaymentMethodRef) -> Result<RemoteIntent> {
        let reference = method.resolve()?;
        self.mutate(id, Operation::Confirm, || self.gateway.confirm(id, &reference))
            .await
    }

    pub async fn capture(&self, id: &str) -> Result<RemoteIntent> {
        self.mutate(id, Operation::Capture, || self.gateway.capture(id))
            .await
    }

    pub async fn cancel(&self, id: &str) -> Result<RemoteIntent> {
        self.mutate(id, Operation::Cancel, || self.gateway.cancel(id))
            .await
    }

    pub async fn update_amount(&self, id: &str, amount: Amount) -> Result<RemoteIntent> {
        self.mutate(id, Operation::Update, || self.gateway.update_amount(id, amount))
            .await
    }

    /// Reads the processor's current view and mirrors it.
    pub async fn retrieve(&self, id: &str) -> Result<RemoteIntent> {
        let intent = self.gateway.retrieve(id).await?;
        mirror(self.ledger.as_ref(), &intent).await?;
        Ok(intent)
    }

    /// Pages through the processor's intents. Read-only.
    pub async fn list_remote(
        &self,
        limit: u32,
        starting_after: Option<&str>,
    ) -> Result<Vec<RemoteIntent>> {
        if limit == 0 || limit > 100 {
            return Err(PaymentError::ValidationError(format!(
                "limit must be between 1 and 100, got {limit}"
            )));
        }
        self.gateway.list(limit, starting_after).await
    }

    /// Ledger rows, optionally restricted to `statuses`.
    pub async fn list_local(&self, statuses: &[PaymentStatus]) -> Result<Vec<Payment>> {
        if statuses.is_empty() {
            self.ledger.list_all().await
        } else {
            self.ledger.list_by_statuses(statuses).await
        }
    }

    pub async fn history(&self, id: &str) -> Result<(Payment, Vec<StatusHistoryEntry>)> {
        let payment = self
            .ledger
            .get_by_external_id(id)
            .await?
            .ok_or_else(|| PaymentError::LedgerNotFound(id.to_string()))?;
        let history = self.ledger.history(payment.id).await?;
        Ok((payment, history))
    }

    /// The ledger row for `id`, reconciled from the processor when the ledger
    /// has drifted (row missing or never observed).
    async fn known(&self, id: &str) -> Result<Payment> {
        match self.ledger.get_by_external_id(id).await? {
            Some(payment) if payment.status.is_some() => Ok(payment),
            _ => {
                warn!(external_id = %id, "payment missing from ledger, reconciling");
                reconcile_one(self.ledger.as_ref(), self.gateway.as_ref(), id).await
            }
        }
    }

    async fn mutate<F, Fut>(&self, id: &str, operation: Operation, call: F) -> Result<RemoteIntent>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RemoteIntent>>,
    {
        let payment = self.known(id).await?;
        ensure(operation, &payment.current_status())?;

        let intent = call().await?;
        mirror(self.ledger.as_ref(), &intent).await?;
        info!(external_id = %id, %operation, status = %intent.status, "payment updated");
        Ok(intent)
    }
}
