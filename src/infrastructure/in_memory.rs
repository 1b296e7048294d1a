use crate::domain::payment::{Payment, StatusHistoryEntry};
use crate::domain::ports::PaymentLedger;
use crate::domain::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    payments: HashMap<u64, Payment>,
    by_external_id: HashMap<String, u64>,
    history: Vec<StatusHistoryEntry>,
    next_payment_id: u64,
    next_history_id: u64,
}

/// A thread-safe in-memory ledger.
///
/// All tables sit behind one `RwLock`, so every write (row plus history) is
/// atomic with respect to readers. Ideal for tests and sandbox runs.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryLedger {
    async fn upsert_by_external_id(
        &self,
        external_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<Payment> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(id) = state.by_external_id.get(external_id).copied()
            && let Some(payment) = state.payments.get_mut(&id)
        {
            payment.refresh(amount, currency, now);
            return Ok(payment.clone());
        }

        state.next_payment_id += 1;
        let id = state.next_payment_id;
        let payment = Payment::new(id, external_id, amount, currency, now);
        state.by_external_id.insert(external_id.to_string(), id);
        state.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn record_status_change(
        &self,
        payment: &Payment,
        new_status: PaymentStatus,
        error_message: Option<String>,
    ) -> Result<Payment> {
        let mut state = self.state.write().await;
        let state = &mut *state;

        let stored = state
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| PaymentError::LedgerNotFound(payment.external_id.clone()))?;
        if stored.version != payment.version {
            return Err(PaymentError::LedgerConflict {
                external_id: payment.external_id.clone(),
            });
        }

        if let Some(entry) = stored.apply_status(new_status, error_message, Utc::now()) {
            state.next_history_id += 1;
            state
                .history
                .push(entry.into_entry(state.next_history_id, stored.id));
        }
        Ok(stored.clone())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .by_external_id
            .get(external_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        let mut payments: Vec<Payment> = state.payments.values().cloned().collect();
        payments.sort_by_key(|p| p.id);
        Ok(payments)
    }

    async fn list_by_statuses(&self, statuses: &[PaymentStatus]) -> Result<Vec<Payment>> {
        let mut payments = self.list_all().await?;
        payments.retain(|p| p.status.as_ref().is_some_and(|s| statuses.contains(s)));
        Ok(payments)
    }

    async fn list_known_external_ids(&self) -> Result<HashSet<String>> {
        let state = self.state.read().await;
        Ok(state.by_external_id.keys().cloned().collect())
    }

    async fn history(&self, payment_id: u64) -> Result<Vec<StatusHistoryEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<StatusHistoryEntry> = state
            .history
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn remove(&self, payment_id: u64) -> Result<()> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .remove(&payment_id)
            .ok_or_else(|| PaymentError::LedgerNotFound(payment_id.to_string()))?;
        state.by_external_id.remove(&payment.external_id);
        state.history.retain(|e| e.payment_id != payment_id);
        Ok(())
    }
}
