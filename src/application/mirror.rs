//! Copies processor snapshots into the ledger.
//!
//! Every writer (operations, pipeline, reconciler) goes through here so the
//! compare-and-set retry policy lives in one place.

use crate::domain::payment::{Payment, RemoteIntent};
use crate::domain::ports::{PaymentGateway, PaymentLedger};
use crate::error::{PaymentError, Result};
use tracing::{debug, info, warn};

/// Attempts at a conditioned write before giving up on a busy row.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Mirrors `intent` into the ledger: upserts the row, then records its status.
///
/// On `LedgerConflict` the row is re-read and the same snapshot is written
/// again, up to [`MAX_WRITE_ATTEMPTS`] times. The replay does not compare
/// snapshots, so an older `intent` can overwrite a newer status written in
/// between; the next reconciliation pass converges the row. Periodic callers
/// that can wait for that pass use [`mirror_once`] instead.
pub async fn mirror(ledger: &dyn PaymentLedger, intent: &RemoteIntent) -> Result<Payment> {
    write_snapshot(ledger, intent, MAX_WRITE_ATTEMPTS).await
}

/// Like [`mirror`] but a single attempt: a concurrent writer wins and the
/// conflict is returned to the caller.
pub async fn mirror_once(ledger: &dyn PaymentLedger, intent: &RemoteIntent) -> Result<Payment> {
    write_snapshot(ledger, intent, 1).await
}

async fn write_snapshot(
    ledger: &dyn PaymentLedger,
    intent: &RemoteIntent,
    max_attempts: usize,
) -> Result<Payment> {
    let mut attempt = 1;
    loop {
        let payment = ledger
            .upsert_by_external_id(&intent.id, intent.amount, &intent.currency)
            .await?;
        let previous = payment.status.clone();

        match ledger
            .record_status_change(&payment, intent.status.clone(), None)
            .await
        {
            Ok(updated) => {
                if previous.as_ref() != updated.status.as_ref() {
                    info!(
                        external_id = %intent.id,
                        from = previous.as_ref().map(|s| s.as_str()).unwrap_or("none"),
                        to = %intent.status,
                        "payment status changed"
                    );
                }
                return Ok(updated);
            }
            Err(PaymentError::LedgerConflict { .. }) if attempt < max_attempts => {
                debug!(external_id = %intent.id, attempt, "ledger row changed under us, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Appends an error row to the payment's history without changing its status.
///
/// Nothing is written when the newest history row already carries the same
/// status and message, so a failure repeating on every pass is stored once.
pub async fn record_error(
    ledger: &dyn PaymentLedger,
    external_id: &str,
    message: &str,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        let payment = ledger
            .get_by_external_id(external_id)
            .await?
            .ok_or_else(|| PaymentError::LedgerNotFound(external_id.to_string()))?;
        let Some(status) = payment.status.clone() else {
            warn!(%external_id, error = message, "no status recorded yet, error only logged");
            return Ok(());
        };

        let history = ledger.history(payment.id).await?;
        if history.first().is_some_and(|newest| {
            newest.status == status && newest.error_message.as_deref() == Some(message)
        }) {
            debug!(%external_id, error = message, "error already recorded");
            return Ok(());
        }

        match ledger
            .record_status_change(&payment, status, Some(message.to_string()))
            .await
        {
            Ok(_) => return Ok(()),
            Err(PaymentError::LedgerConflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Retrieves one intent from the processor and mirrors it.
pub async fn reconcile_one(
    ledger: &dyn PaymentLedger,
    gateway: &dyn PaymentGateway,
    external_id: &str,
) -> Result<Payment> {
    let intent = gateway.retrieve(external_id).await?;
    mirror(ledger, &intent).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::PaymentStatus;
    use crate::infrastructure::in_memory::InMemoryLedger;

    fn intent(id: &str, status: PaymentStatus) -> RemoteIntent {
        RemoteIntent {
            id: id.to_string(),
            amount: 100,
            currency: "usd".to_string(),
            status,
            client_secret: None,
        }
    }

    #[tokio::test]
    async fn test_mirror_creates_row_and_first_history_entry() {
        let ledger = InMemoryLedger::new();

        let payment = mirror(&ledger, &intent("pi_1", PaymentStatus::Processing))
            .await
            .unwrap();

        assert_eq!(payment.status, Some(PaymentStatus::Processing));
        assert_eq!(ledger.history(payment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_error_keeps_status() {
        let ledger = InMemoryLedger::new();
        let payment = mirror(&ledger, &intent("pi_1", PaymentStatus::Processing))
            .await
            .unwrap();

        record_error(&ledger, "pi_1", "remote processor unavailable")
            .await
            .unwrap();

        let history = ledger.history(payment.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, PaymentStatus::Processing);
        assert_eq!(
            history[0].error_message.as_deref(),
            Some("remote processor unavailable")
        );
    }

    #[tokio::test]
    async fn test_repeated_error_is_recorded_once() {
        let ledger = InMemoryLedger::new();
        let payment = mirror(&ledger, &intent("pi_1", PaymentStatus::Processing))
            .await
            .unwrap();

        for _ in 0..3 {
            record_error(&ledger, "pi_1", "remote object not found")
                .await
                .unwrap();
        }
        assert_eq!(ledger.history(payment.id).await.unwrap().len(), 2);

        // A different message is news.
        record_error(&ledger, "pi_1", "remote processor unavailable")
            .await
            .unwrap();
        assert_eq!(ledger.history(payment.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_record_error_for_unknown_payment() {
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            record_error(&ledger, "pi_nope", "boom").await,
            Err(PaymentError::LedgerNotFound(_))
        ));
    }
}
