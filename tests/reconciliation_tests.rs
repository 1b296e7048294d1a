mod common;

use async_trait::async_trait;
use common::{remote, setup};
use paysync::application::mirror::mirror;
use paysync::application::payments::PaymentService;
use paysync::application::reconciler::ReconciliationEngine;
use paysync::config::{CaptureMethod, ReconcilerConfig};
use paysync::domain::card::PaymentMethodRef;
use paysync::domain::payment::{Payment, StatusHistoryEntry};
use paysync::domain::ports::PaymentLedger;
use paysync::domain::status::PaymentStatus;
use paysync::infrastructure::in_memory::InMemoryLedger;
use paysync::infrastructure::simulated::{FailureKind, GatewayOp, SimulatedGateway};
use paysync::error::Result;
use std::collections::HashSet;
use std::sync::Arc;

fn engine(ledger: &Arc<InMemoryLedger>, gateway: &Arc<SimulatedGateway>) -> ReconciliationEngine {
    ReconciliationEngine::new(ledger.clone(), gateway.clone(), ReconcilerConfig::default())
}

async fn history_rows(ledger: &InMemoryLedger) -> usize {
    let mut total = 0;
    for payment in ledger.list_all().await.unwrap() {
        total += ledger.history(payment.id).await.unwrap().len();
    }
    total
}

#[tokio::test]
async fn test_remote_only_intent_is_imported_with_one_history_row() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    gateway.insert_remote(remote("pi_dashboard", PaymentStatus::RequiresCapture));

    let report = engine(&ledger, &gateway).run_once().await;
    assert_eq!(report.imported, 1);
    assert_eq!(report.failed, 0);

    let payment = ledger
        .get_by_external_id("pi_dashboard")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, Some(PaymentStatus::RequiresCapture));
    assert_eq!(payment.amount, 2500);

    let history = ledger.history(payment.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PaymentStatus::RequiresCapture);
    assert!(history[0].error_message.is_none());
}

#[tokio::test]
async fn test_import_never_duplicates_rows() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    for i in 0..5 {
        gateway.insert_remote(remote(&format!("pi_{i}"), PaymentStatus::Processing));
    }
    // One of them is already known.
    mirror(ledger.as_ref(), &remote("pi_2", PaymentStatus::Processing))
        .await
        .unwrap();

    let engine = engine(&ledger, &gateway);
    let first = engine.run_once().await;
    let second = engine.run_once().await;

    assert_eq!(first.imported, 4);
    assert_eq!(second.imported, 0);

    let rows = ledger.list_all().await.unwrap();
    assert_eq!(rows.len(), 5);
    let known = ledger.list_known_external_ids().await.unwrap();
    assert_eq!(known.len(), 5);
}

#[tokio::test]
async fn test_second_pass_without_remote_changes_adds_no_history() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    gateway.insert_remote(remote("pi_a", PaymentStatus::RequiresAction));
    gateway.insert_remote(remote("pi_b", PaymentStatus::Succeeded));

    let engine = engine(&ledger, &gateway);
    engine.run_once().await;
    let before = history_rows(&ledger).await;

    let report = engine.run_once().await;

    assert_eq!(report.changed, 0);
    assert_eq!(report.refreshed, 2);
    assert_eq!(history_rows(&ledger).await, before);
}

#[tokio::test]
async fn test_out_of_band_change_is_picked_up() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    let service = PaymentService::new(ledger.clone(), gateway.clone());
    let created = service
        .create(common::amount(900), common::usd())
        .await
        .unwrap();
    let confirmed = service
        .confirm(
            &created.id,
            &PaymentMethodRef::parse("pm_card_authenticationRequired"),
        )
        .await
        .unwrap();
    assert_eq!(confirmed.status, PaymentStatus::RequiresAction);

    // The customer completes the challenge on the processor's page.
    gateway.set_remote_status(&created.id, PaymentStatus::RequiresCapture);
    let report = engine(&ledger, &gateway).run_once().await;
    assert_eq!(report.changed, 1);

    let (payment, history) = service.history(&created.id).await.unwrap();
    assert_eq!(payment.status, Some(PaymentStatus::RequiresCapture));
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].status, PaymentStatus::RequiresCapture);

    // Now capturable through the normal path.
    let captured = service.capture(&created.id).await.unwrap();
    assert_eq!(captured.status, PaymentStatus::Succeeded);
}

#[tokio::test]
async fn test_refresh_failure_is_recorded_and_others_still_refresh() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    gateway.insert_remote(remote("pi_ok", PaymentStatus::Processing));
    gateway.insert_remote(remote("pi_flaky", PaymentStatus::Processing));
    let engine = engine(&ledger, &gateway);
    engine.run_once().await;

    gateway.set_remote_status("pi_ok", PaymentStatus::Succeeded);
    gateway.fail(GatewayOp::Retrieve, Some("pi_flaky"), FailureKind::Unavailable);
    let report = engine.run_once().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.changed, 1);

    let flaky = ledger.get_by_external_id("pi_flaky").await.unwrap().unwrap();
    assert_eq!(flaky.status, Some(PaymentStatus::Processing));
    let history = ledger.history(flaky.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, PaymentStatus::Processing);
    assert!(
        history[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("unavailable"))
    );

    let ok = ledger.get_by_external_id("pi_ok").await.unwrap().unwrap();
    assert_eq!(ok.status, Some(PaymentStatus::Succeeded));
}

#[tokio::test]
async fn test_repeated_refresh_failure_records_one_error_row() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    gateway.insert_remote(remote("pi_down", PaymentStatus::Processing));
    let engine = engine(&ledger, &gateway);
    engine.run_once().await;

    gateway.fail(GatewayOp::Retrieve, Some("pi_down"), FailureKind::Unavailable);
    for _ in 0..3 {
        let report = engine.run_once().await;
        assert_eq!(report.failed, 1);
    }

    let payment = ledger.get_by_external_id("pi_down").await.unwrap().unwrap();
    let history = ledger.history(payment.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].error_message.is_some());
    assert!(history[1].error_message.is_none());
}

/// Ledger where every status write for `busy` loses the race to another writer.
struct ContendedLedger {
    inner: InMemoryLedger,
    busy: String,
}

#[async_trait]
impl PaymentLedger for ContendedLedger {
    async fn upsert_by_external_id(
        &self,
        external_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<Payment> {
        self.inner
            .upsert_by_external_id(external_id, amount, currency)
            .await
    }

    async fn record_status_change(
        &self,
        payment: &Payment,
        new_status: PaymentStatus,
        error_message: Option<String>,
    ) -> Result<Payment> {
        if payment.external_id == self.busy {
            self.inner
                .upsert_by_external_id(&payment.external_id, payment.amount, &payment.currency)
                .await?;
        }
        self.inner
            .record_status_change(payment, new_status, error_message)
            .await
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        self.inner.get_by_external_id(external_id).await
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        self.inner.list_all().await
    }

    async fn list_by_statuses(&self, statuses: &[PaymentStatus]) -> Result<Vec<Payment>> {
        self.inner.list_by_statuses(statuses).await
    }

    async fn list_known_external_ids(&self) -> Result<HashSet<String>> {
        self.inner.list_known_external_ids().await
    }

    async fn history(&self, payment_id: u64) -> Result<Vec<StatusHistoryEntry>> {
        self.inner.history(payment_id).await
    }

    async fn remove(&self, payment_id: u64) -> Result<()> {
        self.inner.remove(payment_id).await
    }
}

#[tokio::test]
async fn test_refresh_leaves_concurrently_written_row_to_next_pass() {
    let inner = InMemoryLedger::new();
    mirror(&inner, &remote("pi_busy", PaymentStatus::Processing))
        .await
        .unwrap();
    let ledger = Arc::new(ContendedLedger {
        inner,
        busy: "pi_busy".to_string(),
    });
    let gateway = Arc::new(SimulatedGateway::new(CaptureMethod::Manual));
    gateway.insert_remote(remote("pi_busy", PaymentStatus::Succeeded));

    let engine =
        ReconciliationEngine::new(ledger.clone(), gateway.clone(), ReconcilerConfig::default());
    let report = engine.run_once().await;

    assert_eq!(report.imported, 0);
    assert_eq!(report.refreshed, 0);
    assert_eq!(report.failed, 0);

    let payment = ledger.get_by_external_id("pi_busy").await.unwrap().unwrap();
    assert_eq!(payment.status, Some(PaymentStatus::Processing));
    assert_eq!(ledger.history(payment.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_row_removed_remotely_keeps_local_state() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    mirror(ledger.as_ref(), &remote("pi_gone", PaymentStatus::Processing))
        .await
        .unwrap();

    let report = engine(&ledger, &gateway).run_once().await;
    assert_eq!(report.failed, 1);

    let payment = ledger.get_by_external_id("pi_gone").await.unwrap().unwrap();
    assert_eq!(payment.status, Some(PaymentStatus::Processing));
}

#[tokio::test]
async fn test_reconcile_one_repairs_a_missing_row() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    gateway.insert_remote(remote("pi_lost", PaymentStatus::Canceled));

    let payment = engine(&ledger, &gateway)
        .reconcile_one("pi_lost")
        .await
        .unwrap();

    assert_eq!(payment.status, Some(PaymentStatus::Canceled));
    assert_eq!(ledger.history(payment.id).await.unwrap().len(), 1);
}
