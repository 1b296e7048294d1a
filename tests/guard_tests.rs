mod common;

use common::{amount, remote, setup, usd};
use paysync::application::mirror::mirror;
use paysync::application::payments::PaymentService;
use paysync::config::CaptureMethod;
use paysync::domain::card::PaymentMethodRef;
use paysync::domain::ports::PaymentLedger;
use paysync::domain::status::{Operation, PaymentStatus};
use paysync::error::PaymentError;
use paysync::infrastructure::simulated::GatewayOp;

/// Every status outside the confirmable set, including one the processor
/// might add later.
fn not_confirmable() -> Vec<PaymentStatus> {
    let known = PaymentStatus::KNOWN;
    known
        .into_iter()
        .filter(|s| !s.is_confirmable())
        .chain([PaymentStatus::from("under_review")])
        .collect()
}

#[tokio::test]
async fn test_confirm_rejected_locally_for_every_non_confirmable_status() {
    let statuses = not_confirmable();
    assert_eq!(statuses.len(), 7);
    assert!(statuses.contains(&PaymentStatus::RequiresAction));
    assert!(statuses.contains(&PaymentStatus::Failed));

    for status in statuses {
        let (ledger, gateway) = setup(CaptureMethod::Manual);
        let service = PaymentService::new(ledger.clone(), gateway.clone());
        let intent = remote("pi_guarded", status.clone());
        gateway.insert_remote(intent.clone());
        mirror(ledger.as_ref(), &intent).await.unwrap();

        let result = service
            .confirm("pi_guarded", &PaymentMethodRef::parse("pm_card_visa"))
            .await;

        match result {
            Err(PaymentError::InvalidTransition { operation, status: seen }) => {
                assert_eq!(operation, Operation::Confirm);
                assert_eq!(seen, status);
            }
            other => panic!("expected InvalidTransition for {status}, got {other:?}"),
        }
        assert_eq!(gateway.calls(GatewayOp::Confirm), 0, "{status}");
    }
}

#[tokio::test]
async fn test_cancel_succeeded_fails_but_requires_action_cancels() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    let service = PaymentService::new(ledger.clone(), gateway.clone());

    let done = remote("pi_done", PaymentStatus::Succeeded);
    let waiting = remote("pi_waiting", PaymentStatus::RequiresAction);
    for intent in [&done, &waiting] {
        gateway.insert_remote(intent.clone());
        mirror(ledger.as_ref(), intent).await.unwrap();
    }

    let err = service.cancel("pi_done").await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidTransition { .. }));
    assert_eq!(
        err.to_string(),
        "cannot cancel a payment in status succeeded"
    );

    let canceled = service.cancel("pi_waiting").await.unwrap();
    assert_eq!(canceled.status, PaymentStatus::Canceled);
    assert_eq!(gateway.calls(GatewayOp::Cancel), 1);

    let payment = ledger.get_by_external_id("pi_waiting").await.unwrap().unwrap();
    assert_eq!(payment.status, Some(PaymentStatus::Canceled));
}

#[tokio::test]
async fn test_unknown_status_blocks_every_mutation() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    let service = PaymentService::new(ledger.clone(), gateway.clone());
    let intent = remote("pi_odd", PaymentStatus::from("under_review"));
    gateway.insert_remote(intent.clone());
    mirror(ledger.as_ref(), &intent).await.unwrap();

    assert!(service.capture("pi_odd").await.is_err());
    assert!(service.cancel("pi_odd").await.is_err());
    assert!(service.update_amount("pi_odd", amount(10)).await.is_err());
    assert!(
        service
            .confirm("pi_odd", &PaymentMethodRef::parse("pm_card_visa"))
            .await
            .is_err()
    );
    assert_eq!(gateway.total_mutations(), 0);
}

#[tokio::test]
async fn test_guard_uses_local_status_even_when_remote_moved_on() {
    let (ledger, gateway) = setup(CaptureMethod::Manual);
    let service = PaymentService::new(ledger.clone(), gateway.clone());

    let created = service.create(amount(500), usd()).await.unwrap();
    // Canceled on the processor side, but the ledger has not seen it yet.
    gateway.set_remote_status(&created.id, PaymentStatus::Canceled);

    let result = service
        .confirm(&created.id, &PaymentMethodRef::parse("pm_card_visa"))
        .await;

    // The local guard passes, so the processor gets to refuse.
    assert!(matches!(result, Err(PaymentError::RemoteInvalidRequest(_))));
    assert_eq!(gateway.calls(GatewayOp::Confirm), 1);
}
