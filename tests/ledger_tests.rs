mod common;

use common::remote;
use paysync::application::mirror::mirror;
use paysync::domain::ports::{LedgerRef, PaymentLedger};
use paysync::domain::status::PaymentStatus;
use paysync::infrastructure::in_memory::InMemoryLedger;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;

const STATUSES: [PaymentStatus; 6] = [
    PaymentStatus::RequiresPaymentMethod,
    PaymentStatus::RequiresAction,
    PaymentStatus::Processing,
    PaymentStatus::RequiresCapture,
    PaymentStatus::Succeeded,
    PaymentStatus::Canceled,
];

#[tokio::test]
async fn test_ledger_as_trait_object_across_tasks() {
    let ledger: LedgerRef = Arc::new(InMemoryLedger::new());

    let mut handles = Vec::new();
    for i in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            mirror(ledger.as_ref(), &remote(&format!("pi_{i}"), PaymentStatus::Processing)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.list_all().await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_concurrent_writers_on_one_row_keep_history_consistent() {
    let ledger = Arc::new(InMemoryLedger::new());
    mirror(ledger.as_ref(), &remote("pi_hot", PaymentStatus::Processing))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for status in [PaymentStatus::RequiresCapture, PaymentStatus::Succeeded] {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            mirror(ledger.as_ref(), &remote("pi_hot", status)).await
        }));
    }
    for handle in handles {
        // Conflicts are retried inside `mirror`.
        handle.await.unwrap().unwrap();
    }

    let payment = ledger.get_by_external_id("pi_hot").await.unwrap().unwrap();
    let history = ledger.history(payment.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(Some(history[0].status.clone()), payment.status);
}

#[tokio::test]
async fn test_random_observation_sequences_follow_history_rules() {
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let ledger = InMemoryLedger::new();
        let mut expected_rows = 0;
        let mut last: Option<PaymentStatus> = None;

        for _ in 0..rng.gen_range(1..30) {
            let status = STATUSES.choose(&mut rng).cloned().unwrap();
            if last.as_ref() != Some(&status) {
                expected_rows += 1;
            }
            last = Some(status.clone());
            mirror(&ledger, &remote("pi_rand", status)).await.unwrap();
        }

        let payment = ledger.get_by_external_id("pi_rand").await.unwrap().unwrap();
        let history = ledger.history(payment.id).await.unwrap();
        assert_eq!(history.len(), expected_rows);
        assert_eq!(payment.status, last);
        assert_eq!(Some(history[0].status.clone()), payment.status);
        for pair in history.windows(2) {
            assert_ne!(pair[0].status, pair[1].status);
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }
}

#[tokio::test]
async fn test_remove_cascades_to_history() {
    let ledger = InMemoryLedger::new();
    let payment = mirror(&ledger, &remote("pi_1", PaymentStatus::Processing))
        .await
        .unwrap();
    mirror(&ledger, &remote("pi_1", PaymentStatus::Succeeded))
        .await
        .unwrap();

    ledger.remove(payment.id).await.unwrap();

    assert!(ledger.get_by_external_id("pi_1").await.unwrap().is_none());
    assert!(ledger.history(payment.id).await.unwrap().is_empty());
    assert!(!ledger.list_known_external_ids().await.unwrap().contains("pi_1"));
}
