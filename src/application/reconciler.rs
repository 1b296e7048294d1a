//! Periodic reconciliation of the ledger against the processor.
//!
//! A pass has two phases that fail independently:
//! - import: intents the processor lists but the ledger has never seen are added;
//! - refresh: every ledger row is re-read from the processor and re-mirrored.
//!
//! Passes never overlap. A pass requested while another one is running is
//! skipped rather than queued.

use crate::application::mirror::{mirror, mirror_once, reconcile_one, record_error};
use crate::config::ReconcilerConfig;
use crate::domain::payment::Payment;
use crate::domain::ports::{GatewayRef, LedgerRef};
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    /// Rows created from the remote list.
    pub imported: usize,
    /// Rows successfully re-read and mirrored.
    pub refreshed: usize,
    /// Refreshed rows whose status moved.
    pub changed: usize,
    pub failed: usize,
    /// The pass did not run because another one was in progress.
    pub skipped: bool,
}

pub struct ReconciliationEngine {
    ledger: LedgerRef,
    gateway: GatewayRef,
    config: ReconcilerConfig,
    pass_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(ledger: LedgerRef, gateway: GatewayRef, config: ReconcilerConfig) -> Self {
        Self {
            ledger,
            gateway,
            config,
            pass_lock: Mutex::new(()),
        }
    }

    /// Runs one full pass, or skips it if a pass is already running.
    pub async fn run_once(&self) -> ReconciliationReport {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            debug!("reconciliation already in progress, skipping");
            return ReconciliationReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = ReconciliationReport::default();
        if let Err(e) = self.import_missing(&mut report).await {
            error!(error = %e, "import phase failed");
            report.failed += 1;
        }
        if let Err(e) = self.refresh_known(&mut report).await {
            error!(error = %e, "refresh phase failed");
            report.failed += 1;
        }

        info!(
            imported = report.imported,
            refreshed = report.refreshed,
            changed = report.changed,
            failed = report.failed,
            "reconciliation pass finished"
        );
        report
    }

    /// Repairs a single payment from the processor's current view.
    pub async fn reconcile_one(&self, external_id: &str) -> Result<Payment> {
        reconcile_one(self.ledger.as_ref(), self.gateway.as_ref(), external_id).await
    }

    async fn import_missing(&self, report: &mut ReconciliationReport) -> Result<()> {
        let remote = self.gateway.list(self.config.import_limit, None).await?;
        let known = self.ledger.list_known_external_ids().await?;

        for intent in remote.iter().filter(|i| !known.contains(&i.id)) {
            match mirror(self.ledger.as_ref(), intent).await {
                Ok(_) => {
                    info!(external_id = %intent.id, status = %intent.status, "imported payment");
                    report.imported += 1;
                }
                Err(e) => {
                    error!(external_id = %intent.id, error = %e, "failed to import payment");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    async fn refresh_known(&self, report: &mut ReconciliationReport) -> Result<()> {
        let payments = self.ledger.list_all().await?;

        for payment in payments {
            let intent = match self.gateway.retrieve(&payment.external_id).await {
                Ok(intent) => intent,
                Err(e) => {
                    warn!(external_id = %payment.external_id, error = %e, "failed to refresh payment");
                    report.failed += 1;
                    if let Err(record_err) =
                        record_error(self.ledger.as_ref(), &payment.external_id, &e.to_string())
                            .await
                    {
                        error!(
                            external_id = %payment.external_id,
                            error = %record_err,
                            "failed to record refresh error"
                        );
                    }
                    continue;
                }
            };

            // A conflict means someone wrote a fresher snapshot; the next pass rereads.
            match mirror_once(self.ledger.as_ref(), &intent).await {
                Ok(updated) => {
                    report.refreshed += 1;
                    if updated.status != payment.status {
                        report.changed += 1;
                        if updated.current_status().is_terminal() {
                            info!(external_id = %payment.external_id, status = %updated.current_status(), "payment settled");
                        }
                    }
                }
                Err(PaymentError::LedgerConflict { .. }) => {
                    debug!(external_id = %payment.external_id, "row written concurrently, left for the next pass");
                }
                Err(e) => {
                    error!(external_id = %payment.external_id, error = %e, "failed to mirror payment");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Spawns the periodic task. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> ReconcilerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval = self.config.interval;
        info!(interval_secs = interval.as_secs_f64(), "starting reconciler");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("reconciler stopped");
        });

        ReconcilerHandle { shutdown, task }
    }
}

/// Owns the running reconciler task.
pub struct ReconcilerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Signals the task and waits for it. A pass in flight is allowed to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "reconciler task ended abnormally");
        }
    }
}
