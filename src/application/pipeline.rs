use crate::application::mirror::mirror;
use crate::domain::card::PaymentMethodRef;
use crate::domain::payment::{Amount, Currency, RemoteIntent};
use crate::domain::ports::{GatewayRef, LedgerRef};
use crate::domain::status::{Operation, PaymentStatus, ensure};
use crate::error::Result;
use serde::Deserialize;
use tracing::{error, info, warn};

/// Input to one create → confirm → capture run.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub currency: Currency,
    pub payment_method: PaymentMethodRef,
    pub auto_capture: bool,
}

/// Raw, unvalidated request as read from user input.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequestRecord {
    pub amount: i64,
    pub currency: String,
    pub payment_method: String,
    #[serde(default)]
    pub auto_capture: Option<bool>,
}

impl TryFrom<PaymentRequestRecord> for PaymentRequest {
    type Error = crate::error::PaymentError;

    fn try_from(record: PaymentRequestRecord) -> Result<Self> {
        Ok(Self {
            amount: Amount::new(record.amount)?,
            currency: Currency::new(&record.currency)?,
            payment_method: PaymentMethodRef::parse(&record.payment_method),
            auto_capture: record.auto_capture.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Nothing more to do on our side.
    Completed(RemoteIntent),
    /// The customer has to act out of band (e.g. a 3-D Secure challenge)
    /// before anything else may happen to this payment.
    Interrupted(RemoteIntent),
}

impl PipelineOutcome {
    pub fn intent(&self) -> &RemoteIntent {
        match self {
            PipelineOutcome::Completed(intent) | PipelineOutcome::Interrupted(intent) => intent,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, PipelineOutcome::Interrupted(_))
    }
}

/// Drives a payment from creation to (optionally) capture in one call.
///
/// Any processor failure aborts the run and is returned unchanged. Nothing is
/// rolled back: an intent left half-way is picked up by reconciliation.
#[derive(Clone)]
pub struct OrchestrationPipeline {
    ledger: LedgerRef,
    gateway: GatewayRef,
}

impl OrchestrationPipeline {
    pub fn new(ledger: LedgerRef, gateway: GatewayRef) -> Self {
        Self { ledger, gateway }
    }

    pub async fn process_payment(&self, request: PaymentRequest) -> Result<PipelineOutcome> {
        let result = self.run(&request).await;
        if let Err(e) = &result {
            error!(amount = request.amount.value(), currency = %request.currency, error = %e, "payment pipeline failed");
        }
        result
    }

    async fn run(&self, request: &PaymentRequest) -> Result<PipelineOutcome> {
        let payment_method = request.payment_method.resolve()?;
        info!(amount = request.amount.value(), currency = %request.currency, "starting payment pipeline");

        let created = self.gateway.create(request.amount, &request.currency).await?;
        let payment = mirror(self.ledger.as_ref(), &created).await?;
        info!(external_id = %created.id, "payment intent created");

        ensure(Operation::Confirm, &payment.current_status())?;
        let confirmed = self.gateway.confirm(&created.id, &payment_method).await?;
        let payment = mirror(self.ledger.as_ref(), &confirmed).await?;
        info!(external_id = %confirmed.id, status = %confirmed.status, "payment confirmed");

        let status = payment.current_status();
        if status == PaymentStatus::RequiresAction {
            warn!(external_id = %confirmed.id, "customer action required, pipeline interrupted");
            return Ok(PipelineOutcome::Interrupted(confirmed));
        }

        if request.auto_capture && status.is_capturable() {
            let captured = self.gateway.capture(&confirmed.id).await?;
            mirror(self.ledger.as_ref(), &captured).await?;
            info!(external_id = %captured.id, status = %captured.status, "payment captured");
            return Ok(PipelineOutcome::Completed(captured));
        }

        Ok(PipelineOutcome::Completed(confirmed))
    }
}
