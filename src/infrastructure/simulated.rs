//! An in-process stand-in for the card processor.
//!
//! Follows the processor's state machine closely enough to drive the whole
//! core offline: confirm outcomes are chosen by the payment method reference
//! the same way the processor's sandbox test methods behave.

use crate::config::CaptureMethod;
use crate::domain::payment::{Amount, Currency, RemoteIntent};
use crate::domain::ports::PaymentGateway;
use crate::domain::status::{Operation, PaymentStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    Create,
    Confirm,
    Capture,
    Cancel,
    Update,
    Retrieve,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    InvalidRequest,
    Unavailable,
}

impl FailureKind {
    fn into_error(self, context: &str) -> PaymentError {
        match self {
            FailureKind::NotFound => PaymentError::RemoteNotFound(context.to_string()),
            FailureKind::InvalidRequest => PaymentError::RemoteInvalidRequest(context.to_string()),
            FailureKind::Unavailable => PaymentError::RemoteUnavailable(context.to_string()),
        }
    }
}

#[derive(Default)]
struct Processor {
    intents: HashMap<String, RemoteIntent>,
    /// Creation order, oldest first.
    order: Vec<String>,
    seq: u64,
    calls: HashMap<GatewayOp, usize>,
    /// Injected failures keyed by operation and, optionally, intent id.
    failures: HashMap<(GatewayOp, Option<String>), FailureKind>,
}

impl Processor {
    fn enter(&mut self, op: GatewayOp, id: Option<&str>) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;

        let targeted = id.and_then(|id| self.failures.get(&(op, Some(id.to_string()))));
        match targeted.or_else(|| self.failures.get(&(op, None))) {
            Some(kind) => Err(kind.into_error(&format!("injected {op:?} failure"))),
            None => Ok(()),
        }
    }

    fn intent_mut(&mut self, id: &str) -> Result<&mut RemoteIntent> {
        self.intents
            .get_mut(id)
            .ok_or_else(|| PaymentError::RemoteNotFound(format!("No such payment_intent: '{id}'")))
    }

    fn transition(
        &mut self,
        id: &str,
        operation: Operation,
        next: PaymentStatus,
    ) -> Result<RemoteIntent> {
        let intent = self.intent_mut(id)?;
        if !intent.status.permits(operation) {
            return Err(PaymentError::RemoteInvalidRequest(format!(
                "You cannot {operation} this PaymentIntent because it has a status of {}",
                intent.status
            )));
        }
        intent.status = next;
        Ok(intent.clone())
    }
}

pub struct SimulatedGateway {
    capture_method: CaptureMethod,
    processor: Mutex<Processor>,
}

impl SimulatedGateway {
    pub fn new(capture_method: CaptureMethod) -> Self {
        Self {
            capture_method,
            processor: Mutex::new(Processor::default()),
        }
    }

    fn processor(&self) -> std::sync::MutexGuard<'_, Processor> {
        // A panic while holding the lock cannot leave an intent half-written.
        self.processor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Places an intent on the remote side without going through `create`,
    /// as if another system had created it.
    pub fn insert_remote(&self, intent: RemoteIntent) {
        let mut processor = self.processor();
        processor.order.push(intent.id.clone());
        processor.intents.insert(intent.id.clone(), intent);
    }

    /// Changes an intent out of band, e.g. a customer finishing a challenge.
    pub fn set_remote_status(&self, id: &str, status: PaymentStatus) {
        if let Some(intent) = self.processor().intents.get_mut(id) {
            intent.status = status;
        }
    }

    pub fn remote(&self, id: &str) -> Option<RemoteIntent> {
        self.processor().intents.get(id).cloned()
    }

    /// Makes every call of `op` fail, or only calls on `id` when given.
    pub fn fail(&self, op: GatewayOp, id: Option<&str>, kind: FailureKind) {
        self.processor()
            .failures
            .insert((op, id.map(str::to_string)), kind);
    }

    pub fn clear_failures(&self) {
        self.processor().failures.clear();
    }

    pub fn calls(&self, op: GatewayOp) -> usize {
        self.processor().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_mutations(&self) -> usize {
        [
            GatewayOp::Create,
            GatewayOp::Confirm,
            GatewayOp::Capture,
            GatewayOp::Cancel,
            GatewayOp::Update,
        ]
        .into_iter()
        .map(|op| self.calls(op))
        .sum()
    }

    fn confirm_outcome(&self, payment_method: &str) -> Result<PaymentStatus> {
        let method = payment_method.to_ascii_lowercase();
        if method.contains("threedsecure") || method.contains("authenticationrequired") {
            Ok(PaymentStatus::RequiresAction)
        } else if method.contains("declined") {
            Err(PaymentError::RemoteInvalidRequest(
                "Your card was declined.".to_string(),
            ))
        } else {
            Ok(match self.capture_method {
                CaptureMethod::Manual => PaymentStatus::RequiresCapture,
                CaptureMethod::Automatic => PaymentStatus::Succeeded,
            })
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(CaptureMethod::Manual)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create(&self, amount: Amount, currency: &Currency) -> Result<RemoteIntent> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::Create, None)?;

        processor.seq += 1;
        let id = format!("pi_sim_{:06}", processor.seq);
        let intent = RemoteIntent {
            id: id.clone(),
            amount: amount.value(),
            currency: currency.to_string(),
            status: PaymentStatus::RequiresPaymentMethod,
            client_secret: Some(format!("{id}_secret_sim")),
        };
        processor.order.push(id.clone());
        processor.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn confirm(&self, id: &str, payment_method: &str) -> Result<RemoteIntent> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::Confirm, Some(id))?;

        // A decline leaves the intent waiting for another payment method.
        let current = processor.intent_mut(id)?.status.clone();
        let next = match self.confirm_outcome(payment_method) {
            Ok(next) => next,
            Err(declined) if current.is_confirmable() => return Err(declined),
            Err(_) => current,
        };
        processor.transition(id, Operation::Confirm, next)
    }

    async fn capture(&self, id: &str) -> Result<RemoteIntent> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::Capture, Some(id))?;
        processor.transition(id, Operation::Capture, PaymentStatus::Succeeded)
    }

    async fn cancel(&self, id: &str) -> Result<RemoteIntent> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::Cancel, Some(id))?;
        processor.transition(id, Operation::Cancel, PaymentStatus::Canceled)
    }

    async fn update_amount(&self, id: &str, amount: Amount) -> Result<RemoteIntent> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::Update, Some(id))?;

        let intent = processor.intent_mut(id)?;
        if !intent.status.is_updatable() {
            return Err(PaymentError::RemoteInvalidRequest(format!(
                "You cannot update this PaymentIntent because it has a status of {}",
                intent.status
            )));
        }
        intent.amount = amount.value();
        Ok(intent.clone())
    }

    async fn retrieve(&self, id: &str) -> Result<RemoteIntent> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::Retrieve, Some(id))?;
        processor.intent_mut(id).map(|intent| intent.clone())
    }

    async fn list(&self, limit: u32, starting_after: Option<&str>) -> Result<Vec<RemoteIntent>> {
        let mut processor = self.processor();
        processor.enter(GatewayOp::List, None)?;

        let newest_first = processor.order.iter().rev();
        let page: Vec<RemoteIntent> = match starting_after {
            Some(cursor) => newest_first
                .skip_while(|id| id.as_str() != cursor)
                .skip(1)
                .take(limit as usize)
                .filter_map(|id| processor.intents.get(id).cloned())
                .collect(),
            None => newest_first
                .take(limit as usize)
                .filter_map(|id| processor.intents.get(id).cloned())
                .collect(),
        };
        Ok(page)
    }
}
