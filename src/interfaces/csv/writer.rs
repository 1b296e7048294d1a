use crate::application::pipeline::PipelineOutcome;
use crate::application::reconciler::ReconciliationReport;
use crate::domain::card::TestCard;
use crate::domain::payment::{Payment, RemoteIntent, StatusHistoryEntry};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct IntentRow<'a> {
    id: &'a str,
    amount: i64,
    currency: &'a str,
    status: &'a str,
    client_secret: &'a str,
}

impl<'a> From<&'a RemoteIntent> for IntentRow<'a> {
    fn from(intent: &'a RemoteIntent) -> Self {
        Self {
            id: &intent.id,
            amount: intent.amount,
            currency: &intent.currency,
            status: intent.status.as_str(),
            client_secret: intent.client_secret.as_deref().unwrap_or(""),
        }
    }
}

#[derive(Serialize)]
struct OutcomeRow<'a> {
    outcome: &'static str,
    id: &'a str,
    amount: i64,
    currency: &'a str,
    status: &'a str,
    client_secret: &'a str,
}

#[derive(Serialize)]
struct PaymentRow<'a> {
    id: u64,
    external_id: &'a str,
    status: &'a str,
    amount: i64,
    currency: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    id: u64,
    payment_id: u64,
    status: &'a str,
    created_at: String,
    error_message: &'a str,
}

/// Writes results as CSV.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_intents<'a>(&mut self, intents: impl IntoIterator<Item = &'a RemoteIntent>) -> Result<()> {
        for intent in intents {
            self.writer.serialize(IntentRow::from(intent))?;
        }
        self.flush()
    }

    pub fn write_outcomes<'a>(
        &mut self,
        outcomes: impl IntoIterator<Item = &'a PipelineOutcome>,
    ) -> Result<()> {
        for outcome in outcomes {
            let label = if outcome.is_interrupted() {
                "interrupted"
            } else {
                "completed"
            };
            let intent = IntentRow::from(outcome.intent());
            self.writer.serialize(OutcomeRow {
                outcome: label,
                id: intent.id,
                amount: intent.amount,
                currency: intent.currency,
                status: intent.status,
                client_secret: intent.client_secret,
            })?;
        }
        self.flush()
    }

    pub fn write_payments<'a>(&mut self, payments: impl IntoIterator<Item = &'a Payment>) -> Result<()> {
        for payment in payments {
            self.writer.serialize(PaymentRow {
                id: payment.id,
                external_id: &payment.external_id,
                status: payment.status.as_ref().map(|s| s.as_str()).unwrap_or(""),
                amount: payment.amount,
                currency: &payment.currency,
                created_at: payment.created_at.to_rfc3339(),
                updated_at: payment.updated_at.to_rfc3339(),
            })?;
        }
        self.flush()
    }

    pub fn write_history<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a StatusHistoryEntry>,
    ) -> Result<()> {
        for entry in entries {
            self.writer.serialize(HistoryRow {
                id: entry.id,
                payment_id: entry.payment_id,
                status: entry.status.as_str(),
                created_at: entry.created_at.to_rfc3339(),
                error_message: entry.error_message.as_deref().unwrap_or(""),
            })?;
        }
        self.flush()
    }

    pub fn write_cards(&mut self, cards: &[TestCard]) -> Result<()> {
        for card in cards {
            self.writer.serialize(card)?;
        }
        self.flush()
    }

    pub fn write_report(&mut self, report: &ReconciliationReport) -> Result<()> {
        self.writer.serialize(report)?;
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
