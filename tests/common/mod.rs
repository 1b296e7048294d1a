#![allow(dead_code)]

use paysync::config::CaptureMethod;
use paysync::domain::payment::{Amount, Currency, RemoteIntent};
use paysync::domain::status::PaymentStatus;
use paysync::infrastructure::in_memory::InMemoryLedger;
use paysync::infrastructure::simulated::SimulatedGateway;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub fn setup(capture_method: CaptureMethod) -> (Arc<InMemoryLedger>, Arc<SimulatedGateway>) {
    (
        Arc::new(InMemoryLedger::new()),
        Arc::new(SimulatedGateway::new(capture_method)),
    )
}

pub fn remote(id: &str, status: PaymentStatus) -> RemoteIntent {
    RemoteIntent {
        id: id.to_string(),
        amount: 2500,
        currency: "usd".to_string(),
        status,
        client_secret: None,
    }
}

pub fn amount(value: i64) -> Amount {
    Amount::new(value).unwrap()
}

pub fn usd() -> Currency {
    Currency::new("usd").unwrap()
}

/// Writes a request file with `rows` valid visa payments.
pub fn generate_requests_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["amount", "currency", "payment_method", "auto_capture"])?;
    for i in 1..=rows {
        let amount = (i * 100).to_string();
        wtr.write_record([amount.as_str(), "usd", "pm_card_visa", "true"])?;
    }

    wtr.flush()?;
    Ok(())
}
