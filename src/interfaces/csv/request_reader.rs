use crate::application::pipeline::{PaymentRequest, PaymentRequestRecord};
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads payment requests from a CSV source.
///
/// Expects the columns `amount, currency, payment_method, auto_capture`.
/// Whitespace is trimmed and a missing `auto_capture` means `false`.
pub struct PaymentRequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentRequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and validates requests, one `Result` per row.
    pub fn requests(self) -> impl Iterator<Item = Result<PaymentRequest>> {
        self.reader.into_deserialize().map(|row| {
            let record: PaymentRequestRecord = row.map_err(PaymentError::from)?;
            PaymentRequest::try_from(record)
        })
    }
}
