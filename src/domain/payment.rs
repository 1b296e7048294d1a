use crate::domain::status::PaymentStatus;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A positive amount in the currency's minor units (e.g. cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self, PaymentError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = PaymentError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Lower-cased three letter ISO 4217 code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, PaymentError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Invalid currency code: {code:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The processor's view of a single payment attempt.
///
/// Owned by the remote side; we only ever hold snapshots of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    /// Only meant to be handed to a client-side confirmation flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// A ledger row mirroring one `RemoteIntent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Local surrogate key.
    pub id: u64,
    /// The processor's identifier. Unique across the ledger.
    pub external_id: String,
    /// Last status read from the processor; `None` until the first read is recorded.
    pub status: Option<PaymentStatus>,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write. Status changes are conditioned on it.
    pub version: u64,
}

impl Payment {
    pub fn new(
        id: u64,
        external_id: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            external_id: external_id.into(),
            status: None,
            amount,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// The status the guard should be evaluated against.
    pub fn current_status(&self) -> PaymentStatus {
        self.status
            .clone()
            .unwrap_or_else(|| PaymentStatus::Unknown(String::new()))
    }

    pub fn refresh(&mut self, amount: i64, currency: &str, now: DateTime<Utc>) {
        self.amount = amount;
        self.currency = currency.to_string();
        self.updated_at = now;
        self.version += 1;
    }

    /// Applies a freshly read status.
    ///
    /// Returns the history row to append, if any: only when the status actually
    /// changes or an error is being recorded. The status itself is always written.
    pub fn apply_status(
        &mut self,
        new_status: PaymentStatus,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<NewHistoryEntry> {
        let changed = self.status.as_ref() != Some(&new_status);
        let entry = (changed || error_message.is_some()).then(|| NewHistoryEntry {
            status: new_status.clone(),
            error_message,
            created_at: now,
        });

        self.status = Some(new_status);
        self.updated_at = now;
        self.version += 1;
        entry
    }
}

/// A history row that has not been assigned its keys yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub status: PaymentStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewHistoryEntry {
    pub fn into_entry(self, id: u64, payment_id: u64) -> StatusHistoryEntry {
        StatusHistoryEntry {
            id,
            payment_id,
            status: self.status,
            created_at: self.created_at,
            error_message: self.error_message,
        }
    }
}

/// Append-only audit row. Never updated; removed only together with its payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: u64,
    pub payment_id: u64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub error_message: Option<String>,
}
