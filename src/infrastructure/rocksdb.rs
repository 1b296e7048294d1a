use crate::domain::payment::{Payment, StatusHistoryEntry};
use crate::domain::ports::PaymentLedger;
use crate::domain::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for payment rows, keyed by surrogate id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for history rows, keyed by `payment_id ++ history_id`.
pub const CF_HISTORY: &str = "payment_status_history";
/// Column Family mapping `external_id` to the surrogate id.
pub const CF_EXTERNAL_IDS: &str = "external_ids";
/// Column Family holding id sequences.
pub const CF_META: &str = "meta";

const PAYMENT_SEQ: &[u8] = b"payment_seq";
const HISTORY_SEQ: &[u8] = b"history_seq";

/// A persistent ledger implementation using RocksDB.
///
/// Writes are serialized through an in-process mutex and committed with a
/// single `WriteBatch`, so a status change and its history row land together
/// and the version check cannot race another writer in this process.
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_PAYMENTS, CF_HISTORY, CF_EXTERNAL_IDS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf)?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf)?;
        batch.put_cf(&cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn get_payment(&self, id: u64) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, &id.to_be_bytes())
    }

    fn lookup_id(&self, external_id: &str) -> Result<Option<u64>> {
        let cf = self.cf(CF_EXTERNAL_IDS)?;
        Ok(self
            .db
            .get_cf(&cf, external_id.as_bytes())?
            .and_then(|bytes| decode_u64(&bytes)))
    }

    /// Returns the next value of a sequence and stages the increment in `batch`.
    fn next_seq(&self, batch: &mut WriteBatch, name: &[u8]) -> Result<u64> {
        let cf = self.cf(CF_META)?;
        let current = self
            .db
            .get_cf(&cf, name)?
            .and_then(|bytes| decode_u64(&bytes))
            .unwrap_or(0);
        let next = current + 1;
        batch.put_cf(&cf, name, next.to_be_bytes());
        Ok(next)
    }

    fn history_prefix_scan(&self, payment_id: u64) -> Result<Vec<(Box<[u8]>, StatusHistoryEntry)>> {
        let cf = self.cf(CF_HISTORY)?;
        let prefix = payment_id.to_be_bytes();
        let mut rows = Vec::new();

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            rows.push((key, serde_json::from_slice(&value)?));
        }
        Ok(rows)
    }
}

fn decode_u64(bytes: &[u8]) -> Option<u64> {
    bytes.try_into().ok().map(u64::from_be_bytes)
}

fn history_key(payment_id: u64, history_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&payment_id.to_be_bytes());
    key[8..].copy_from_slice(&history_id.to_be_bytes());
    key
}

#[async_trait]
impl PaymentLedger for RocksDbLedger {
    async fn upsert_by_external_id(
        &self,
        external_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let mut batch = WriteBatch::default();

        let payment = match self.lookup_id(external_id)? {
            Some(id) => {
                let mut payment = self
                    .get_payment(id)?
                    .ok_or_else(|| PaymentError::LedgerNotFound(external_id.to_string()))?;
                payment.refresh(amount, currency, now);
                payment
            }
            None => {
                let id = self.next_seq(&mut batch, PAYMENT_SEQ)?;
                let cf = self.cf(CF_EXTERNAL_IDS)?;
                batch.put_cf(&cf, external_id.as_bytes(), id.to_be_bytes());
                Payment::new(id, external_id, amount, currency, now)
            }
        };

        self.put_json(&mut batch, CF_PAYMENTS, &payment.id.to_be_bytes(), &payment)?;
        self.db.write(batch)?;
        Ok(payment)
    }

    async fn record_status_change(
        &self,
        payment: &Payment,
        new_status: PaymentStatus,
        error_message: Option<String>,
    ) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;

        let mut stored = self
            .get_payment(payment.id)?
            .ok_or_else(|| PaymentError::LedgerNotFound(payment.external_id.clone()))?;
        if stored.version != payment.version {
            return Err(PaymentError::LedgerConflict {
                external_id: payment.external_id.clone(),
            });
        }

        let mut batch = WriteBatch::default();
        if let Some(entry) = stored.apply_status(new_status, error_message, Utc::now()) {
            let history_id = self.next_seq(&mut batch, HISTORY_SEQ)?;
            let entry = entry.into_entry(history_id, stored.id);
            self.put_json(
                &mut batch,
                CF_HISTORY,
                &history_key(stored.id, history_id),
                &entry,
            )?;
        }
        self.put_json(&mut batch, CF_PAYMENTS, &stored.id.to_be_bytes(), &stored)?;
        self.db.write(batch)?;

        Ok(stored)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Payment>> {
        match self.lookup_id(external_id)? {
            Some(id) => self.get_payment(id),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item?;
            payments.push(serde_json::from_slice(&value)?);
        }
        Ok(payments)
    }

    async fn list_by_statuses(&self, statuses: &[PaymentStatus]) -> Result<Vec<Payment>> {
        let mut payments = self.list_all().await?;
        payments.retain(|p| p.status.as_ref().is_some_and(|s| statuses.contains(s)));
        Ok(payments)
    }

    async fn list_known_external_ids(&self) -> Result<HashSet<String>> {
        let cf = self.cf(CF_EXTERNAL_IDS)?;
        let mut ids = HashSet::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _value) = item?;
            ids.insert(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    async fn history(&self, payment_id: u64) -> Result<Vec<StatusHistoryEntry>> {
        let mut entries: Vec<StatusHistoryEntry> = self
            .history_prefix_scan(payment_id)?
            .into_iter()
            .map(|(_key, entry)| entry)
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(entries)
    }

    async fn remove(&self, payment_id: u64) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let payment = self
            .get_payment(payment_id)?
            .ok_or_else(|| PaymentError::LedgerNotFound(payment_id.to_string()))?;

        let mut batch = WriteBatch::default();
        let history_cf = self.cf(CF_HISTORY)?;
        for (key, _entry) in self.history_prefix_scan(payment_id)? {
            batch.delete_cf(&history_cf, key);
        }
        batch.delete_cf(&self.cf(CF_EXTERNAL_IDS)?, payment.external_id.as_bytes());
        batch.delete_cf(&self.cf(CF_PAYMENTS)?, payment_id.to_be_bytes());
        self.db.write(batch)?;
        Ok(())
    }
}
