use crate::domain::ids::{PaymentId, PayoutId, WalletId};
use crate::domain::ledger::{Category, EntryReference, LedgerEntry};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::payout::{Payout, PayoutStatus};
use crate::domain::ports::{
    Commit, LedgerStore, Page, PaymentStore, PayoutStore, Storage, WalletStore, WebhookLog,
};
use crate::domain::wallet::Wallet;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

pub const CF_WALLETS: &str = "wallets";
/// Ledger entries keyed by `wallet id, 0x00, sequence (big endian)`.
pub const CF_ENTRIES: &str = "entries";
/// Posting keys and `(reference, category)` markers used for idempotency checks.
pub const CF_POSTINGS: &str = "postings";
pub const CF_PAYMENTS: &str = "payments";
pub const CF_PAYOUTS: &str = "payouts";
/// Gateway correlation id -> payment/payout id.
pub const CF_GATEWAY_INDEX: &str = "gateway_index";
pub const CF_EVENTS: &str = "events";
pub const CF_META: &str = "meta";

const ENTRY_SEQUENCE_KEY: &[u8] = b"entry_sequence";

fn internal(message: impl Into<String>) -> LedgerError {
    LedgerError::InternalError(Box::new(std::io::Error::other(message.into())))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| internal(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| internal(format!("Deserialization error: {e}")))
}

fn wallet_prefix(wallet: &WalletId) -> Vec<u8> {
    let mut prefix = wallet.as_str().as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn reference_marker(reference: &EntryReference, category: Category) -> Result<Vec<u8>> {
    let mut key = b"ref:".to_vec();
    key.extend(encode(&(reference, category))?);
    Ok(key)
}

fn posting_marker(entry: &LedgerEntry) -> Result<Vec<u8>> {
    let mut key = b"key:".to_vec();
    key.extend(encode(&entry.posting_key())?);
    Ok(key)
}

/// A persistent store implementation using RocksDB.
///
/// Each entity lives in its own Column Family. A commit is a single
/// `WriteBatch`; the posting-key check and the write run under one mutex so two
/// commits can never both pass the uniqueness check.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [
            CF_WALLETS,
            CF_ENTRIES,
            CF_POSTINGS,
            CF_PAYMENTS,
            CF_PAYOUTS,
            CF_GATEWAY_INDEX,
            CF_EVENTS,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| internal(format!("Column family '{name}' not found")))
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self.db.get_pinned_cf(handle, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, cf: &str, key: &[u8]) -> Result<bool> {
        let handle = self.cf(cf)?;
        Ok(self.db.get_pinned_cf(handle, key)?.is_some())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(decode(&value)?);
        }
        Ok(items)
    }

    fn wallet_entries(&self, wallet: &WalletId) -> Result<Vec<LedgerEntry>> {
        let handle = self.cf(CF_ENTRIES)?;
        let prefix = wallet_prefix(wallet);
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(decode(&value)?);
        }
        Ok(entries)
    }

    fn next_sequence(&self) -> Result<u64> {
        let handle = self.cf(CF_META)?;
        Ok(match self.db.get_pinned_cf(handle, ENTRY_SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| internal("Corrupt entry sequence"))?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        })
    }

    fn write_commit(&self, commit: Commit) -> Result<()> {
        let _guard = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut seen = HashSet::new();
        for entry in &commit.entries {
            let marker = posting_marker(entry)?;
            if self.contains(CF_POSTINGS, &marker)? || !seen.insert(marker) {
                return Err(LedgerError::DuplicatePosting(entry.posting_key().to_string()));
            }
        }

        let wallets = self.cf(CF_WALLETS)?;
        let entries = self.cf(CF_ENTRIES)?;
        let postings = self.cf(CF_POSTINGS)?;
        let payments = self.cf(CF_PAYMENTS)?;
        let payouts = self.cf(CF_PAYOUTS)?;
        let gateway_index = self.cf(CF_GATEWAY_INDEX)?;
        let events = self.cf(CF_EVENTS)?;
        let meta = self.cf(CF_META)?;

        let mut batch = WriteBatch::default();
        for wallet in &commit.wallets {
            batch.put_cf(wallets, wallet.owner_id.as_str().as_bytes(), encode(wallet)?);
        }

        let mut sequence = self.next_sequence()?;
        for entry in &commit.entries {
            let mut key = wallet_prefix(&entry.wallet_id);
            key.extend_from_slice(&sequence.to_be_bytes());
            sequence += 1;
            batch.put_cf(entries, key, encode(entry)?);
            batch.put_cf(postings, posting_marker(entry)?, b"");
            batch.put_cf(postings, reference_marker(&entry.reference, entry.category)?, b"");
        }
        batch.put_cf(meta, ENTRY_SEQUENCE_KEY, sequence.to_be_bytes());

        for payment in &commit.payments {
            let id = payment.id.to_string();
            batch.put_cf(payments, id.as_bytes(), encode(payment)?);
            batch.put_cf(
                gateway_index,
                format!("payment:{}", payment.gateway_id).as_bytes(),
                id.as_bytes(),
            );
        }
        for payout in &commit.payouts {
            let id = payout.id.to_string();
            batch.put_cf(payouts, id.as_bytes(), encode(payout)?);
            if let Some(gateway_id) = &payout.gateway_id {
                batch.put_cf(
                    gateway_index,
                    format!("payout:{gateway_id}").as_bytes(),
                    id.as_bytes(),
                );
            }
        }
        for event_id in &commit.processed_events {
            batch.put_cf(events, event_id.as_bytes(), b"");
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn indexed_id(&self, key: String) -> Result<Option<String>> {
        let handle = self.cf(CF_GATEWAY_INDEX)?;
        match self.db.get_pinned_cf(handle, key.as_bytes())? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes.to_vec()).map_err(|e| internal(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WalletStore for RocksDBStore {
    async fn wallet(&self, id: &WalletId) -> Result<Option<Wallet>> {
        self.get(CF_WALLETS, id.as_str().as_bytes())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        self.scan(CF_WALLETS)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn entries(&self, wallet: &WalletId, page: Page) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .wallet_entries(wallet)?
            .into_iter()
            .rev()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn entry_count(&self, wallet: &WalletId) -> Result<usize> {
        Ok(self.wallet_entries(wallet)?.len())
    }

    async fn all_entries(&self, wallet: &WalletId) -> Result<Vec<LedgerEntry>> {
        self.wallet_entries(wallet)
    }

    async fn has_entry(&self, reference: &EntryReference, category: Category) -> Result<bool> {
        self.contains(CF_POSTINGS, &reference_marker(reference, category)?)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, id.to_string().as_bytes())
    }

    async fn payment_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payment>> {
        match self.indexed_id(format!("payment:{gateway_id}"))? {
            Some(id) => self.get(CF_PAYMENTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn payments_with_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.status == status)
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn payments_for_creator(&self, creator: &WalletId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .scan::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| &p.creator_id == creator)
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

#[async_trait]
impl PayoutStore for RocksDBStore {
    async fn payout(&self, id: PayoutId) -> Result<Option<Payout>> {
        self.get(CF_PAYOUTS, id.to_string().as_bytes())
    }

    async fn payout_by_gateway_id(&self, gateway_id: &str) -> Result<Option<Payout>> {
        match self.indexed_id(format!("payout:{gateway_id}"))? {
            Some(id) => self.get(CF_PAYOUTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn payouts_with_status(&self, status: PayoutStatus) -> Result<Vec<Payout>> {
        let mut payouts: Vec<Payout> = self
            .scan::<Payout>(CF_PAYOUTS)?
            .into_iter()
            .filter(|p| p.status == status)
            .collect();
        payouts.sort_by_key(|p| p.requested_at);
        Ok(payouts)
    }

    async fn payouts_for_creator(&self, creator: &WalletId) -> Result<Vec<Payout>> {
        let mut payouts: Vec<Payout> = self
            .scan::<Payout>(CF_PAYOUTS)?
            .into_iter()
            .filter(|p| &p.creator_id == creator)
            .collect();
        payouts.sort_by_key(|p| p.requested_at);
        Ok(payouts)
    }
}

#[async_trait]
impl WebhookLog for RocksDBStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool> {
        self.contains(CF_EVENTS, event_id.as_bytes())
    }
}

#[async_trait]
impl Storage for RocksDBStore {
    async fn commit(&self, commit: Commit) -> Result<()> {
        self.write_commit(commit)
    }
}
