use crate::domain::ids::WalletId;
use crate::domain::payment::Payment;
use crate::domain::payout::PayoutKey;
use crate::domain::ports::{
    CreatorDirectory, CreatorProfile, PackCatalog, PackListing, PurchaseNotifier,
};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Deserialize)]
struct CreatorRecord {
    user_id: String,
    creator_id: WalletId,
    payout_key: PayoutKey,
}

#[derive(Deserialize, Default)]
struct DirectoryFile {
    #[serde(default)]
    packs: Vec<PackListing>,
    #[serde(default)]
    creators: Vec<CreatorRecord>,
}

/// Packs and creator accounts loaded once from a JSON document.
///
/// ```json
/// { "packs": [{ "pack_id": "p1", "creator_id": "c1", "title": "Pack", "price": 2990 }],
///   "creators": [{ "user_id": "u1", "creator_id": "c1", "payout_key": "c1@example.com" }] }
/// ```
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    packs: HashMap<String, PackListing>,
    creators: HashMap<String, CreatorProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: DirectoryFile = serde_json::from_str(raw)
            .map_err(|e| LedgerError::Config(format!("Invalid directory file: {e}")))?;
        let mut directory = Self::new();
        for pack in file.packs {
            directory = directory.with_pack(pack);
        }
        for record in file.creators {
            directory = directory.with_creator(
                record.user_id,
                CreatorProfile {
                    creator_id: record.creator_id,
                    payout_key: record.payout_key,
                },
            );
        }
        Ok(directory)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn with_pack(mut self, pack: PackListing) -> Self {
        self.packs.insert(pack.pack_id.clone(), pack);
        self
    }

    pub fn with_creator(mut self, user_id: impl Into<String>, profile: CreatorProfile) -> Self {
        self.creators.insert(user_id.into(), profile);
        self
    }
}

#[async_trait]
impl PackCatalog for StaticDirectory {
    async fn pack(&self, pack_id: &str) -> Result<Option<PackListing>> {
        Ok(self.packs.get(pack_id).cloned())
    }
}

#[async_trait]
impl CreatorDirectory for StaticDirectory {
    async fn creator_for_user(&self, user_id: &str) -> Result<Option<CreatorProfile>> {
        Ok(self.creators.get(user_id).cloned())
    }
}

/// Emits a tracing event for every successful purchase.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl PurchaseNotifier for LogNotifier {
    async fn purchase_succeeded(&self, payment: &Payment) {
        tracing::info!(
            payment_id = %payment.id,
            buyer_id = %payment.buyer_id,
            pack_id = %payment.pack_id,
            "Purchase succeeded"
        );
    }
}
