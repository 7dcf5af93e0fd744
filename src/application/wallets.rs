use super::context::LedgerContext;
use crate::domain::ids::WalletId;
use crate::domain::ledger::{LedgerEntry, net_balance};
use crate::domain::money::Balance;
use crate::domain::ports::{CreatorDirectory, Page};
use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletSummary {
    pub wallet_id: WalletId,
    pub available: Balance,
    pub frozen: Balance,
    pub total: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPage {
    pub entries: Vec<LedgerEntry>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Cached balances of a wallet checked against its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerCheck {
    pub wallet_id: WalletId,
    pub cached_total: Balance,
    pub ledger_total: Balance,
    pub entries: usize,
}

impl LedgerCheck {
    pub fn is_consistent(&self) -> bool {
        self.cached_total == self.ledger_total
    }
}

/// Read side of the wallets. History comes strictly from ledger rows.
#[derive(Clone)]
pub struct WalletQueries {
    ctx: LedgerContext,
    directory: Arc<dyn CreatorDirectory>,
}

impl WalletQueries {
    pub fn new(ctx: LedgerContext, directory: Arc<dyn CreatorDirectory>) -> Self {
        Self { ctx, directory }
    }

    /// Wallet of the creator account behind a signed-in user.
    pub async fn wallet_for_user(&self, user_id: &str) -> Result<WalletId> {
        self.directory
            .creator_for_user(user_id)
            .await?
            .map(|profile| profile.creator_id)
            .ok_or_else(|| LedgerError::CreatorNotFound(user_id.to_string()))
    }

    /// A wallet that never earned anything reads as all zeros.
    pub async fn summary(&self, wallet_id: &WalletId) -> Result<WalletSummary> {
        let (available, frozen) = match self.ctx.store.wallet(wallet_id).await? {
            Some(wallet) => (wallet.available, wallet.frozen),
            None => (Balance::ZERO, Balance::ZERO),
        };
        Ok(WalletSummary {
            wallet_id: wallet_id.clone(),
            available,
            frozen,
            total: available + frozen,
        })
    }

    pub async fn summaries(&self) -> Result<Vec<WalletSummary>> {
        Ok(self
            .ctx
            .store
            .wallets()
            .await?
            .into_iter()
            .map(|w| WalletSummary {
                total: w.total(),
                wallet_id: w.owner_id,
                available: w.available,
                frozen: w.frozen,
            })
            .collect())
    }

    /// Newest entries first.
    pub async fn history(&self, wallet_id: &WalletId, page: Page) -> Result<TransactionPage> {
        Ok(TransactionPage {
            entries: self.ctx.store.entries(wallet_id, page).await?,
            total: self.ctx.store.entry_count(wallet_id).await?,
            offset: page.offset,
            limit: page.limit,
        })
    }

    pub async fn verify(&self, wallet_id: &WalletId) -> Result<LedgerCheck> {
        let cached_total = self
            .ctx
            .store
            .wallet(wallet_id)
            .await?
            .map_or(Balance::ZERO, |w| w.total());
        let entries = self.ctx.store.all_entries(wallet_id).await?;
        let check = LedgerCheck {
            wallet_id: wallet_id.clone(),
            cached_total,
            ledger_total: net_balance(&entries),
            entries: entries.len(),
        };
        if !check.is_consistent() {
            tracing::error!(
                %wallet_id,
                cached = %check.cached_total,
                ledger = %check.ledger_total,
                "Wallet balance does not match its ledger"
            );
        }
        Ok(check)
    }
}
