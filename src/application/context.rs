use super::locks::WalletLocks;
use crate::config::LedgerPolicy;
use crate::domain::clock::ClockHandle;
use crate::domain::gateway::GatewayHandle;
use crate::domain::ids::WalletId;
use crate::domain::ports::{Commit, StorageHandle};
use crate::domain::wallet::Wallet;
use crate::error::Result;

/// What every orchestrator and job works against.
///
/// Cloning is cheap and all clones share the same locks, so orchestrators built
/// from one context serialise on the same wallets.
#[derive(Clone)]
pub struct LedgerContext {
    pub store: StorageHandle,
    pub gateway: GatewayHandle,
    pub clock: ClockHandle,
    pub policy: LedgerPolicy,
    pub locks: WalletLocks,
}

impl LedgerContext {
    pub fn new(
        store: StorageHandle,
        gateway: GatewayHandle,
        clock: ClockHandle,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            policy,
            locks: WalletLocks::new(),
        }
    }

    /// The stored wallet, or a fresh zeroed one. Only call it under the wallet's lock.
    pub(crate) async fn wallet_or_new(&self, id: &WalletId) -> Result<Wallet> {
        Ok(self
            .store
            .wallet(id)
            .await?
            .unwrap_or_else(|| Wallet::new(id.clone(), self.clock.now())))
    }

    /// Records a webhook event id on its own, for events that changed nothing.
    pub(crate) async fn mark_processed(&self, event_id: Option<&str>) -> Result<()> {
        let commit = Commit::new().processed_event(event_id);
        if commit.is_empty() {
            return Ok(());
        }
        self.store.commit(commit).await
    }
}
