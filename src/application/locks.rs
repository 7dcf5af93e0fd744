use crate::domain::ids::WalletId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per wallet.
///
/// Every read-decide-commit sequence on a wallet runs while holding its guard,
/// so two callers never act on the same stale balance. Different wallets never
/// contend.
#[derive(Default, Clone)]
pub struct WalletLocks {
    locks: Arc<Mutex<HashMap<WalletId, Arc<AsyncMutex<()>>>>>,
}

/// Guards of every wallet an operation touches. Released on drop.
pub struct WalletGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, wallet: &WalletId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(wallet.clone()).or_default().clone()
    }

    pub async fn acquire(&self, wallet: &WalletId) -> WalletGuard {
        let guard = self.lock_for(wallet).lock_owned().await;
        WalletGuard {
            _guards: vec![guard],
        }
    }

    /// Locks several wallets in id order, so overlapping callers cannot deadlock.
    pub async fn acquire_many(&self, wallets: &[&WalletId]) -> WalletGuard {
        let mut ordered: Vec<&WalletId> = wallets.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for wallet in ordered {
            guards.push(self.lock_for(wallet).lock_owned().await);
        }
        WalletGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_wallet_is_serialised() {
        let locks = WalletLocks::new();
        let wallet = WalletId::new("creator-1");

        let guard = locks.acquire(&wallet).await;
        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&wallet)).await;
        assert!(blocked.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&wallet)).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_wallets_do_not_contend() {
        let locks = WalletLocks::new();
        let _a = locks.acquire(&WalletId::new("creator-1")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(&WalletId::new("creator-2")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_many_tolerates_duplicates() {
        let locks = WalletLocks::new();
        let wallet = WalletId::new("creator-1");
        let platform = WalletId::platform();
        let guard = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire_many(&[&platform, &wallet, &wallet]),
        )
        .await;
        assert!(guard.is_ok());
    }
}
