use super::ids::WalletId;
use super::money::{Amount, Balance};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached balance pair of a payee.
///
/// `available + frozen` always equals the net of the wallet's ledger entries.
/// Wallets are created lazily on first earning and never deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Wallet {
    pub owner_id: WalletId,
    /// Funds the owner can withdraw.
    pub available: Balance,
    /// Sale proceeds still inside the holding period.
    pub frozen: Balance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner_id: WalletId, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            available: Balance::ZERO,
            frozen: Balance::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total(&self) -> Balance {
        self.available + self.frozen
    }

    /// Books sale proceeds into the frozen bucket.
    pub fn credit_frozen(&mut self, amount: Amount) {
        self.frozen += amount;
    }

    /// Books funds directly into the available bucket.
    pub fn credit_available(&mut self, amount: Amount) {
        self.available += amount;
    }

    /// Moves funds whose holding period elapsed from frozen to available.
    pub fn release(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if self.frozen.covers(amount) {
            self.frozen -= amount;
            self.available += amount;
            Ok(())
        } else {
            Err(LedgerError::InvariantViolation(format!(
                "Wallet {} has {} frozen, cannot release {}",
                self.owner_id, self.frozen, amount
            )))
        }
    }

    /// Takes a payout amount out of the available bucket.
    pub fn reserve(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if self.available.covers(amount) {
            self.available -= amount;
            Ok(())
        } else {
            Err(LedgerError::InsufficientBalance {
                requested: amount.value(),
                available: self.available.value(),
            })
        }
    }

    /// Removes refunded earnings that were never released.
    pub fn debit_frozen(&mut self, amount: Amount) -> bool {
        if self.frozen.covers(amount) {
            self.frozen -= amount;
            true
        } else {
            false
        }
    }

    /// Removes refunded earnings that were already released.
    pub fn debit_available(&mut self, amount: Amount) -> bool {
        if self.available.covers(amount) {
            self.available -= amount;
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Wallet {
        Wallet::new(WalletId::new("creator-1"), Utc::now())
    }

    fn amount(value: i64) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_sale_credit_is_frozen() {
        let mut w = wallet();
        w.credit_frozen(amount(2572));
        assert_eq!(w.frozen, Balance::new(2572));
        assert_eq!(w.available, Balance::ZERO);
        assert_eq!(w.total(), Balance::new(2572));
    }

    #[test]
    fn test_release_moves_between_buckets() {
        let mut w = wallet();
        w.credit_frozen(amount(1000));
        w.release(amount(1000)).unwrap();
        assert_eq!(w.frozen, Balance::ZERO);
        assert_eq!(w.available, Balance::new(1000));
        assert_eq!(w.total(), Balance::new(1000));
    }

    #[test]
    fn test_release_more_than_frozen_fails() {
        let mut w = wallet();
        w.credit_frozen(amount(10));
        let result = w.release(amount(11));
        assert!(matches!(result, Err(LedgerError::InvariantViolation(_))));
        assert_eq!(w.frozen, Balance::new(10));
    }

    #[test]
    fn test_reserve_success() {
        let mut w = wallet();
        w.credit_available(amount(5000));
        w.reserve(amount(4000)).unwrap();
        assert_eq!(w.available, Balance::new(1000));
    }

    #[test]
    fn test_reserve_insufficient() {
        let mut w = wallet();
        w.credit_available(amount(1000));
        let result = w.reserve(amount(4000));
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance {
                requested: 4000,
                available: 1000
            })
        ));
        assert_eq!(w.available, Balance::new(1000));
    }

    #[test]
    fn test_refund_debits_leave_other_bucket_alone() {
        let mut w = wallet();
        w.credit_frozen(amount(300));
        w.credit_available(amount(200));

        assert!(!w.debit_available(amount(250)));
        assert!(w.debit_frozen(amount(250)));
        assert_eq!(w.frozen, Balance::new(50));
        assert_eq!(w.available, Balance::new(200));
    }
}
