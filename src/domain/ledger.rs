use super::ids::{EntryId, PaymentId, PayoutId, ReconciliationRunId, WalletId};
use super::money::{Amount, Balance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Sale,
    PlatformFee,
    Payout,
    Refund,
    Adjustment,
    Release,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sale => "SALE",
            Self::PlatformFee => "PLATFORM_FEE",
            Self::Payout => "PAYOUT",
            Self::Refund => "REFUND",
            Self::Adjustment => "ADJUSTMENT",
            Self::Release => "RELEASE",
        };
        f.write_str(name)
    }
}

/// The business record an entry was posted for. Entries reference, never own, it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntryReference {
    Payment(PaymentId),
    Payout(PayoutId),
    Reconciliation(ReconciliationRunId),
}

impl fmt::Display for EntryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payment(id) => write!(f, "payment:{id}"),
            Self::Payout(id) => write!(f, "payout:{id}"),
            Self::Reconciliation(id) => write!(f, "reconciliation:{id}"),
        }
    }
}

/// Uniqueness key of a posting. A store accepts at most one entry per key,
/// which is what makes replays of the same business event harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostingKey {
    pub wallet_id: WalletId,
    pub reference: EntryReference,
    pub category: Category,
    pub direction: Direction,
}

impl fmt::Display for PostingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{:?}",
            self.wallet_id, self.reference, self.category, self.direction
        )
    }
}

/// An immutable line in a wallet's ledger.
///
/// Entries are appended, never updated or deleted. Corrections are new
/// `ADJUSTMENT` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub wallet_id: WalletId,
    pub direction: Direction,
    pub category: Category,
    pub amount: Amount,
    /// Wallet total (available + frozen) right after this entry.
    pub balance_after: Balance,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    pub reference: EntryReference,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet_id: WalletId,
        direction: Direction,
        category: Category,
        amount: Amount,
        balance_after: Balance,
        description: impl Into<String>,
        reference: EntryReference,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            wallet_id,
            direction,
            category,
            amount,
            balance_after,
            description: description.into(),
            metadata: BTreeMap::new(),
            reference,
            created_at,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn posting_key(&self) -> PostingKey {
        PostingKey {
            wallet_id: self.wallet_id.clone(),
            reference: self.reference,
            category: self.category,
            direction: self.direction,
        }
    }

    /// The entry's effect on the wallet total: positive for credits.
    pub fn signed_amount(&self) -> Balance {
        match self.direction {
            Direction::Credit => Balance::new(self.amount.value()),
            Direction::Debit => Balance::new(-self.amount.value()),
        }
    }
}

/// Σ credits − Σ debits over a set of entries.
pub fn net_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Balance {
    entries
        .into_iter()
        .fold(Balance::ZERO, |acc, entry| acc + entry.signed_amount())
}
