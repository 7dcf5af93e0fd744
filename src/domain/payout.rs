use super::ids::{PayoutId, WalletId};
use super::money::Amount;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn can_transition_to(self, next: PayoutStatus) -> bool {
        use PayoutStatus::*;
        // Pending -> Failed covers a definitive rejection at submission time.
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A PIX key (e-mail, phone, tax id or random key) the payout is sent to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutKey(String);

impl PayoutKey {
    pub fn new(key: impl Into<String>) -> Result<Self, LedgerError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(LedgerError::ValidationError(
                "Payout key cannot be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Keeps the first three and last two characters, hides the rest.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 5 {
            return "*".repeat(chars.len());
        }
        let hidden = chars.len() - 5;
        let mut masked: String = chars[..3].iter().collect();
        masked.push_str(&"*".repeat(hidden));
        masked.extend(&chars[chars.len() - 2..]);
        masked
    }
}

impl fmt::Debug for PayoutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayoutKey({})", self.masked())
    }
}

/// A creator's withdrawal request.
///
/// The amount is debited from the wallet when the payout is created and only
/// credited back if the payout fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub creator_id: WalletId,
    pub amount: Amount,
    pub payout_key: PayoutKey,
    pub status: PayoutStatus,
    pub gateway_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Payout {
    pub fn new(
        creator_id: WalletId,
        amount: Amount,
        payout_key: PayoutKey,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PayoutId::new(),
            creator_id,
            amount,
            payout_key,
            status: PayoutStatus::Pending,
            gateway_id: None,
            requested_at,
            estimated_completion_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    fn transition(&mut self, next: PayoutStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_processing(
        &mut self,
        gateway_id: String,
        estimated_completion_at: Option<DateTime<Utc>>,
    ) -> Result<(), LedgerError> {
        self.transition(PayoutStatus::Processing)?;
        self.gateway_id = Some(gateway_id);
        self.estimated_completion_at = estimated_completion_at;
        Ok(())
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(PayoutStatus::Completed)?;
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), LedgerError> {
        self.transition(PayoutStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

/// Read model of a payout handed to callers outside the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutView {
    pub id: PayoutId,
    pub creator_id: WalletId,
    pub amount: Amount,
    pub payout_key: String,
    pub status: PayoutStatus,
    pub requested_at: DateTime<Utc>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl From<&Payout> for PayoutView {
    fn from(payout: &Payout) -> Self {
        Self {
            id: payout.id,
            creator_id: payout.creator_id.clone(),
            amount: payout.amount,
            payout_key: payout.payout_key.masked(),
            status: payout.status,
            requested_at: payout.requested_at,
            estimated_completion_at: payout.estimated_completion_at,
            completed_at: payout.completed_at,
            failure_reason: payout.failure_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payout() -> Payout {
        Payout::new(
            WalletId::new("creator-1"),
            Amount::new(4000).unwrap(),
            PayoutKey::new("creator@example.com").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_payout_key_masking() {
        let key = PayoutKey::new("creator@example.com").unwrap();
        assert_eq!(key.masked(), "cre**************om");
        assert_eq!(PayoutKey::new("12345").unwrap().masked(), "*****");
        assert!(!format!("{key:?}").contains("example"));
    }

    #[test]
    fn test_empty_payout_key_rejected() {
        assert!(PayoutKey::new("   ").is_err());
    }

    #[test]
    fn test_happy_path() {
        let mut p = payout();
        p.mark_processing("sim_po_1".into(), None).unwrap();
        assert_eq!(p.gateway_id.as_deref(), Some("sim_po_1"));
        p.mark_completed(Utc::now()).unwrap();
        assert_eq!(p.status, PayoutStatus::Completed);
        assert!(!p.status.is_open());
    }

    #[test]
    fn test_failure_records_reason() {
        let mut p = payout();
        p.mark_processing("sim_po_1".into(), None).unwrap();
        p.mark_failed("key not found").unwrap();
        assert_eq!(p.failure_reason.as_deref(), Some("key not found"));
    }

    #[test]
    fn test_completed_payout_cannot_fail() {
        let mut p = payout();
        assert!(p.mark_completed(Utc::now()).is_err());
        p.mark_processing("sim_po_1".into(), None).unwrap();
        p.mark_completed(Utc::now()).unwrap();
        assert!(matches!(
            p.mark_failed("late"),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_view_masks_key() {
        let p = payout();
        let view = PayoutView::from(&p);
        assert_eq!(view.payout_key, p.payout_key.masked());
    }
}
