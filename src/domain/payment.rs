use super::fees::FeeSplit;
use super::ids::{PaymentId, WalletId};
use super::money::{Amount, Balance};
use crate::error::LedgerError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Expired,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Expired) | (Pending, Cancelled) | (Paid, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled | Self::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        f.write_str(name)
    }
}

/// A buyer's attempt to purchase a pack.
///
/// Only the payment orchestrator moves a payment between states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub buyer_id: String,
    pub creator_id: WalletId,
    pub pack_id: String,
    pub gross_amount: Amount,
    pub platform_fee: Balance,
    pub creator_earnings: Amount,
    pub status: PaymentStatus,
    /// Correlation id assigned by the gateway.
    pub gateway_id: String,
    pub qr_code: String,
    pub qr_code_text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// `paid_at` plus the holding period; `None` until paid.
    pub available_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

/// What the checkout flow knows before the payment is stored.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: PaymentId,
    pub buyer_id: String,
    pub creator_id: WalletId,
    pub pack_id: String,
    pub split: FeeSplit,
    pub gateway_id: String,
    pub qr_code: String,
    pub qr_code_text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(new: NewPayment) -> Self {
        Self {
            id: new.id,
            buyer_id: new.buyer_id,
            creator_id: new.creator_id,
            pack_id: new.pack_id,
            gross_amount: new.split.gross,
            platform_fee: new.split.fee,
            creator_earnings: new.split.creator_earnings,
            status: PaymentStatus::Pending,
            gateway_id: new.gateway_id,
            qr_code: new.qr_code,
            qr_code_text: new.qr_code_text,
            created_at: new.created_at,
            expires_at: new.expires_at,
            paid_at: None,
            available_at: None,
            released_at: None,
            cancelled_at: None,
            refunded_at: None,
        }
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>, holding_period: Duration) -> Result<(), LedgerError> {
        self.transition(PaymentStatus::Paid)?;
        self.paid_at = Some(at);
        self.available_at = Some(at + holding_period);
        Ok(())
    }

    pub fn mark_expired(&mut self) -> Result<(), LedgerError> {
        self.transition(PaymentStatus::Expired)
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(PaymentStatus::Cancelled)?;
        self.cancelled_at = Some(at);
        Ok(())
    }

    pub fn mark_refunded(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(PaymentStatus::Refunded)?;
        self.refunded_at = Some(at);
        Ok(())
    }

    pub fn mark_released(&mut self, at: DateTime<Utc>) {
        self.released_at = Some(at);
    }

    /// A pending payment whose expiry passed without a paid event.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && now > self.expires_at
    }

    /// A paid payment whose holding period has elapsed.
    pub fn is_releasable(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Paid
            && self.released_at.is_none()
            && self.available_at.is_some_and(|at| at <= now)
    }
}
