//! The gateway port: everything the ledger needs from an instant-payment processor.

use super::money::Amount;
use super::payout::PayoutKey;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub buyer_ref: String,
    pub amount: Amount,
    /// Our payment id. Gateways deduplicate on it, so retries never create a second charge.
    pub external_id: String,
    pub expiry_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub gateway_id: String,
    pub qr_payload: String,
    pub qr_text: String,
    pub expires_at: DateTime<Utc>,
    pub status: ChargeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeStatusReport {
    pub status: ChargeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount: Option<Amount>,
}

impl ChargeStatusReport {
    pub fn pending() -> Self {
        Self {
            status: ChargeStatus::Pending,
            paid_at: None,
            paid_amount: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub payee_ref: PayoutKey,
    pub amount: Amount,
    /// Our payout id, used by the gateway for deduplication.
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayout {
    pub gateway_id: String,
    pub status: GatewayPayoutStatus,
    pub estimated_completion_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutStatusReport {
    pub status: GatewayPayoutStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl PayoutStatusReport {
    pub fn pending() -> Self {
        Self {
            status: GatewayPayoutStatus::Pending,
            completed_at: None,
            failure_reason: None,
        }
    }
}

/// Webhook event types the ledger reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    ChargePaid,
    ChargeExpired,
    ChargeCancelled,
    PayoutProcessing,
    PayoutCompleted,
    PayoutFailed,
    Unknown(String),
}

impl WebhookEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "charge.paid" => Self::ChargePaid,
            "charge.expired" => Self::ChargeExpired,
            "charge.cancelled" => Self::ChargeCancelled,
            "payout.processing" => Self::PayoutProcessing,
            "payout.completed" => Self::PayoutCompleted,
            "payout.failed" => Self::PayoutFailed,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ChargePaid => "charge.paid",
            Self::ChargeExpired => "charge.expired",
            Self::ChargeCancelled => "charge.cancelled",
            Self::PayoutProcessing => "payout.processing",
            Self::PayoutCompleted => "payout.completed",
            Self::PayoutFailed => "payout.failed",
            Self::Unknown(other) => other,
        }
    }

    pub fn is_charge_event(&self) -> bool {
        matches!(
            self,
            Self::ChargePaid | Self::ChargeExpired | Self::ChargeCancelled
        )
    }

    pub fn is_payout_event(&self) -> bool {
        matches!(
            self,
            Self::PayoutProcessing | Self::PayoutCompleted | Self::PayoutFailed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub gateway_id: String,
    pub event_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl WebhookEvent {
    /// Status report carried by a charge event, if it is one.
    pub fn charge_report(&self) -> Option<ChargeStatusReport> {
        let status = match self.event_type {
            WebhookEventType::ChargePaid => ChargeStatus::Paid,
            WebhookEventType::ChargeExpired => ChargeStatus::Expired,
            WebhookEventType::ChargeCancelled => ChargeStatus::Cancelled,
            _ => return None,
        };
        Some(ChargeStatusReport {
            status,
            paid_at: (status == ChargeStatus::Paid).then_some(self.timestamp),
            paid_amount: self
                .payload
                .get("amount")
                .and_then(serde_json::Value::as_i64)
                .and_then(|v| Amount::new(v).ok()),
        })
    }

    /// Status report carried by a payout event, if it is one.
    pub fn payout_report(&self) -> Option<PayoutStatusReport> {
        let status = match self.event_type {
            WebhookEventType::PayoutProcessing => GatewayPayoutStatus::Processing,
            WebhookEventType::PayoutCompleted => GatewayPayoutStatus::Completed,
            WebhookEventType::PayoutFailed => GatewayPayoutStatus::Failed,
            _ => return None,
        };
        Some(PayoutStatusReport {
            status,
            completed_at: (status == GatewayPayoutStatus::Completed).then_some(self.timestamp),
            failure_reason: self
                .payload
                .get("failure_reason")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Contract every payment processor adapter satisfies.
///
/// Transport failures surface as `LedgerError::GatewayUnavailable`; callers treat
/// them as unknown outcomes and poll afterwards instead of assuming failure.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_charge(&self, request: ChargeRequest) -> Result<Charge>;

    /// Unknown ids report `pending`, never an error.
    async fn charge_status(&self, gateway_id: &str) -> Result<ChargeStatusReport>;

    async fn create_payout(&self, request: PayoutRequest) -> Result<GatewayPayout>;

    /// Unknown ids report `pending`, never an error.
    async fn payout_status(&self, gateway_id: &str) -> Result<PayoutStatusReport>;

    /// Must compare in constant time.
    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool;

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<WebhookEvent>;
}

pub type GatewayHandle = Arc<dyn PaymentGateway>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: WebhookEventType, payload: serde_json::Value) -> WebhookEvent {
        WebhookEvent {
            event_type,
            gateway_id: "gw_1".into(),
            event_id: "evt_1".into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(
            WebhookEventType::parse("charge.paid"),
            WebhookEventType::ChargePaid
        );
        assert_eq!(
            WebhookEventType::parse("payout.failed"),
            WebhookEventType::PayoutFailed
        );
        assert!(matches!(
            WebhookEventType::parse("dispute.opened"),
            WebhookEventType::Unknown(_)
        ));
        assert_eq!(WebhookEventType::ChargePaid.as_str(), "charge.paid");
    }

    #[test]
    fn test_event_type_categories() {
        assert!(WebhookEventType::ChargeExpired.is_charge_event());
        assert!(!WebhookEventType::ChargeExpired.is_payout_event());
        assert!(WebhookEventType::PayoutCompleted.is_payout_event());
    }

    #[test]
    fn test_charge_report_from_event() {
        let e = event(WebhookEventType::ChargePaid, json!({ "amount": 2990 }));
        let report = e.charge_report().unwrap();
        assert_eq!(report.status, ChargeStatus::Paid);
        assert_eq!(report.paid_amount, Some(Amount::new(2990).unwrap()));
        assert!(e.payout_report().is_none());
    }

    #[test]
    fn test_payout_report_carries_failure_reason() {
        let e = event(
            WebhookEventType::PayoutFailed,
            json!({ "failure_reason": "invalid key" }),
        );
        let report = e.payout_report().unwrap();
        assert_eq!(report.status, GatewayPayoutStatus::Failed);
        assert_eq!(report.failure_reason.as_deref(), Some("invalid key"));
    }
}
