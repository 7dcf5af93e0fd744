use super::webhook::{self, WebhookSigner, WireEvent};
use crate::domain::clock::ClockHandle;
use crate::domain::gateway::{
    Charge, ChargeRequest, ChargeStatus, ChargeStatusReport, GatewayPayout, GatewayPayoutStatus,
    PaymentGateway, PayoutRequest, PayoutStatusReport, WebhookEvent, WebhookEventType,
};
use crate::domain::money::Amount;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// How the simulated processor progresses on its own.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedSettings {
    /// Charges count as paid this long after creation. `None` means only
    /// `approve_charge` pays them.
    pub approve_after: Option<Duration>,
    /// Payouts without a forced outcome complete this long after creation.
    pub payout_settle_after: Duration,
}

impl Default for SimulatedSettings {
    fn default() -> Self {
        Self {
            approve_after: None,
            payout_settle_after: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone)]
struct SimCharge {
    gateway_id: String,
    amount: Amount,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
enum ForcedOutcome {
    Completed(DateTime<Utc>),
    Failed(String),
}

#[derive(Debug, Clone)]
struct SimPayout {
    gateway_id: String,
    amount: Amount,
    created_at: DateTime<Utc>,
    outcome: Option<ForcedOutcome>,
}

#[derive(Default)]
struct SimState {
    charges: HashMap<String, SimCharge>,
    charge_by_external: HashMap<String, String>,
    payouts: HashMap<String, SimPayout>,
    payout_by_external: HashMap<String, String>,
}

/// A signed webhook body ready to be posted to the ledger.
#[derive(Debug, Clone)]
pub struct SignedWebhook {
    pub body: Vec<u8>,
    pub signature: String,
}

/// Process-local stand-in for a PIX processor.
///
/// Nothing runs in the background: every status is derived from the stored
/// timestamps and the injected clock when it is read.
pub struct SimulatedGateway {
    clock: ClockHandle,
    settings: SimulatedSettings,
    signer: WebhookSigner,
    state: RwLock<SimState>,
    unavailable: AtomicBool,
}

impl SimulatedGateway {
    pub fn new(clock: ClockHandle, settings: SimulatedSettings, webhook_secret: SecretString) -> Self {
        Self {
            clock,
            settings,
            signer: WebhookSigner::new(webhook_secret),
            state: RwLock::new(SimState::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Outage switch: while down every call fails with `GatewayUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn ensure_up(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::GatewayUnavailable(
                "simulated gateway is down".to_string(),
            ));
        }
        Ok(())
    }

    /// Random so ids stay unique across restarts over a persistent store.
    fn next_id(prefix: &str) -> String {
        format!("{prefix}_{}", Uuid::new_v4().simple())
    }

    fn charge_report(&self, charge: &SimCharge, now: DateTime<Utc>) -> ChargeStatusReport {
        let paid_at = charge.approved_at.or_else(|| {
            self.settings
                .approve_after
                .map(|delay| charge.created_at + delay)
                .filter(|at| *at <= now && *at <= charge.expires_at)
        });
        match paid_at {
            Some(at) => ChargeStatusReport {
                status: ChargeStatus::Paid,
                paid_at: Some(at),
                paid_amount: Some(charge.amount),
            },
            None if now > charge.expires_at => ChargeStatusReport {
                status: ChargeStatus::Expired,
                paid_at: None,
                paid_amount: None,
            },
            None => ChargeStatusReport::pending(),
        }
    }

    fn payout_report(&self, payout: &SimPayout, now: DateTime<Utc>) -> PayoutStatusReport {
        match &payout.outcome {
            Some(ForcedOutcome::Completed(at)) => PayoutStatusReport {
                status: GatewayPayoutStatus::Completed,
                completed_at: Some(*at),
                failure_reason: None,
            },
            Some(ForcedOutcome::Failed(reason)) => PayoutStatusReport {
                status: GatewayPayoutStatus::Failed,
                completed_at: None,
                failure_reason: Some(reason.clone()),
            },
            None => {
                let settles_at = payout.created_at + self.settings.payout_settle_after;
                if now >= settles_at {
                    PayoutStatusReport {
                        status: GatewayPayoutStatus::Completed,
                        completed_at: Some(settles_at),
                        failure_reason: None,
                    }
                } else {
                    PayoutStatusReport {
                        status: GatewayPayoutStatus::Processing,
                        completed_at: None,
                        failure_reason: None,
                    }
                }
            }
        }
    }

    /// Marks a pending charge as paid now, as if the buyer scanned the QR code.
    pub async fn approve_charge(&self, gateway_id: &str) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let charge = state
            .charges
            .get(gateway_id)
            .cloned()
            .ok_or_else(|| LedgerError::PaymentNotFound(gateway_id.to_string()))?;
        match self.charge_report(&charge, now).status {
            ChargeStatus::Pending => {
                if let Some(stored) = state.charges.get_mut(gateway_id) {
                    stored.approved_at = Some(now);
                }
                Ok(())
            }
            ChargeStatus::Paid => Ok(()),
            other => Err(LedgerError::GatewayRejected(format!(
                "charge {gateway_id} is {other:?}"
            ))),
        }
    }

    pub async fn fail_payout(&self, gateway_id: &str, reason: impl Into<String>) -> Result<()> {
        self.force_payout(gateway_id, ForcedOutcome::Failed(reason.into()))
            .await
    }

    pub async fn complete_payout(&self, gateway_id: &str) -> Result<()> {
        let now = self.clock.now();
        self.force_payout(gateway_id, ForcedOutcome::Completed(now))
            .await
    }

    async fn force_payout(&self, gateway_id: &str, outcome: ForcedOutcome) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let payout = state
            .payouts
            .get(gateway_id)
            .cloned()
            .ok_or_else(|| LedgerError::PayoutNotFound(gateway_id.to_string()))?;
        let current = self.payout_report(&payout, now).status;
        if current != GatewayPayoutStatus::Processing {
            return Err(LedgerError::GatewayRejected(format!(
                "payout {gateway_id} already settled as {current:?}"
            )));
        }
        if let Some(stored) = state.payouts.get_mut(gateway_id) {
            stored.outcome = Some(outcome);
        }
        Ok(())
    }

    /// Builds the signed webhook the processor would send for the charge's current state.
    pub async fn charge_webhook(&self, gateway_id: &str) -> Result<SignedWebhook> {
        let report = self.charge_status(gateway_id).await?;
        let event_type = match report.status {
            ChargeStatus::Paid => WebhookEventType::ChargePaid,
            ChargeStatus::Expired => WebhookEventType::ChargeExpired,
            ChargeStatus::Cancelled => WebhookEventType::ChargeCancelled,
            ChargeStatus::Pending => {
                return Err(LedgerError::ValidationError(format!(
                    "charge {gateway_id} has nothing to report yet"
                )));
            }
        };
        let data = json!({
            "amount": report.paid_amount.map(i64::from),
            "paid_at": report.paid_at,
        });
        self.sign(&event_type, gateway_id, data)
    }

    /// Builds the signed webhook for the payout's current state.
    pub async fn payout_webhook(&self, gateway_id: &str) -> Result<SignedWebhook> {
        let report = self.payout_status(gateway_id).await?;
        let event_type = match report.status {
            GatewayPayoutStatus::Processing => WebhookEventType::PayoutProcessing,
            GatewayPayoutStatus::Completed => WebhookEventType::PayoutCompleted,
            GatewayPayoutStatus::Failed => WebhookEventType::PayoutFailed,
            GatewayPayoutStatus::Pending => {
                return Err(LedgerError::ValidationError(format!(
                    "payout {gateway_id} has nothing to report yet"
                )));
            }
        };
        let data = json!({ "failure_reason": report.failure_reason });
        self.sign(&event_type, gateway_id, data)
    }

    fn sign(
        &self,
        event_type: &WebhookEventType,
        gateway_id: &str,
        data: serde_json::Value,
    ) -> Result<SignedWebhook> {
        // Same state, same event id: redelivery of one event looks exactly like a real retry.
        let event_id = format!("evt_{gateway_id}_{}", event_type.as_str().replace('.', "_"));
        let body = WireEvent::new(event_id, event_type, gateway_id, data, self.clock.now())
            .to_bytes()?;
        let signature = self.signer.sign(&body);
        Ok(SignedWebhook { body, signature })
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn create_charge(&self, request: ChargeRequest) -> Result<Charge> {
        self.ensure_up()?;
        if request.expiry_minutes <= 0 {
            return Err(LedgerError::GatewayRejected(
                "expiry must be positive".to_string(),
            ));
        }
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let existing = state
            .charge_by_external
            .get(&request.external_id)
            .and_then(|id| state.charges.get(id))
            .cloned();
        let charge = match existing {
            Some(charge) => charge,
            None => {
                let charge = SimCharge {
                    gateway_id: Self::next_id("sim_ch"),
                    amount: request.amount,
                    created_at: now,
                    expires_at: now + Duration::minutes(request.expiry_minutes),
                    approved_at: None,
                };
                state
                    .charge_by_external
                    .insert(request.external_id.clone(), charge.gateway_id.clone());
                state
                    .charges
                    .insert(charge.gateway_id.clone(), charge.clone());
                tracing::debug!(gateway_id = %charge.gateway_id, amount = %charge.amount, "Simulated charge created");
                charge
            }
        };

        let qr_text = format!(
            "PIX|{}|{}|{}",
            charge.gateway_id, charge.amount, request.external_id
        );
        Ok(Charge {
            gateway_id: charge.gateway_id.clone(),
            qr_payload: format!("simqr:{}", hex::encode(&qr_text)),
            qr_text,
            expires_at: charge.expires_at,
            status: ChargeStatus::Pending,
        })
    }

    async fn charge_status(&self, gateway_id: &str) -> Result<ChargeStatusReport> {
        self.ensure_up()?;
        let now = self.clock.now();
        let state = self.state.read().await;
        Ok(state
            .charges
            .get(gateway_id)
            .map_or_else(ChargeStatusReport::pending, |charge| {
                self.charge_report(charge, now)
            }))
    }

    async fn create_payout(&self, request: PayoutRequest) -> Result<GatewayPayout> {
        self.ensure_up()?;
        let now = self.clock.now();
        let mut state = self.state.write().await;

        let existing = state
            .payout_by_external
            .get(&request.external_id)
            .and_then(|id| state.payouts.get(id))
            .cloned();
        let payout = match existing {
            Some(payout) => payout,
            None => {
                let payout = SimPayout {
                    gateway_id: Self::next_id("sim_po"),
                    amount: request.amount,
                    created_at: now,
                    outcome: None,
                };
                state
                    .payout_by_external
                    .insert(request.external_id.clone(), payout.gateway_id.clone());
                state
                    .payouts
                    .insert(payout.gateway_id.clone(), payout.clone());
                tracing::debug!(
                    gateway_id = %payout.gateway_id,
                    amount = %payout.amount,
                    payee = %request.payee_ref.masked(),
                    "Simulated payout created"
                );
                payout
            }
        };

        Ok(GatewayPayout {
            gateway_id: payout.gateway_id,
            status: GatewayPayoutStatus::Pending,
            estimated_completion_at: Some(payout.created_at + self.settings.payout_settle_after),
        })
    }

    async fn payout_status(&self, gateway_id: &str) -> Result<PayoutStatusReport> {
        self.ensure_up()?;
        let now = self.clock.now();
        let state = self.state.read().await;
        Ok(state
            .payouts
            .get(gateway_id)
            .map_or_else(PayoutStatusReport::pending, |payout| {
                self.payout_report(payout, now)
            }))
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        self.signer.verify(raw_body, signature_header)
    }

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<WebhookEvent> {
        webhook::parse_event(raw_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::{Clock, ManualClock};
    use crate::domain::payout::PayoutKey;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn setup(settings: SimulatedSettings) -> (Arc<ManualClock>, SimulatedGateway) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        ));
        let gateway = SimulatedGateway::new(clock.clone(), settings, SecretString::from("whsec".to_string()));
        (clock, gateway)
    }

    fn charge_request(external_id: &str) -> ChargeRequest {
        ChargeRequest {
            buyer_ref: "buyer-1".into(),
            amount: Amount::new(2990).unwrap(),
            external_id: external_id.into(),
            expiry_minutes: 60,
        }
    }

    fn payout_request(external_id: &str) -> PayoutRequest {
        PayoutRequest {
            payee_ref: PayoutKey::new("creator@example.com").unwrap(),
            amount: Amount::new(4000).unwrap(),
            external_id: external_id.into(),
        }
    }

    #[tokio::test]
    async fn test_charge_expires_lazily() {
        let (clock, gateway) = setup(SimulatedSettings::default());
        let charge = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        assert_eq!(charge.status, ChargeStatus::Pending);

        clock.advance(Duration::minutes(60));
        let report = gateway.charge_status(&charge.gateway_id).await.unwrap();
        assert_eq!(report.status, ChargeStatus::Pending);

        clock.advance(Duration::minutes(1));
        let report = gateway.charge_status(&charge.gateway_id).await.unwrap();
        assert_eq!(report.status, ChargeStatus::Expired);
    }

    #[tokio::test]
    async fn test_auto_approval_after_delay() {
        let (clock, gateway) = setup(SimulatedSettings {
            approve_after: Some(Duration::seconds(30)),
            ..SimulatedSettings::default()
        });
        let charge = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        assert_eq!(
            gateway.charge_status(&charge.gateway_id).await.unwrap().status,
            ChargeStatus::Pending
        );

        clock.advance(Duration::seconds(30));
        let report = gateway.charge_status(&charge.gateway_id).await.unwrap();
        assert_eq!(report.status, ChargeStatus::Paid);
        assert_eq!(report.paid_amount, Some(Amount::new(2990).unwrap()));
    }

    #[tokio::test]
    async fn test_manual_approval() {
        let (clock, gateway) = setup(SimulatedSettings::default());
        let charge = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        clock.advance(Duration::minutes(5));
        gateway.approve_charge(&charge.gateway_id).await.unwrap();

        let report = gateway.charge_status(&charge.gateway_id).await.unwrap();
        assert_eq!(report.status, ChargeStatus::Paid);
        assert_eq!(report.paid_at, Some(clock.now()));

        // Paid charges stay paid past their expiry.
        clock.advance(Duration::hours(2));
        assert_eq!(
            gateway.charge_status(&charge.gateway_id).await.unwrap().status,
            ChargeStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_expired_charge_cannot_be_approved() {
        let (clock, gateway) = setup(SimulatedSettings::default());
        let charge = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        clock.advance(Duration::minutes(61));
        assert!(matches!(
            gateway.approve_charge(&charge.gateway_id).await,
            Err(LedgerError::GatewayRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_create_charge_deduplicates_on_external_id() {
        let (_, gateway) = setup(SimulatedSettings::default());
        let first = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        let second = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        let other = gateway.create_charge(charge_request("pay-2")).await.unwrap();
        assert_eq!(first.gateway_id, second.gateway_id);
        assert_ne!(first.gateway_id, other.gateway_id);
    }

    #[tokio::test]
    async fn test_unknown_ids_report_pending() {
        let (_, gateway) = setup(SimulatedSettings::default());
        assert_eq!(
            gateway.charge_status("nope").await.unwrap(),
            ChargeStatusReport::pending()
        );
        assert_eq!(
            gateway.payout_status("nope").await.unwrap(),
            PayoutStatusReport::pending()
        );
    }

    #[tokio::test]
    async fn test_payout_settles_after_delay() {
        let (clock, gateway) = setup(SimulatedSettings::default());
        let payout = gateway.create_payout(payout_request("po-1")).await.unwrap();
        assert_eq!(payout.status, GatewayPayoutStatus::Pending);
        assert_eq!(
            gateway.payout_status(&payout.gateway_id).await.unwrap().status,
            GatewayPayoutStatus::Processing
        );

        clock.advance(Duration::minutes(5));
        let report = gateway.payout_status(&payout.gateway_id).await.unwrap();
        assert_eq!(report.status, GatewayPayoutStatus::Completed);
        assert_eq!(report.completed_at, payout.estimated_completion_at);
    }

    #[tokio::test]
    async fn test_forced_payout_failure() {
        let (clock, gateway) = setup(SimulatedSettings::default());
        let payout = gateway.create_payout(payout_request("po-1")).await.unwrap();
        gateway
            .fail_payout(&payout.gateway_id, "invalid key")
            .await
            .unwrap();

        clock.advance(Duration::hours(1));
        let report = gateway.payout_status(&payout.gateway_id).await.unwrap();
        assert_eq!(report.status, GatewayPayoutStatus::Failed);
        assert_eq!(report.failure_reason.as_deref(), Some("invalid key"));

        assert!(gateway.complete_payout(&payout.gateway_id).await.is_err());
    }

    #[tokio::test]
    async fn test_outage_switch() {
        let (_, gateway) = setup(SimulatedSettings::default());
        gateway.set_available(false);
        assert!(matches!(
            gateway.create_charge(charge_request("pay-1")).await,
            Err(LedgerError::GatewayUnavailable(_))
        ));
        assert!(gateway.charge_status("x").await.unwrap_err().is_retryable());

        gateway.set_available(true);
        assert!(gateway.create_charge(charge_request("pay-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_signed_webhook_verifies_and_parses() {
        let (_, gateway) = setup(SimulatedSettings::default());
        let charge = gateway.create_charge(charge_request("pay-1")).await.unwrap();
        assert!(gateway.charge_webhook(&charge.gateway_id).await.is_err());

        gateway.approve_charge(&charge.gateway_id).await.unwrap();
        let webhook = gateway.charge_webhook(&charge.gateway_id).await.unwrap();
        assert!(gateway.verify_webhook_signature(&webhook.body, &webhook.signature));

        let event = gateway.parse_webhook_event(&webhook.body).unwrap();
        assert_eq!(event.event_type, WebhookEventType::ChargePaid);
        assert_eq!(event.gateway_id, charge.gateway_id);
        assert_eq!(
            event.charge_report().unwrap().paid_amount,
            Some(Amount::new(2990).unwrap())
        );

        let again = gateway.charge_webhook(&charge.gateway_id).await.unwrap();
        let again = gateway.parse_webhook_event(&again.body).unwrap();
        assert_eq!(again.event_id, event.event_id);
    }
}
