use super::context::LedgerContext;
use super::payments::{PaymentOrchestrator, PaymentOutcome};
use super::payouts::PayoutOrchestrator;
use crate::domain::gateway::WebhookEvent;
use crate::error::{LedgerError, Result};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// The event id was seen before, or its effect is already in place.
    AlreadyProcessed,
    /// Valid event with nothing to do, e.g. an unknown event type.
    Ignored,
}

impl From<PaymentOutcome> for WebhookOutcome {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Applied => Self::Applied,
            PaymentOutcome::AlreadyApplied => Self::AlreadyProcessed,
            PaymentOutcome::Ignored => Self::Ignored,
        }
    }
}

/// Entry point for gateway push notifications.
#[derive(Clone)]
pub struct WebhookProcessor {
    ctx: LedgerContext,
    payments: PaymentOrchestrator,
    payouts: PayoutOrchestrator,
}

impl WebhookProcessor {
    pub fn new(ctx: LedgerContext, payments: PaymentOrchestrator, payouts: PayoutOrchestrator) -> Self {
        Self {
            ctx,
            payments,
            payouts,
        }
    }

    /// Verifies, parses and routes one delivery. The signature is checked before
    /// the body is looked at.
    pub async fn handle(&self, raw_body: &[u8], signature: &str) -> Result<WebhookOutcome> {
        if !self.ctx.gateway.verify_webhook_signature(raw_body, signature) {
            tracing::warn!(gateway = self.ctx.gateway.name(), "Webhook with bad signature rejected");
            return Err(LedgerError::InvalidWebhookSignature);
        }
        let event = self.ctx.gateway.parse_webhook_event(raw_body)?;
        let span = tracing::info_span!(
            "webhook",
            event_id = %event.event_id,
            event_type = event.event_type.as_str(),
            gateway_id = %event.gateway_id
        );
        self.route(event).instrument(span).await
    }

    async fn route(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        if self.ctx.store.is_processed(&event.event_id).await? {
            tracing::info!("Duplicate webhook delivery");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        if let Some(report) = event.charge_report() {
            let payment = self
                .ctx
                .store
                .payment_by_gateway_id(&event.gateway_id)
                .await?
                .ok_or_else(|| LedgerError::PaymentNotFound(event.gateway_id.clone()))?;
            let outcome = self
                .payments
                .apply_charge_report(payment.id, report, Some(&event.event_id))
                .await?;
            return Ok(outcome.into());
        }

        if let Some(report) = event.payout_report() {
            let payout = self
                .ctx
                .store
                .payout_by_gateway_id(&event.gateway_id)
                .await?
                .ok_or_else(|| LedgerError::PayoutNotFound(event.gateway_id.clone()))?;
            let outcome = self
                .payouts
                .apply_payout_report(payout.id, &event.gateway_id, report, Some(&event.event_id))
                .await?;
            return Ok(outcome.into());
        }

        tracing::info!("Unhandled webhook event type");
        Ok(WebhookOutcome::Ignored)
    }
}
