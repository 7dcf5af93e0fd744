use super::webhook::{self, WebhookSigner};
use crate::domain::gateway::{
    Charge, ChargeRequest, ChargeStatus, ChargeStatusReport, GatewayPayout, GatewayPayoutStatus,
    PaymentGateway, PayoutRequest, PayoutStatusReport, WebhookEvent,
};
use crate::domain::money::Amount;
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Connection settings of a JSON REST processor.
#[derive(Clone)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub webhook_secret: SecretString,
    pub timeout: Duration,
}

/// Adapter for a real processor speaking a small JSON REST dialect.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    signer: WebhookSigner,
}

#[derive(Serialize)]
struct CreateChargeBody<'a> {
    buyer_ref: &'a str,
    amount: i64,
    external_id: &'a str,
    expiry_minutes: i64,
}

#[derive(Deserialize)]
struct ChargeResponse {
    id: String,
    qr_payload: String,
    qr_text: String,
    expires_at: DateTime<Utc>,
    #[serde(default = "pending_charge")]
    status: ChargeStatus,
}

fn pending_charge() -> ChargeStatus {
    ChargeStatus::Pending
}

#[derive(Deserialize)]
struct ChargeStatusResponse {
    status: ChargeStatus,
    paid_at: Option<DateTime<Utc>>,
    paid_amount: Option<i64>,
}

#[derive(Serialize)]
struct CreatePayoutBody<'a> {
    payee_ref: &'a str,
    amount: i64,
    external_id: &'a str,
}

#[derive(Deserialize)]
struct PayoutResponse {
    id: String,
    #[serde(default = "pending_payout")]
    status: GatewayPayoutStatus,
    estimated_completion_at: Option<DateTime<Utc>>,
}

fn pending_payout() -> GatewayPayoutStatus {
    GatewayPayoutStatus::Pending
}

#[derive(Deserialize)]
struct PayoutStatusResponse {
    status: GatewayPayoutStatus,
    completed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl HttpGateway {
    pub fn new(config: HttpGatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LedgerError::Config(format!("Cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            signer: WebhookSigner::new(config.webhook_secret),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<Response> {
        self.client
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(transport_error)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T, idempotency_key: &str) -> Result<Response> {
        self.client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> LedgerError {
    LedgerError::GatewayUnavailable(err.to_string())
}

/// 5xx and 429 are worth retrying; any other non-success status is final.
async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| LedgerError::GatewayUnavailable(format!("Unreadable gateway response: {e}")));
    }
    let text = response.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(LedgerError::GatewayUnavailable(format!("{status}: {text}")))
    } else {
        Err(LedgerError::GatewayRejected(format!("{status}: {text}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_charge(&self, request: ChargeRequest) -> Result<Charge> {
        let body = CreateChargeBody {
            buyer_ref: &request.buyer_ref,
            amount: request.amount.value(),
            external_id: &request.external_id,
            expiry_minutes: request.expiry_minutes,
        };
        let response = self.post("/charges", &body, &request.external_id).await?;
        let charge: ChargeResponse = json_body(response).await?;
        Ok(Charge {
            gateway_id: charge.id,
            qr_payload: charge.qr_payload,
            qr_text: charge.qr_text,
            expires_at: charge.expires_at,
            status: charge.status,
        })
    }

    async fn charge_status(&self, gateway_id: &str) -> Result<ChargeStatusReport> {
        let response = self.get(&format!("/charges/{gateway_id}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ChargeStatusReport::pending());
        }
        let report: ChargeStatusResponse = json_body(response).await?;
        Ok(ChargeStatusReport {
            status: report.status,
            paid_at: report.paid_at,
            paid_amount: report.paid_amount.and_then(|v| Amount::new(v).ok()),
        })
    }

    async fn create_payout(&self, request: PayoutRequest) -> Result<GatewayPayout> {
        let body = CreatePayoutBody {
            payee_ref: request.payee_ref.expose(),
            amount: request.amount.value(),
            external_id: &request.external_id,
        };
        let response = self.post("/payouts", &body, &request.external_id).await?;
        let payout: PayoutResponse = json_body(response).await?;
        Ok(GatewayPayout {
            gateway_id: payout.id,
            status: payout.status,
            estimated_completion_at: payout.estimated_completion_at,
        })
    }

    async fn payout_status(&self, gateway_id: &str) -> Result<PayoutStatusReport> {
        let response = self.get(&format!("/payouts/{gateway_id}")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(PayoutStatusReport::pending());
        }
        let report: PayoutStatusResponse = json_body(response).await?;
        Ok(PayoutStatusReport {
            status: report.status,
            completed_at: report.completed_at,
            failure_reason: report.failure_reason,
        })
    }

    fn verify_webhook_signature(&self, raw_body: &[u8], signature_header: &str) -> bool {
        self.signer.verify(raw_body, signature_header)
    }

    fn parse_webhook_event(&self, raw_body: &[u8]) -> Result<WebhookEvent> {
        webhook::parse_event(raw_body)
    }
}
