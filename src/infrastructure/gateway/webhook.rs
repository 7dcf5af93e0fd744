//! Webhook signing and the JSON envelope shared by the gateway adapters.

use crate::domain::gateway::{WebhookEvent, WebhookEventType};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header the gateway puts the signature in.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// HMAC-SHA256 over the raw request body, hex encoded.
#[derive(Clone)]
pub struct WebhookSigner {
    secret: SecretString,
}

impl WebhookSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take any size key");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Accepts either the bare hex digest or `sha256=<hex>`.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> bool {
        let provided = signature_header.trim();
        let provided = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);
        let expected = self.sign(payload);
        constant_time_compare(provided.as_bytes(), expected.as_bytes())
    }
}

/// Length check first, then a full XOR fold so the time spent does not depend
/// on where the first mismatching byte is.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

/// The event envelope as it travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WireEvent {
    pub fn new(
        id: impl Into<String>,
        event_type: &WebhookEventType,
        gateway_id: &str,
        mut data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        if let Some(object) = data.as_object_mut() {
            object.insert("gateway_id".into(), gateway_id.into());
        } else {
            data = serde_json::json!({ "gateway_id": gateway_id });
        }
        Self {
            id: id.into(),
            event_type: event_type.as_str().to_string(),
            created_at,
            data,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub fn parse_event(raw_body: &[u8]) -> Result<WebhookEvent> {
    let wire: WireEvent = serde_json::from_slice(raw_body)
        .map_err(|e| LedgerError::InvalidWebhookPayload(e.to_string()))?;

    if wire.id.trim().is_empty() {
        return Err(LedgerError::InvalidWebhookPayload(
            "Event id is empty".to_string(),
        ));
    }
    let gateway_id = wire
        .data
        .get("gateway_id")
        .and_then(serde_json::Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            LedgerError::InvalidWebhookPayload("Event data carries no gateway_id".to_string())
        })?
        .to_string();

    Ok(WebhookEvent {
        event_type: WebhookEventType::parse(&wire.event_type),
        gateway_id,
        event_id: wire.id,
        payload: wire.data,
        timestamp: wire.created_at,
    })
}
