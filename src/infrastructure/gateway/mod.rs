pub mod http;
pub mod simulated;
pub mod webhook;

pub use http::{HttpGateway, HttpGatewayConfig};
pub use simulated::{SignedWebhook, SimulatedGateway, SimulatedSettings};
pub use webhook::{SIGNATURE_HEADER, WebhookSigner};
