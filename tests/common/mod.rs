#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use pixledger::application::engine::{Collaborators, PaymentEngine};
use pixledger::application::retry::RetryPolicy;
use pixledger::application::wallets::WalletSummary;
use pixledger::config::LedgerPolicy;
use pixledger::domain::clock::ManualClock;
use pixledger::domain::ids::{PaymentId, WalletId};
use pixledger::domain::money::Amount;
use pixledger::domain::payout::PayoutKey;
use pixledger::domain::ports::{CreatorProfile, PackListing};
use pixledger::infrastructure::directory::{LogNotifier, StaticDirectory};
use pixledger::infrastructure::gateway::{SimulatedGateway, SimulatedSettings};
use pixledger::infrastructure::in_memory::InMemoryStore;
use secrecy::SecretString;
use std::sync::Arc;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const BUYER: &str = "buyer-1";
pub const CREATOR: &str = "creator-1";
/// The account the creator signs in with.
pub const CREATOR_USER: &str = "user-maria";
pub const PACK: &str = "pack-1";
pub const PACK_PRICE: i64 = 2990;
/// 2990 minus 13.99% (418.3 rounded to 418).
pub const PACK_EARNINGS: i64 = 2572;
pub const BIG_PACK: &str = "pack-big";
pub const BIG_PACK_PRICE: i64 = 5000;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn directory() -> StaticDirectory {
    let creator = WalletId::new(CREATOR);
    StaticDirectory::new()
        .with_pack(PackListing {
            pack_id: PACK.to_string(),
            creator_id: creator.clone(),
            title: "Sunset presets".to_string(),
            price: Amount::new(PACK_PRICE).unwrap(),
        })
        .with_pack(PackListing {
            pack_id: BIG_PACK.to_string(),
            creator_id: creator.clone(),
            title: "Full collection".to_string(),
            price: Amount::new(BIG_PACK_PRICE).unwrap(),
        })
        .with_creator(
            CREATOR_USER,
            CreatorProfile {
                creator_id: creator,
                payout_key: PayoutKey::new("maria@example.com").unwrap(),
            },
        )
}

pub fn test_policy() -> LedgerPolicy {
    LedgerPolicy {
        retry: RetryPolicy::none(),
        ..LedgerPolicy::default()
    }
}

/// An engine over an in-memory store, a simulated gateway and a manual clock.
pub struct Harness {
    pub engine: PaymentEngine,
    pub gateway: Arc<SimulatedGateway>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(test_policy())
    }

    pub fn with_policy(policy: LedgerPolicy) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        Self::over(Arc::new(InMemoryStore::new()), clock, policy)
    }

    /// A fresh gateway and engine over existing state, as after a process restart.
    pub fn restarted(&self) -> Self {
        Self::over(self.store.clone(), self.clock.clone(), test_policy())
    }

    fn over(store: Arc<InMemoryStore>, clock: Arc<ManualClock>, policy: LedgerPolicy) -> Self {
        let gateway = Arc::new(SimulatedGateway::new(
            clock.clone(),
            SimulatedSettings::default(),
            SecretString::from(WEBHOOK_SECRET.to_string()),
        ));
        let directory = Arc::new(directory());
        let engine = PaymentEngine::new(
            store.clone(),
            gateway.clone(),
            clock.clone(),
            policy,
            Collaborators {
                catalog: directory.clone(),
                directory,
                notifier: Arc::new(LogNotifier),
            },
        );
        Self {
            engine,
            gateway,
            clock,
            store,
        }
    }

    pub fn creator(&self) -> WalletId {
        WalletId::new(CREATOR)
    }

    pub async fn checkout(&self, pack: &str) -> PaymentId {
        self.engine
            .payments()
            .create_checkout(BUYER, pack)
            .await
            .unwrap()
            .payment_id
    }

    pub async fn gateway_id(&self, id: PaymentId) -> String {
        self.engine.payments().payment(id).await.unwrap().gateway_id
    }

    /// The buyer scans the QR code; the ledger has not heard about it yet.
    pub async fn buyer_pays(&self, id: PaymentId) {
        let gateway_id = self.gateway_id(id).await;
        self.gateway.approve_charge(&gateway_id).await.unwrap();
    }

    /// Checkout, payment and the ledger picking it up through a poll.
    pub async fn paid_sale(&self, pack: &str) -> PaymentId {
        let id = self.checkout(pack).await;
        self.buyer_pays(id).await;
        self.engine.payments().sync_payment(id).await.unwrap();
        id
    }

    /// A paid sale whose holding period is over and whose earnings were released.
    pub async fn released_sale(&self, pack: &str) -> PaymentId {
        let id = self.paid_sale(pack).await;
        self.clock.advance(Duration::days(14));
        assert!(self.engine.release_job().release(id).await.unwrap());
        id
    }

    pub async fn summary(&self) -> WalletSummary {
        self.engine.wallets().summary(&self.creator()).await.unwrap()
    }
}
