pub mod context;
pub mod engine;
pub mod locks;
pub mod payments;
pub mod payouts;
pub mod reconcile;
pub mod release;
pub mod report;
pub mod retry;
pub mod wallets;
pub mod webhooks;
