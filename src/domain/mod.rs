//! Domain layer: value objects, entities, state machines and the ports the
//! application layer talks through.

pub mod clock;
pub mod fees;
pub mod gateway;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod payment;
pub mod payout;
pub mod ports;
pub mod wallet;
