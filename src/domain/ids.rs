use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    LedgerError::ValidationError(format!(
                        "Invalid {} '{}': {}",
                        stringify!($name),
                        s,
                        e
                    ))
                })
            }
        }
    };
}

uuid_id!(
    /// Identifies a purchase attempt. Also sent to the gateway as the charge's external id.
    PaymentId
);
uuid_id!(
    /// Identifies a withdrawal request. Also sent to the gateway as the payout's external id.
    PayoutId
);
uuid_id!(EntryId);
uuid_id!(ReconciliationRunId);

/// A wallet is keyed by its owner: the creator id, or the platform revenue account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub String);

impl WalletId {
    const PLATFORM: &'static str = "platform";

    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    /// The wallet that collects platform fees.
    pub fn platform() -> Self {
        Self(Self::PLATFORM.to_string())
    }

    pub fn is_platform(&self) -> bool {
        self.0 == Self::PLATFORM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletId {
    fn from(owner: &str) -> Self {
        Self::new(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_round_trip_through_strings() {
        let id = PaymentId::new();
        let parsed: PaymentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<PayoutId>().is_err());
    }

    #[test]
    fn test_platform_wallet() {
        assert!(WalletId::platform().is_platform());
        assert!(!WalletId::new("creator-1").is_platform());
    }
}
