use super::money::{Amount, Balance};
use crate::error::{LedgerError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Gateway and platform fee percentages applied to every sale.
///
/// Percentages are kept as `Decimal` so a configured `5.99` stays exactly `5.99`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    gateway_fee_pct: Decimal,
    platform_fee_pct: Decimal,
}

/// Outcome of splitting a gross sale amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Amount,
    pub fee: Balance,
    pub creator_earnings: Amount,
}

impl FeeSchedule {
    pub fn new(gateway_fee_pct: Decimal, platform_fee_pct: Decimal) -> Result<Self> {
        if gateway_fee_pct < Decimal::ZERO || platform_fee_pct < Decimal::ZERO {
            return Err(LedgerError::Config(
                "Fee percentages cannot be negative".to_string(),
            ));
        }
        if gateway_fee_pct + platform_fee_pct >= dec!(100) {
            return Err(LedgerError::Config(format!(
                "Combined fees must stay below 100%, got {}%",
                gateway_fee_pct + platform_fee_pct
            )));
        }
        Ok(Self {
            gateway_fee_pct,
            platform_fee_pct,
        })
    }

    /// A schedule that keeps the whole gross amount for the creator.
    pub fn free() -> Self {
        Self {
            gateway_fee_pct: Decimal::ZERO,
            platform_fee_pct: Decimal::ZERO,
        }
    }

    pub fn gateway_fee_pct(&self) -> Decimal {
        self.gateway_fee_pct
    }

    pub fn platform_fee_pct(&self) -> Decimal {
        self.platform_fee_pct
    }

    pub fn total_fee_pct(&self) -> Decimal {
        self.gateway_fee_pct + self.platform_fee_pct
    }

    /// Splits `gross` into the fee and the creator's earnings.
    ///
    /// The fee is rounded once, half away from zero, and the earnings are always
    /// `gross - fee` so the two parts add back up to the gross amount.
    pub fn split(&self, gross: Amount) -> Result<FeeSplit> {
        let raw = Decimal::from(gross.value()) * self.total_fee_pct() / dec!(100);
        let fee = raw
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("Fee for {gross} does not fit in i64"))
            })?;
        let creator_earnings = Amount::new(gross.value() - fee).map_err(|_| {
            LedgerError::ValidationError(format!(
                "Gross amount {gross} leaves nothing for the creator after fees"
            ))
        })?;
        Ok(FeeSplit {
            gross,
            fee: Balance::new(fee),
            creator_earnings,
        })
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            gateway_fee_pct: dec!(5.99),
            platform_fee_pct: dec!(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_split() {
        let split = FeeSchedule::default()
            .split(Amount::new(2990).unwrap())
            .unwrap();
        // 2990 * 13.99% = 418.301
        assert_eq!(split.fee, Balance::new(418));
        assert_eq!(split.creator_earnings, Amount::new(2572).unwrap());
    }

    #[test]
    fn test_fee_rounds_half_up() {
        let schedule = FeeSchedule::new(dec!(2.5), dec!(0)).unwrap();
        // 100 * 2.5% = 2.5 -> 3
        let split = schedule.split(Amount::new(100).unwrap()).unwrap();
        assert_eq!(split.fee, Balance::new(3));
        assert_eq!(split.creator_earnings, Amount::new(97).unwrap());
    }

    #[test]
    fn test_parts_always_add_up() {
        let schedule = FeeSchedule::default();
        for gross in [1, 7, 99, 2990, 10_001, 123_457] {
            let split = schedule.split(Amount::new(gross).unwrap()).unwrap();
            assert_eq!(split.fee.value() + split.creator_earnings.value(), gross);
        }
    }

    #[test]
    fn test_free_schedule_keeps_everything() {
        let split = FeeSchedule::free().split(Amount::new(5000).unwrap()).unwrap();
        assert_eq!(split.fee, Balance::ZERO);
        assert_eq!(split.creator_earnings, Amount::new(5000).unwrap());
    }

    #[test]
    fn test_invalid_schedules() {
        assert!(matches!(
            FeeSchedule::new(dec!(-1), dec!(8)),
            Err(LedgerError::Config(_))
        ));
        assert!(matches!(
            FeeSchedule::new(dec!(60), dec!(40)),
            Err(LedgerError::Config(_))
        ));
    }
}
