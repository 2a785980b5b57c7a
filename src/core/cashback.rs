//! Cashback computation
//!
//! A pure function of the transfer amount. The result is recorded on the
//! transaction as informational metadata and never credited to a balance.

use crate::types::MinorUnits;
use rust_decimal::Decimal;

/// Tiered cashback rules
///
/// - exact multiples of `no_cashback_multiple` earn nothing
/// - amounts below `tier_threshold` earn `low_tier_rate`
/// - everything else earns `high_tier_rate`
#[derive(Debug, Clone, PartialEq)]
pub struct CashbackPolicy {
    pub no_cashback_multiple: MinorUnits,
    pub tier_threshold: MinorUnits,
    pub low_tier_rate: Decimal,
    pub high_tier_rate: Decimal,
}

impl Default for CashbackPolicy {
    fn default() -> Self {
        Self {
            no_cashback_multiple: 500,
            tier_threshold: 1000,
            low_tier_rate: Decimal::new(5, 2),
            high_tier_rate: Decimal::new(2, 2),
        }
    }
}

impl CashbackPolicy {
    /// Cashback earned by a transfer of `amount`
    pub fn compute(&self, amount: MinorUnits) -> Decimal {
        if self.no_cashback_multiple != 0 && amount % self.no_cashback_multiple == 0 {
            return Decimal::ZERO;
        }

        let rate = self.rate_for(amount);
        (Decimal::from(amount) * rate).normalize()
    }

    /// The rate applied to `amount`, ignoring the no-cashback rule
    pub fn rate_for(&self, amount: MinorUnits) -> Decimal {
        if amount < self.tier_threshold {
            self.low_tier_rate
        } else {
            self.high_tier_rate
        }
    }
}
