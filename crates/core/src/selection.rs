//! Which liquidatable accounts go into a batch.

use keeper_chain::SuiAddress;

use crate::market::Market;

/// Chooses the accounts to liquidate from those the market reports as liquidatable.
pub trait LiquidationPolicy: Send + Sync + std::fmt::Debug {
    fn select(&self, market: &Market, candidates: Vec<SuiAddress>) -> Vec<SuiAddress>;
}

/// Liquidate everything, in candidate order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAll;

impl LiquidationPolicy for ProcessAll {
    fn select(&self, _market: &Market, candidates: Vec<SuiAddress>) -> Vec<SuiAddress> {
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_market;

    #[test]
    fn test_process_all_keeps_order() {
        let candidates: Vec<_> = (1..=4u8).map(|i| SuiAddress::new([i; 32])).collect();
        assert_eq!(ProcessAll.select(&sample_market(), candidates.clone()), candidates);
    }
}
