// nexus_gateway/src/risk/mod.rs
//
// The pre-trade Guardian.
//
// This is the last line of defense before a mutation is considered
// "live": every NewOrder, DeleteOrder, ModifyOrderQuantity and Trade
// passes through one of the `evaluate_*` entry points before the
// connection layer commits it to trader state. A rejection never
// mutates `ProductInfo` — acceptance and commit are the same step.

use crate::types::{Order, Side};
use std::collections::BTreeMap;

/// Per-listing hypothetical exposure state.
///
/// `net_pos` is signed: the source this gateway is modeled on stored it
/// unsigned, which underflows the moment a trader sells without a prior
/// long. Every other field is a non-negative resting-order quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProductInfo {
    pub net_pos: i64,
    pub buy_qty: u64,
    pub sell_qty: u64,
    pub hyp_max_buy: u64,
    pub hyp_max_sell: u64,
}

impl ProductInfo {
    /// Recompute `hyp_max_buy`/`hyp_max_sell` from `buy_qty`/`sell_qty`/`net_pos`.
    fn recompute_hyp_max(&mut self) {
        let net = self.net_pos as i128;
        let buy = self.buy_qty as i128;
        let sell = self.sell_qty as i128;
        self.hyp_max_buy = buy.max(net + buy).max(0) as u64;
        self.hyp_max_sell = sell.max(sell - net).max(0) as u64;
    }
}

/// Per-instrument buy/sell exposure caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskLimits {
    pub buy_limit: u64,
    pub sell_limit: u64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            buy_limit: 100,
            sell_limit: 100,
        }
    }
}

/// Why a mutation was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskReject {
    BuyLimitExceeded { hyp_max_buy: u64, buy_limit: u64 },
    SellLimitExceeded { hyp_max_sell: u64, sell_limit: u64 },
    Overflow,
    TradeExceedsOrder { trade_quantity: u64, order_quantity: u64 },
}

/// The outcome of a risk evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(RiskReject),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// Checks the shared acceptance predicate (I3): reject if either leg's
/// hypothetical worst position exceeds its configured limit.
fn check_limits(p: &ProductInfo, limits: &RiskLimits) -> Option<RiskReject> {
    if p.hyp_max_buy > limits.buy_limit {
        Some(RiskReject::BuyLimitExceeded {
            hyp_max_buy: p.hyp_max_buy,
            buy_limit: limits.buy_limit,
        })
    } else if p.hyp_max_sell > limits.sell_limit {
        Some(RiskReject::SellLimitExceeded {
            hyp_max_sell: p.hyp_max_sell,
            sell_limit: limits.sell_limit,
        })
    } else {
        None
    }
}

/// Owns per-listing exposure state and the configured risk limits.
/// Shared across all connections; mutated only from the reactor thread.
pub struct RiskEngine {
    products: BTreeMap<u64, ProductInfo>,
    limits: RiskLimits,
}

impl RiskEngine {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            products: BTreeMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> RiskLimits {
        self.limits
    }

    /// Read-only view of a listing's current exposure, if any order has
    /// ever touched it.
    pub fn product(&self, listing_id: u64) -> Option<&ProductInfo> {
        self.products.get(&listing_id)
    }

    // -------------------------------------------------------------------
    // NewOrder
    // -------------------------------------------------------------------

    pub fn evaluate_new(&mut self, listing_id: u64, side: Side, quantity: u64) -> Decision {
        let mut tentative = self.products.get(&listing_id).copied().unwrap_or_default();

        let updated = match side {
            Side::Buy => tentative.buy_qty.checked_add(quantity),
            Side::Sell => tentative.sell_qty.checked_add(quantity),
        };
        let Some(updated) = updated else {
            return Decision::Rejected(RiskReject::Overflow);
        };
        match side {
            Side::Buy => tentative.buy_qty = updated,
            Side::Sell => tentative.sell_qty = updated,
        }
        tentative.recompute_hyp_max();

        if let Some(reject) = check_limits(&tentative, &self.limits) {
            return Decision::Rejected(reject);
        }
        self.products.insert(listing_id, tentative);
        Decision::Accepted
    }

    // -------------------------------------------------------------------
    // DeleteOrder
    // -------------------------------------------------------------------

    pub fn evaluate_delete(&mut self, order: &Order) -> Decision {
        let mut tentative = self
            .products
            .get(&order.listing_id)
            .copied()
            .unwrap_or_default();

        let updated = match order.side {
            Side::Buy => tentative.buy_qty.checked_sub(order.quantity),
            Side::Sell => tentative.sell_qty.checked_sub(order.quantity),
        };
        let Some(updated) = updated else {
            return Decision::Rejected(RiskReject::Overflow);
        };
        match order.side {
            Side::Buy => tentative.buy_qty = updated,
            Side::Sell => tentative.sell_qty = updated,
        }
        tentative.recompute_hyp_max();

        if let Some(reject) = check_limits(&tentative, &self.limits) {
            return Decision::Rejected(reject);
        }
        self.products.insert(order.listing_id, tentative);
        Decision::Accepted
    }

    // -------------------------------------------------------------------
    // ModifyOrderQuantity
    // -------------------------------------------------------------------

    /// Equivalent to deleting `order.quantity` and adding `new_quantity`
    /// on the same side, atomically.
    pub fn evaluate_modify(&mut self, order: &Order, new_quantity: u64) -> Decision {
        let mut tentative = self
            .products
            .get(&order.listing_id)
            .copied()
            .unwrap_or_default();

        let side_qty = match order.side {
            Side::Buy => &mut tentative.buy_qty,
            Side::Sell => &mut tentative.sell_qty,
        };
        let Some(removed) = side_qty.checked_sub(order.quantity) else {
            return Decision::Rejected(RiskReject::Overflow);
        };
        let Some(added) = removed.checked_add(new_quantity) else {
            return Decision::Rejected(RiskReject::Overflow);
        };
        *side_qty = added;
        tentative.recompute_hyp_max();

        if let Some(reject) = check_limits(&tentative, &self.limits) {
            return Decision::Rejected(reject);
        }
        self.products.insert(order.listing_id, tentative);
        Decision::Accepted
    }

    // -------------------------------------------------------------------
    // Trade
    // -------------------------------------------------------------------

    pub fn evaluate_trade(&mut self, order: &Order, trade_quantity: u64) -> Decision {
        if trade_quantity > order.quantity {
            return Decision::Rejected(RiskReject::TradeExceedsOrder {
                trade_quantity,
                order_quantity: order.quantity,
            });
        }

        let mut tentative = self
            .products
            .get(&order.listing_id)
            .copied()
            .unwrap_or_default();

        let signed_qty = trade_quantity as i64 * order.side.sign();
        let Some(new_net_pos) = tentative.net_pos.checked_add(signed_qty) else {
            return Decision::Rejected(RiskReject::Overflow);
        };

        let side_qty = match order.side {
            Side::Buy => &mut tentative.buy_qty,
            Side::Sell => &mut tentative.sell_qty,
        };
        let Some(reduced) = side_qty.checked_sub(trade_quantity) else {
            return Decision::Rejected(RiskReject::Overflow);
        };
        *side_qty = reduced;
        tentative.net_pos = new_net_pos;
        tentative.recompute_hyp_max();

        if let Some(reject) = check_limits(&tentative, &self.limits) {
            return Decision::Rejected(reject);
        }
        self.products.insert(order.listing_id, tentative);
        Decision::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Price;

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskLimits {
            buy_limit: 100,
            sell_limit: 100,
        })
    }

    // --- NewOrder tests ---

    #[test]
    fn test_new_order_accepted_within_limit() {
        let mut e = engine();
        let d = e.evaluate_new(1, Side::Buy, 60);
        assert_eq!(d, Decision::Accepted);
        let p = e.product(1).unwrap();
        assert_eq!(p.buy_qty, 60);
        assert_eq!(p.hyp_max_buy, 60);
    }

    #[test]
    fn test_new_order_rejected_over_limit_leaves_state_unchanged() {
        let mut e = engine();
        e.evaluate_new(1, Side::Buy, 60);
        let before = *e.product(1).unwrap();
        let d = e.evaluate_new(1, Side::Buy, 50);
        assert!(matches!(d, Decision::Rejected(RiskReject::BuyLimitExceeded { .. })));
        assert_eq!(*e.product(1).unwrap(), before);
    }

    #[test]
    fn test_new_order_opposite_side_independent() {
        let mut e = engine();
        e.evaluate_new(1, Side::Buy, 60);
        let d = e.evaluate_new(1, Side::Sell, 40);
        assert_eq!(d, Decision::Accepted);
        let p = e.product(1).unwrap();
        assert_eq!(p.sell_qty, 40);
        assert_eq!(p.hyp_max_sell, 40);
    }

    // --- DeleteOrder tests ---

    #[test]
    fn test_delete_order_reduces_exposure() {
        let mut e = engine();
        e.evaluate_new(1, Side::Sell, 40);
        let order = Order::new(12, 1, 40, Price::new(0), Side::Sell);
        let d = e.evaluate_delete(&order);
        assert_eq!(d, Decision::Accepted);
        let p = e.product(1).unwrap();
        assert_eq!(p.sell_qty, 0);
        assert_eq!(p.hyp_max_sell, 0);
    }

    // --- Trade tests ---

    #[test]
    fn test_trade_exceeding_order_quantity_rejected() {
        let mut e = engine();
        e.evaluate_new(1, Side::Buy, 60);
        let order = Order::new(10, 1, 60, Price::new(0), Side::Buy);
        let d = e.evaluate_trade(&order, 61);
        assert!(matches!(
            d,
            Decision::Rejected(RiskReject::TradeExceedsOrder { .. })
        ));
    }

    #[test]
    fn test_trade_updates_net_pos_and_resting_qty() {
        let mut e = engine();
        e.evaluate_new(1, Side::Buy, 60);
        let order = Order::new(10, 1, 60, Price::new(0), Side::Buy);
        let d = e.evaluate_trade(&order, 60);
        assert_eq!(d, Decision::Accepted);
        let p = e.product(1).unwrap();
        assert_eq!(p.net_pos, 60);
        assert_eq!(p.buy_qty, 0);
    }

    // --- Idempotence / monotonicity ---

    #[test]
    fn test_risk_monotonicity_accept_never_decreases_hyp_totals() {
        let mut e = engine();
        e.evaluate_new(1, Side::Buy, 10);
        let before = *e.product(1).unwrap();
        e.evaluate_new(1, Side::Buy, 20);
        let after = *e.product(1).unwrap();
        assert!(after.hyp_max_buy + after.hyp_max_sell >= before.hyp_max_buy + before.hyp_max_sell);
    }

    #[test]
    fn test_scenario_walkthrough_from_spec() {
        let mut e = engine();
        assert_eq!(e.evaluate_new(1, Side::Buy, 60), Decision::Accepted);
        assert_eq!(e.product(1).unwrap().hyp_max_buy, 60);

        assert!(matches!(
            e.evaluate_new(1, Side::Buy, 50),
            Decision::Rejected(RiskReject::BuyLimitExceeded { .. })
        ));

        assert_eq!(e.evaluate_new(1, Side::Sell, 40), Decision::Accepted);
        assert_eq!(e.product(1).unwrap().sell_qty, 40);

        let order12 = Order::new(12, 1, 40, Price::new(0), Side::Sell);
        assert_eq!(e.evaluate_delete(&order12), Decision::Accepted);
        assert_eq!(e.product(1).unwrap().sell_qty, 0);
    }
}
