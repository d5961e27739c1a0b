// nexus_gateway/src/types/order.rs
//
// The in-memory representation of a resting order, shared between the
// risk engine and per-connection trader state.

use crate::types::{Price, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub order_id: u64,
    pub listing_id: u64,
    pub quantity: u64,
    pub price: Price,
    pub side: Side,
}

impl Order {
    pub fn new(order_id: u64, listing_id: u64, quantity: u64, price: Price, side: Side) -> Self {
        Self {
            order_id,
            listing_id,
            quantity,
            price,
            side,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_carries_fixed_point_price() {
        let order = Order::new(1, 2, 60, Price::new(1_000_000), Side::Buy);
        assert_eq!(order.price.to_float(), 100.0);
    }
}
