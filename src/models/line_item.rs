use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest quantity a single line item may order.
///
/// Keeps per-order totals and stock counters well inside their integer types.
pub const MAX_LINE_QUANTITY: i32 = 1_000_000;

/// Largest unit price a line item may carry (one billion).
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// One product-and-quantity entry owned by an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub ordered_quantity: i32,
    pub fulfilled_quantity: i32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(product_id: Uuid, ordered_quantity: i32, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            ordered_quantity,
            fulfilled_quantity: 0,
            unit_price,
        }
    }

    /// `ordered - fulfilled`; never negative.
    pub fn remaining_quantity(&self) -> i32 {
        (self.ordered_quantity - self.fulfilled_quantity).max(0)
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.fulfilled_quantity >= self.ordered_quantity
    }

    pub fn has_progress(&self) -> bool {
        self.fulfilled_quantity > 0
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.ordered_quantity)
    }

    pub(crate) fn check_bounds(&self) -> Result<(), String> {
        if self.ordered_quantity <= 0 || self.ordered_quantity > MAX_LINE_QUANTITY {
            return Err(format!(
                "Line item {} must order between 1 and {} units",
                self.id, MAX_LINE_QUANTITY
            ));
        }
        if self.fulfilled_quantity < 0 || self.fulfilled_quantity > self.ordered_quantity {
            return Err(format!(
                "Line item {} has fulfilled quantity {} outside 0..={}",
                self.id, self.fulfilled_quantity, self.ordered_quantity
            ));
        }
        if self.unit_price.is_sign_negative() {
            return Err(format!("Line item {} has a negative unit price", self.id));
        }
        if self.unit_price > MAX_UNIT_PRICE {
            return Err(format!(
                "Line item {} has a unit price above {}",
                self.id, MAX_UNIT_PRICE
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn remaining_is_ordered_minus_fulfilled() {
        let mut item = LineItem::new(Uuid::new_v4(), 100, dec!(2.50));
        assert_eq!(item.remaining_quantity(), 100);
        item.fulfilled_quantity = 40;
        assert_eq!(item.remaining_quantity(), 60);
        assert!(item.has_progress());
        assert!(!item.is_fully_fulfilled());
        item.fulfilled_quantity = 100;
        assert_eq!(item.remaining_quantity(), 0);
        assert!(item.is_fully_fulfilled());
    }

    #[test]
    fn line_total_multiplies_price_by_ordered_quantity() {
        let item = LineItem::new(Uuid::new_v4(), 3, dec!(19.99));
        assert_eq!(item.line_total(), dec!(59.97));
    }

    #[test]
    fn bounds_reject_over_fulfilled_and_non_positive_items() {
        let mut item = LineItem::new(Uuid::new_v4(), 5, dec!(1));
        item.fulfilled_quantity = 6;
        assert!(item.check_bounds().is_err());

        let empty = LineItem::new(Uuid::new_v4(), 0, dec!(1));
        assert!(empty.check_bounds().is_err());

        let negative_price = LineItem::new(Uuid::new_v4(), 1, dec!(-1));
        assert!(negative_price.check_bounds().is_err());
    }
}
