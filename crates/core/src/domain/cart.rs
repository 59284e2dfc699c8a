use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// One line in a cart. A line never exists with a zero quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: String,
    pub quantity: u32,
    pub supplier: String,
}

impl CartItem {
    /// `None` when price times quantity does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// A requested cart change. `quantity` is the new absolute quantity and may
/// be zero or negative, both of which mean "remove".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartMutation {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub image: String,
    pub quantity: i64,
    pub supplier: String,
}
