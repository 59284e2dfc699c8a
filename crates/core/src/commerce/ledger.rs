use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commerce::pricing::cart_total;
use crate::domain::cart::{CartItem, CartMutation};
use crate::domain::product::{Product, ProductId, Supplier};

/// Authoritative list of cart lines.
///
/// Invariants: ids are unique and every quantity is positive. All mutations
/// go through this type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLedger {
    items: Vec<CartItem>,
}

impl CartLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted lines, dropping zero-quantity rows
    /// and folding duplicate ids into the first occurrence.
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let mut ledger = Self::new();
        for item in items {
            if item.quantity == 0 {
                continue;
            }
            match ledger.position(&item.id) {
                Some(index) => ledger.items[index].quantity = item.quantity,
                None => ledger.items.push(item),
            }
        }
        ledger
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Always `Some` for carts built through the mutation methods, which
    /// refuse changes whose total would overflow.
    pub fn total(&self) -> Option<Decimal> {
        cart_total(&self.items)
    }

    /// Human readable "Name (xN), Other (xM)" line used in checkout prompts.
    pub fn summary(&self) -> String {
        summarize(&self.items)
    }

    /// Applies one agent-requested mutation and describes what changed.
    ///
    /// Returns `None` when nothing changed (removing an absent line). A change
    /// that would overflow the cart total is refused and the cart is kept.
    pub fn apply_mutation(&mut self, mutation: &CartMutation) -> Option<String> {
        let previous = self.items.clone();
        let description = self.apply_unchecked(mutation)?;
        if self.restore_on_overflow(previous) {
            return Some(format!("I couldn't update {}: the cart total is too large.", mutation.name));
        }
        Some(description)
    }

    fn apply_unchecked(&mut self, mutation: &CartMutation) -> Option<String> {
        match (self.position(&mutation.id), mutation.quantity) {
            (Some(index), quantity) if quantity > 0 => {
                let line = &mut self.items[index];
                line.quantity = clamp_quantity(quantity);
                line.price = mutation.price;
                line.supplier = mutation.supplier.clone();
                Some(format!("Updated {} quantity to {}.", mutation.name, line.quantity))
            }
            (Some(index), _) => {
                self.items.remove(index);
                Some(format!("Removed {} from your cart.", mutation.name))
            }
            (None, quantity) if quantity > 0 => {
                self.items.push(CartItem {
                    id: mutation.id.clone(),
                    name: mutation.name.clone(),
                    price: mutation.price,
                    image: mutation.image.clone(),
                    quantity: clamp_quantity(quantity),
                    supplier: mutation.supplier.clone(),
                });
                Some(format!(
                    "I've added {} to your cart from {} for ${:.2}.",
                    mutation.name, mutation.supplier, mutation.price
                ))
            }
            (None, _) => None,
        }
    }

    /// Applies every mutation in order and joins their descriptions with a
    /// single space. Returns `None` if the batch changed nothing.
    pub fn apply_batch(&mut self, mutations: &[CartMutation]) -> Option<String> {
        let descriptions: Vec<String> =
            mutations.iter().filter_map(|mutation| self.apply_mutation(mutation)).collect();
        if descriptions.is_empty() {
            None
        } else {
            Some(descriptions.join(" "))
        }
    }

    /// Direct "add to cart" action: increments an existing line by one or
    /// inserts a new line with quantity one at the supplier's price. Returns
    /// `false` if the add was refused because the total would overflow.
    pub fn apply_quick_add(&mut self, product: &Product, supplier: &Supplier) -> bool {
        let previous = self.items.clone();
        match self.position(&product.id) {
            Some(index) => {
                let line = &mut self.items[index];
                line.quantity = line.quantity.saturating_add(1);
            }
            None => self.items.push(CartItem {
                id: product.id.clone(),
                name: product.name.clone(),
                price: supplier.price,
                image: product.image.clone(),
                quantity: 1,
                supplier: supplier.name.clone(),
            }),
        }
        !self.restore_on_overflow(previous)
    }

    /// Direct quantity control. Zero or less removes the line; unknown ids are
    /// ignored. Returns whether the cart changed.
    pub fn set_quantity(&mut self, id: &ProductId, quantity: i64) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        if quantity > 0 {
            let quantity = clamp_quantity(quantity);
            let previous = self.items[index].quantity;
            self.items[index].quantity = quantity;
            if cart_total(&self.items).is_none() {
                self.items[index].quantity = previous;
                return false;
            }
            previous != quantity
        } else {
            self.items.remove(index);
            true
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    fn restore_on_overflow(&mut self, previous: Vec<CartItem>) -> bool {
        if cart_total(&self.items).is_some() {
            return false;
        }
        self.items = previous;
        true
    }

    fn position(&self, id: &ProductId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}

pub fn summarize(items: &[CartItem]) -> String {
    items
        .iter()
        .map(|item| format!("{} (x{})", item.name, item.quantity))
        .collect::<Vec<_>>()
        .join(", ")
}

fn clamp_quantity(quantity: i64) -> u32 {
    u32::try_from(quantity).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::CartLedger;
    use crate::domain::cart::CartMutation;
    use crate::domain::product::{Product, ProductId, Supplier};

    fn mutation(id: &str, quantity: i64) -> CartMutation {
        CartMutation {
            id: ProductId(id.to_string()),
            name: format!("Item {id}"),
            price: Decimal::from(100),
            image: format!("https://img.test/{id}.png"),
            quantity,
            supplier: "DirectSource".to_string(),
        }
    }

    fn product(id: &str) -> Product {
        Product {
            id: ProductId(id.to_string()),
            name: format!("Item {id}"),
            image: String::new(),
            suppliers: vec![Supplier::new("TechGiant", Decimal::from(250))],
        }
    }

    #[test]
    fn new_line_is_appended_with_exact_quantity() {
        let mut cart = CartLedger::new();
        let message = cart.apply_mutation(&mutation("x", 3));

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 3);
        assert_eq!(
            message.as_deref(),
            Some("I've added Item x to your cart from DirectSource for $100.00.")
        );
    }

    #[test]
    fn existing_line_quantity_is_overwritten_not_incremented() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("x", 1));
        let message = cart.apply_mutation(&mutation("x", 4));

        assert_eq!(cart.items()[0].quantity, 4);
        assert_eq!(message.as_deref(), Some("Updated Item x quantity to 4."));
    }

    #[test]
    fn update_takes_price_and_supplier_from_mutation() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("x", 1));
        let mut cheaper = mutation("x", 2);
        cheaper.price = Decimal::from(90);
        cheaper.supplier = "PCWorld".to_string();
        cart.apply_mutation(&cheaper);

        assert_eq!(cart.items()[0].price, Decimal::from(90));
        assert_eq!(cart.items()[0].supplier, "PCWorld");
    }

    #[test]
    fn zero_or_negative_quantity_removes_line() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("x", 2));
        cart.apply_mutation(&mutation("y", 2));

        assert_eq!(
            cart.apply_mutation(&mutation("x", 0)).as_deref(),
            Some("Removed Item x from your cart.")
        );
        cart.apply_mutation(&mutation("y", -3));
        assert!(cart.is_empty());
    }

    #[test]
    fn removing_absent_line_is_a_silent_noop() {
        let mut cart = CartLedger::new();
        assert_eq!(cart.apply_mutation(&mutation("ghost", 0)), None);
        assert!(cart.is_empty());
    }

    #[test]
    fn repeated_identical_mutation_is_idempotent() {
        let mut once = CartLedger::new();
        once.apply_mutation(&mutation("x", 5));

        let mut twice = CartLedger::new();
        twice.apply_mutation(&mutation("x", 5));
        twice.apply_mutation(&mutation("x", 5));

        assert_eq!(once, twice);
    }

    #[test]
    fn arbitrary_mutation_sequences_never_leave_non_positive_lines() {
        let ids = ["a", "b", "c"];
        let quantities = [3, 0, -1, 2, 7, 0, 1, -5, 4];
        let mut cart = CartLedger::new();

        for (step, quantity) in quantities.iter().cycle().take(60).enumerate() {
            cart.apply_mutation(&mutation(ids[step % ids.len()], *quantity));
            assert!(cart.items().iter().all(|item| item.quantity > 0));

            let mut seen = std::collections::HashSet::new();
            assert!(cart.items().iter().all(|item| seen.insert(item.id.clone())));
        }
    }

    #[test]
    fn batch_concatenates_every_description_in_order() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("b", 1));
        let message =
            cart.apply_batch(&[mutation("a", 1), mutation("b", 0), mutation("ghost", 0)]);

        assert_eq!(
            message.as_deref(),
            Some("I've added Item a to your cart from DirectSource for $100.00. Removed Item b from your cart.")
        );
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn batch_that_changes_nothing_has_no_confirmation() {
        let mut cart = CartLedger::new();
        assert_eq!(cart.apply_batch(&[mutation("ghost", 0)]), None);
    }

    #[test]
    fn quick_add_twice_yields_single_line_with_quantity_two() {
        let mut cart = CartLedger::new();
        let product = product("p");
        let supplier = product.suppliers[0].clone();

        cart.apply_quick_add(&product, &supplier);
        cart.apply_quick_add(&product, &supplier);

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(cart.items()[0].price, Decimal::from(250));
        assert_eq!(cart.items()[0].supplier, "TechGiant");
    }

    #[test]
    fn set_quantity_zero_removes_and_unknown_is_ignored() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("x", 2));

        assert!(!cart.set_quantity(&ProductId("nope".to_string()), 3));
        assert!(cart.set_quantity(&ProductId("x".to_string()), 5));
        assert_eq!(cart.items()[0].quantity, 5);
        assert!(cart.set_quantity(&ProductId("x".to_string()), 0));
        assert!(cart.is_empty());
    }

    #[test]
    fn from_items_drops_zero_quantities_and_duplicates() {
        let mut restored = CartLedger::new();
        restored.apply_mutation(&mutation("x", 2));
        let mut items = restored.items().to_vec();
        let mut zero = items[0].clone();
        zero.id = ProductId("z".to_string());
        zero.quantity = 0;
        items.push(zero);
        let mut dup = items[0].clone();
        dup.quantity = 9;
        items.push(dup);

        let ledger = CartLedger::from_items(items);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.items()[0].quantity, 9);
    }

    #[test]
    fn summary_and_total_reflect_lines() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("x", 2));
        cart.apply_mutation(&mutation("y", 1));

        assert_eq!(cart.summary(), "Item x (x2), Item y (x1)");
        assert_eq!(cart.total(), Some(Decimal::from(300)));
    }

    #[test]
    fn mutation_that_would_overflow_the_total_is_refused() {
        let mut cart = CartLedger::new();
        cart.apply_mutation(&mutation("x", 1));

        let mut huge = mutation("y", 2);
        huge.price = Decimal::MAX;
        let message = cart.apply_mutation(&huge);

        assert_eq!(message.as_deref(), Some("I couldn't update Item y: the cart total is too large."));
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.total(), Some(Decimal::from(100)));
    }

    #[test]
    fn quantity_that_would_overflow_the_total_is_refused() {
        let mut cart = CartLedger::new();
        let mut pricey = mutation("x", 1);
        pricey.price = Decimal::MAX;
        cart.apply_mutation(&pricey);

        assert!(!cart.set_quantity(&ProductId("x".to_string()), 3));
        assert_eq!(cart.items()[0].quantity, 1);

        let product = Product {
            id: ProductId("x".to_string()),
            name: "Item x".to_string(),
            image: String::new(),
            suppliers: vec![Supplier::new("TechGiant", Decimal::MAX)],
        };
        assert!(!cart.apply_quick_add(&product, &product.suppliers[0]));
        assert_eq!(cart.items()[0].quantity, 1);
    }
}
