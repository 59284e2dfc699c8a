use rust_decimal::Decimal;

use crate::domain::cart::CartItem;
use crate::domain::product::{Product, Supplier};

/// Picks the supplier with the lowest price.
///
/// The scan is stable left to right: when several suppliers share the
/// minimum price, the first one in the input wins. Returns `None` for an
/// empty list.
pub fn cheapest(suppliers: &[Supplier]) -> Option<&Supplier> {
    let mut best: Option<&Supplier> = None;
    for supplier in suppliers {
        match best {
            Some(current) if supplier.price >= current.price => {}
            _ => best = Some(supplier),
        }
    }
    best
}

/// Same as [`cheapest`] but tolerates an empty list with an `N/A` sentinel.
pub fn cheapest_or_sentinel(suppliers: &[Supplier]) -> Supplier {
    cheapest(suppliers).cloned().unwrap_or_else(|| Supplier::new("N/A", Decimal::ZERO))
}

pub fn best_price(product: &Product) -> Decimal {
    cheapest_or_sentinel(&product.suppliers).price
}

/// Highest unit price accepted from an agent-supplied cart line.
pub const MAX_UNIT_PRICE: i64 = 1_000_000;

pub fn is_acceptable_unit_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price <= Decimal::from(MAX_UNIT_PRICE)
}

/// Sum of every line total, or `None` on overflow.
pub fn cart_total(items: &[CartItem]) -> Option<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.line_total()?))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{cart_total, cheapest, cheapest_or_sentinel, is_acceptable_unit_price};
    use crate::domain::cart::CartItem;
    use crate::domain::product::{ProductId, Supplier};

    fn supplier(name: &str, price: i64) -> Supplier {
        Supplier::new(name, Decimal::from(price))
    }

    #[test]
    fn lowest_price_wins() {
        let suppliers = [supplier("A", 10), supplier("B", 10), supplier("C", 5)];
        assert_eq!(cheapest(&suppliers).map(|s| s.name.as_str()), Some("C"));
    }

    #[test]
    fn first_seen_supplier_wins_ties() {
        let suppliers = [supplier("A", 10), supplier("B", 10)];
        assert_eq!(cheapest(&suppliers).map(|s| s.name.as_str()), Some("A"));

        let reordered = [supplier("B", 10), supplier("A", 10)];
        assert_eq!(cheapest(&reordered).map(|s| s.name.as_str()), Some("B"));
    }

    #[test]
    fn empty_supplier_list_uses_sentinel() {
        assert!(cheapest(&[]).is_none());
        let sentinel = cheapest_or_sentinel(&[]);
        assert_eq!(sentinel.name, "N/A");
        assert_eq!(sentinel.price, Decimal::ZERO);
    }

    #[test]
    fn cart_total_sums_price_times_quantity() {
        let items = vec![
            CartItem {
                id: ProductId("x".to_string()),
                name: "X".to_string(),
                price: Decimal::from(100),
                image: String::new(),
                quantity: 2,
                supplier: "A".to_string(),
            },
            CartItem {
                id: ProductId("y".to_string()),
                name: "Y".to_string(),
                price: Decimal::new(1999, 2),
                image: String::new(),
                quantity: 1,
                supplier: "B".to_string(),
            },
        ];
        assert_eq!(cart_total(&items), Some(Decimal::new(21999, 2)));
    }

    #[test]
    fn overflowing_cart_total_is_none() {
        let item = CartItem {
            id: ProductId("x".to_string()),
            name: "X".to_string(),
            price: Decimal::MAX,
            image: String::new(),
            quantity: 2,
            supplier: "A".to_string(),
        };
        assert_eq!(item.line_total(), None);
        assert_eq!(cart_total(&[item]), None);
    }

    #[test]
    fn unit_prices_must_be_positive_and_bounded() {
        assert!(is_acceptable_unit_price(Decimal::new(1999, 2)));
        assert!(!is_acceptable_unit_price(Decimal::ZERO));
        assert!(!is_acceptable_unit_price(Decimal::from(-5)));
        assert!(!is_acceptable_unit_price(Decimal::MAX));
    }
}
