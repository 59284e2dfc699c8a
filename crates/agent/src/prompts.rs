use rust_decimal::Decimal;

use agentcart_core::commerce::ledger::summarize;
use agentcart_core::domain::cart::CartItem;
use agentcart_core::domain::shopper::Shopper;

pub const SHOPPING_INSTRUCTION: &str = "\
You are the shopping assistant for an electronics store. Help the user find products \
and manage their cart while getting them the best possible price.

1. Ask the user what they are looking for.
2. When the user names a product or category, call `searchCatalog`.
3. Search results list several suppliers per product. Pick the supplier with the lowest price.
4. Present the results and mention that you found the best price.
5. To add, update, or remove a cart line, call `updateCartItem` with the product id, name and \
image plus the price and supplier name of the CHEAPEST supplier. `quantity` is the new total \
quantity; use 0 to remove a line.
6. For several cart changes, make several `updateCartItem` calls in one turn.
7. When the user is ready to pay, call `startCheckout`.
8. The system confirms cart updates for you; do not repeat them.
9. Politely steer unrelated questions back to shopping.";

pub const PAYMENT_INSTRUCTION: &str = "\
You are the payment specialist. You run a secure checkout and give the user a \
proof-of-purchase receipt.

1. Your first message, acknowledging the cart and total, has already been written for you.
2. Your first action MUST be a call to `initiatePayment`. Do not ask for confirmation.
3. The system tells you when payment succeeds by returning a transaction id from `initiatePayment`.
4. After a successful payment your final action MUST be a call to `mintReceipt` with that \
transaction id, a short order summary and the total.
5. Do not add conversational text after calling `mintReceipt`.
6. If the user wants to cancel before paying, acknowledge it and do not call any function.";

/// Synthetic instruction that kicks the payment agent into its first call.
pub const PROCEED_WITH_CHECKOUT: &str = "Proceed with checkout.";

pub fn shopping_greeting(shopper: &Shopper) -> String {
    format!(
        "Hi {}! I'm your shopping assistant. What are you looking for today?",
        shopper.salutation()
    )
}

/// User-side summary the payment session is seeded with.
pub fn checkout_briefing(items: &[CartItem], total: Decimal) -> String {
    let cart = serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string());
    format!("The user is ready to check out. Cart: {cart}. Total: ${total:.2}.")
}

/// Pre-written first message of the payment agent.
pub fn payment_greeting(items: &[CartItem], total: Decimal) -> String {
    format!(
        "I'm your payment specialist. I see you'd like to purchase: {} for a total of ${:.2}. \
         Please stand by while I prepare the secure payment form.",
        summarize(items),
        total
    )
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use agentcart_core::domain::cart::CartItem;
    use agentcart_core::domain::product::ProductId;
    use agentcart_core::domain::shopper::Shopper;

    use super::{checkout_briefing, payment_greeting, shopping_greeting};

    fn airpods() -> CartItem {
        CartItem {
            id: ProductId("prod_airpods_pro".to_string()),
            name: "Apple AirPods Pro".to_string(),
            price: Decimal::new(100, 0),
            image: String::new(),
            quantity: 2,
            supplier: "Walmart".to_string(),
        }
    }

    #[test]
    fn payment_greeting_lists_items_and_two_decimal_total() {
        let text = payment_greeting(&[airpods()], Decimal::new(200, 0));
        assert!(text.contains("Apple AirPods Pro (x2)"));
        assert!(text.contains("$200.00"));
    }

    #[test]
    fn briefing_embeds_cart_json() {
        let text = checkout_briefing(&[airpods()], Decimal::new(200, 0));
        assert!(text.contains("\"prod_airpods_pro\""));
        assert!(text.ends_with("Total: $200.00."));
    }

    #[test]
    fn greeting_uses_salutation() {
        assert!(shopping_greeting(&Shopper::guest("g")).starts_with("Hi Valued Customer!"));
    }
}
