use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::debug;

use agentcart_core::commerce::pricing::{best_price, is_acceptable_unit_price};
use agentcart_core::domain::cart::CartMutation;
use agentcart_core::domain::product::{Product, ProductId};

use crate::llm::{AgentTurn, FunctionCallRequest};
use crate::tools::{CallKind, FunctionRegistry};

/// Arguments of a receipt-mint call as the model supplied them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MintRequest {
    pub transaction_id: Option<String>,
    pub order_summary: Option<String>,
    pub total: Option<Decimal>,
}

/// The single policy selected for one agent turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnPlan {
    Text(String),
    Search { query: String },
    StartCheckout,
    CartMutations(Vec<CartMutation>),
    InitiatePayment,
    MintReceipt(MintRequest),
    /// Cart changes were requested but none had usable arguments.
    Malformed,
    Ignored,
}

/// Classifies a turn. Priority: search, checkout start, cart mutations,
/// payment initiation, receipt mint. Calls the registry does not know are
/// dropped; a batch with nothing actionable left is `Ignored`, or `Malformed`
/// when it held cart changes that were all rejected.
pub fn plan_turn(turn: &AgentTurn, registry: &FunctionRegistry) -> TurnPlan {
    let calls = match turn {
        AgentTurn::Text(text) if text.trim().is_empty() => return TurnPlan::Ignored,
        AgentTurn::Text(text) => return TurnPlan::Text(text.clone()),
        AgentTurn::Calls(calls) => calls,
    };

    let of_kind = |kind: CallKind| {
        calls.iter().filter(move |call| registry.kind_of(&call.name) == Some(kind))
    };

    if let Some(search) = of_kind(CallKind::Search).next() {
        let query = string_arg(&search.args, "query").unwrap_or_default();
        return TurnPlan::Search { query };
    }

    if of_kind(CallKind::StartCheckout).next().is_some() {
        return TurnPlan::StartCheckout;
    }

    let mutation_calls: Vec<&FunctionCallRequest> = of_kind(CallKind::UpdateCart).collect();
    let had_mutations = !mutation_calls.is_empty();
    if had_mutations {
        let mutations: Vec<CartMutation> =
            mutation_calls.into_iter().filter_map(parse_mutation).collect();
        if !mutations.is_empty() {
            return TurnPlan::CartMutations(mutations);
        }
    }

    if of_kind(CallKind::InitiatePayment).next().is_some() {
        return TurnPlan::InitiatePayment;
    }

    if let Some(mint) = of_kind(CallKind::MintReceipt).next() {
        return TurnPlan::MintReceipt(MintRequest {
            transaction_id: string_arg(&mint.args, "transactionId"),
            order_summary: string_arg(&mint.args, "orderSummary"),
            total: mint.args.get("total").and_then(decimal_arg),
        });
    }

    if had_mutations {
        return TurnPlan::Malformed;
    }

    debug!(
        event_name = "agent.turn_ignored",
        calls = ?calls.iter().map(|call| call.name.as_str()).collect::<Vec<_>>(),
        "no actionable function calls in turn"
    );
    TurnPlan::Ignored
}

/// Function result for a search: product id, name and cheapest price only.
pub fn search_payload(products: &[Product]) -> Value {
    let products: Vec<Value> = products
        .iter()
        .map(|product| {
            json!({
                "id": product.id.as_str(),
                "name": product.name,
                "bestPrice": best_price(product).to_f64(),
            })
        })
        .collect();
    json!({ "products": products })
}

fn parse_mutation(call: &FunctionCallRequest) -> Option<CartMutation> {
    let args = &call.args;
    let mutation = (|| {
        Some(CartMutation {
            id: ProductId(string_arg(args, "id")?),
            name: string_arg(args, "name")?,
            price: args
                .get("price")
                .and_then(decimal_arg)
                .filter(|price| is_acceptable_unit_price(*price))?,
            image: string_arg(args, "image").unwrap_or_default(),
            quantity: args.get("quantity").and_then(quantity_arg)?,
            supplier: string_arg(args, "supplier")?,
        })
    })();

    if mutation.is_none() {
        debug!(
            event_name = "agent.cart_mutation_malformed",
            call_id = %call.call_id,
            "skipping cart mutation with missing or invalid arguments"
        );
    }
    mutation
}

fn string_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn decimal_arg(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().trim_start_matches('$').to_string(),
        _ => return None,
    };
    Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)).ok()
}

fn quantity_arg(value: &Value) -> Option<i64> {
    let quantity = match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(f64::round)?.to_i64()),
        Value::String(text) => text.trim().parse::<f64>().ok().map(f64::round).and_then(|q| q.to_i64()),
        _ => None,
    }?;
    Some(quantity)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use agentcart_core::commerce::StaticCatalog;
    use agentcart_core::commerce::CatalogLookup;

    use super::{plan_turn, search_payload, MintRequest, TurnPlan};
    use crate::llm::{AgentTurn, FunctionCallRequest};
    use crate::tools::FunctionRegistry;

    fn call(name: &str, args: serde_json::Value) -> FunctionCallRequest {
        FunctionCallRequest::new(format!("call_{name}"), name, args)
    }

    fn update(id: &str, quantity: serde_json::Value) -> FunctionCallRequest {
        call(
            "updateCartItem",
            json!({
                "id": id, "name": "Apple Watch Series 9", "price": 379,
                "image": "img", "quantity": quantity, "supplier": "Amazon"
            }),
        )
    }

    #[test]
    fn empty_text_is_ignored_and_text_is_surfaced() {
        let registry = FunctionRegistry::shopping();
        assert_eq!(plan_turn(&AgentTurn::text("   "), &registry), TurnPlan::Ignored);
        assert_eq!(
            plan_turn(&AgentTurn::text("Hello"), &registry),
            TurnPlan::Text("Hello".to_string())
        );
    }

    #[test]
    fn search_wins_over_everything_else_in_a_batch() {
        let turn = AgentTurn::Calls(vec![
            update("prod_apple_watch", json!(1)),
            call("startCheckout", json!({})),
            call("searchCatalog", json!({ "query": "watch" })),
        ]);
        assert_eq!(
            plan_turn(&turn, &FunctionRegistry::shopping()),
            TurnPlan::Search { query: "watch".to_string() }
        );
    }

    #[test]
    fn checkout_wins_over_mutations() {
        let turn = AgentTurn::Calls(vec![
            update("prod_apple_watch", json!(1)),
            call("startCheckout", json!({})),
        ]);
        assert_eq!(plan_turn(&turn, &FunctionRegistry::shopping()), TurnPlan::StartCheckout);
    }

    #[test]
    fn mutations_keep_batch_order_and_accept_loose_numbers() {
        let turn = AgentTurn::Calls(vec![
            update("prod_a", json!(2)),
            update("prod_b", json!("0")),
            update("prod_c", json!(1.6)),
        ]);
        let TurnPlan::CartMutations(mutations) = plan_turn(&turn, &FunctionRegistry::shopping())
        else {
            panic!("expected mutations");
        };
        let quantities: Vec<i64> = mutations.iter().map(|m| m.quantity).collect();
        assert_eq!(quantities, vec![2, 0, 2]);
        assert_eq!(mutations[0].price, Decimal::new(379, 0));
    }

    #[test]
    fn unknown_calls_alone_are_ignored() {
        let turn = AgentTurn::Calls(vec![call("launchRocket", json!({}))]);
        assert_eq!(plan_turn(&turn, &FunctionRegistry::shopping()), TurnPlan::Ignored);
    }

    #[test]
    fn batch_of_only_malformed_mutations_is_reported() {
        let turn = AgentTurn::Calls(vec![
            call("updateCartItem", json!({ "id": "prod_a" })),
            call("launchRocket", json!({})),
        ]);
        assert_eq!(plan_turn(&turn, &FunctionRegistry::shopping()), TurnPlan::Malformed);
    }

    #[test]
    fn out_of_range_prices_are_rejected() {
        let priced = |price: serde_json::Value| {
            call(
                "updateCartItem",
                json!({
                    "id": "prod_x", "name": "X", "price": price,
                    "quantity": 2, "supplier": "S"
                }),
            )
        };
        let registry = FunctionRegistry::shopping();
        for price in [json!("79228162514264337593543950335"), json!(0), json!(-10), json!("$2000000")] {
            let turn = AgentTurn::Calls(vec![priced(price.clone())]);
            assert_eq!(plan_turn(&turn, &registry), TurnPlan::Malformed, "price {price}");
        }

        let valid = AgentTurn::Calls(vec![priced(json!("$19.99")), update("prod_a", json!(1))]);
        let TurnPlan::CartMutations(mutations) = plan_turn(&valid, &registry) else {
            panic!("expected mutations");
        };
        assert_eq!(mutations[0].price, Decimal::new(1999, 2));
    }

    #[test]
    fn payment_calls_are_ignored_by_the_shopping_agent() {
        let turn = AgentTurn::Calls(vec![call("initiatePayment", json!({}))]);
        assert_eq!(plan_turn(&turn, &FunctionRegistry::shopping()), TurnPlan::Ignored);
        assert_eq!(plan_turn(&turn, &FunctionRegistry::payment()), TurnPlan::InitiatePayment);
    }

    #[test]
    fn mint_arguments_are_extracted_when_present() {
        let turn = AgentTurn::Calls(vec![call(
            "mintReceipt",
            json!({ "transactionId": "tx_1", "orderSummary": "Widget (x2)", "total": 200 }),
        )]);
        assert_eq!(
            plan_turn(&turn, &FunctionRegistry::payment()),
            TurnPlan::MintReceipt(MintRequest {
                transaction_id: Some("tx_1".to_string()),
                order_summary: Some("Widget (x2)".to_string()),
                total: Some(Decimal::new(200, 0)),
            })
        );
    }

    #[test]
    fn search_payload_carries_best_price_only() {
        let products = StaticCatalog::demo().search("watch");
        let payload = search_payload(&products);
        let entries = payload["products"].as_array().cloned().unwrap_or_default();

        assert_eq!(entries.len(), products.len());
        assert!(entries.iter().all(|entry| entry.get("suppliers").is_none()));
        assert!(entries.iter().all(|entry| entry["bestPrice"].is_number()));
    }
}
