use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SEARCH_CATALOG: &str = "searchCatalog";
pub const UPDATE_CART_ITEM: &str = "updateCartItem";
pub const START_CHECKOUT: &str = "startCheckout";
pub const INITIATE_PAYMENT: &str = "initiatePayment";
pub const MINT_RECEIPT: &str = "mintReceipt";

/// What the dispatcher does with a call of a given name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Search,
    StartCheckout,
    UpdateCart,
    InitiatePayment,
    MintReceipt,
}

/// Function schema advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self { name: name.to_string(), description: description.to_string(), parameters }
    }
}

/// The functions one agent may call. Calls whose name is not registered are
/// ignored by the dispatcher.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    declarations: Vec<FunctionDeclaration>,
    kinds: HashMap<String, CallKind>,
}

impl FunctionRegistry {
    pub fn register(&mut self, declaration: FunctionDeclaration, kind: CallKind) {
        self.kinds.insert(declaration.name.clone(), kind);
        self.declarations.retain(|existing| existing.name != declaration.name);
        self.declarations.push(declaration);
    }

    pub fn kind_of(&self, name: &str) -> Option<CallKind> {
        self.kinds.get(name).copied()
    }

    pub fn name_of(&self, kind: CallKind) -> Option<&str> {
        self.declarations
            .iter()
            .find(|declaration| self.kinds.get(&declaration.name) == Some(&kind))
            .map(|declaration| declaration.name.as_str())
    }

    pub fn declarations(&self) -> &[FunctionDeclaration] {
        &self.declarations
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn shopping() -> Self {
        let mut registry = Self::default();
        registry.register(
            FunctionDeclaration::new(
                SEARCH_CATALOG,
                "Searches the product catalog for a user's query.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The product or category to search for (e.g. \"laptop\", \"iPhone\")."
                        }
                    },
                    "required": ["query"]
                }),
            ),
            CallKind::Search,
        );
        registry.register(
            FunctionDeclaration::new(
                UPDATE_CART_ITEM,
                "Adds, updates, or removes a cart line by setting its new total quantity. \
                 A quantity of 0 removes the line.",
                json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "The product ID." },
                        "name": { "type": "string", "description": "The product name." },
                        "price": { "type": "number", "description": "Price from the chosen supplier." },
                        "image": { "type": "string", "description": "URL of the product image." },
                        "quantity": { "type": "number", "description": "The new total quantity; 0 removes the item." },
                        "supplier": { "type": "string", "description": "Name of the cheapest supplier." }
                    },
                    "required": ["id", "name", "price", "image", "quantity", "supplier"]
                }),
            ),
            CallKind::UpdateCart,
        );
        registry.register(
            FunctionDeclaration::new(
                START_CHECKOUT,
                "Hands the shopper over to the payment agent to check out.",
                json!({ "type": "object", "properties": {} }),
            ),
            CallKind::StartCheckout,
        );
        registry
    }

    pub fn payment() -> Self {
        let mut registry = Self::default();
        registry.register(
            FunctionDeclaration::new(
                INITIATE_PAYMENT,
                "Presents the shopper with the secure payment form.",
                json!({ "type": "object", "properties": {} }),
            ),
            CallKind::InitiatePayment,
        );
        registry.register(
            FunctionDeclaration::new(
                MINT_RECEIPT,
                "Mints the proof-of-purchase receipt after a successful payment. Final step.",
                json!({
                    "type": "object",
                    "properties": {
                        "transactionId": {
                            "type": "string",
                            "description": "The payment transaction ID."
                        },
                        "orderSummary": {
                            "type": "string",
                            "description": "Brief summary of the items, e.g. \"MacBook Pro 14\\\" (x1)\"."
                        },
                        "total": { "type": "number", "description": "Final total of the purchase." }
                    },
                    "required": ["transactionId", "orderSummary", "total"]
                }),
            ),
            CallKind::MintReceipt,
        );
        registry
    }
}
