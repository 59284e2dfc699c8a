pub mod catalog;
pub mod ledger;
pub mod pricing;

pub use catalog::{CatalogLookup, StaticCatalog};
pub use ledger::CartLedger;
pub use pricing::{
    best_price, cart_total, cheapest, cheapest_or_sentinel, is_acceptable_unit_price, MAX_UNIT_PRICE,
};
