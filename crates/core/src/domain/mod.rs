pub mod cart;
pub mod product;
pub mod shopper;
pub mod transaction;
