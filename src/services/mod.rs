pub mod addresses;
pub mod cards;
pub mod carts;
pub mod checkout;
pub mod orders;
pub mod payment_intents;
pub mod payment_methods;
pub mod pricing;
