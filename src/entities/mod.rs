pub mod address;
pub mod cart;
pub mod cart_item;
pub mod checkout_session;
pub mod order;
pub mod order_item;
pub mod payment_intent;
pub mod payment_method;
