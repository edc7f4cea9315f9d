pub mod addresses;
pub mod carts;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod payment_methods;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        addresses::AddressService,
        carts::CartService,
        checkout::CheckoutService,
        orders::OrderService,
        payment_intents::{PaymentIntentService, SimulatedGateway},
        payment_methods::PaymentMethodService,
        pricing::PricingService,
    },
};

/// Service container shared through `AppState`. Everything hangs off the
/// same connection and event channel.
#[derive(Clone)]
pub struct AppServices {
    pub addresses: Arc<AddressService>,
    pub payment_methods: Arc<PaymentMethodService>,
    pub payment_intents: Arc<PaymentIntentService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub pricing: Arc<PricingService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let addresses = AddressService::new(db.clone(), event_sender.clone());
        let payment_methods = PaymentMethodService::new(db.clone(), event_sender.clone());
        let gateway = Arc::new(SimulatedGateway::new(&config.gateway));
        let payment_intents =
            PaymentIntentService::new(db.clone(), gateway, event_sender.clone());
        let carts = CartService::new(db.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone(), config);
        let pricing = PricingService::new(config);
        let checkout = CheckoutService::new(
            db,
            addresses.clone(),
            payment_methods.clone(),
            payment_intents.clone(),
            orders.clone(),
            carts.clone(),
            pricing.clone(),
            event_sender,
            config,
        );

        Self {
            addresses: Arc::new(addresses),
            payment_methods: Arc::new(payment_methods),
            payment_intents: Arc::new(payment_intents),
            carts: Arc::new(carts),
            orders: Arc::new(orders),
            checkout: Arc::new(checkout),
            pricing: Arc::new(pricing),
        }
    }
}
