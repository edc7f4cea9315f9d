use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::{
        address::AddressKind,
        cart::{self, CartStatus},
        checkout_session::{self, CheckoutStep, Entity as CheckoutSessionEntity},
        order,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{from_json, to_json, AddressSnapshot, PaymentMethodSnapshot},
    services::{
        addresses::AddressService,
        carts::CartService,
        orders::{NewOrder, OrderService},
        payment_intents::PaymentIntentService,
        payment_methods::PaymentMethodService,
        pricing::{OrderSummary, PricingService},
    },
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetAddressesRequest {
    pub shipping_address_id: Uuid,
    /// Omitted means bill to the shipping address.
    pub billing_address_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPaymentMethodRequest {
    pub payment_method_id: Uuid,
}

/// What the review step shows: the session plus a freshly-priced summary.
pub struct CheckoutReview {
    pub session: checkout_session::Model,
    pub summary: OrderSummary,
    pub shipping_address: AddressSnapshot,
    pub billing_address: AddressSnapshot,
    pub payment_method: PaymentMethodSnapshot,
}

/// Orchestrates the checkout state machine over the persisted session row.
/// The session is the source of truth for progress; clients render whatever
/// step the server says they are on.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    addresses: AddressService,
    payment_methods: PaymentMethodService,
    payment_intents: PaymentIntentService,
    orders: OrderService,
    carts: CartService,
    pricing: PricingService,
    event_sender: EventSender,
    currency: String,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        addresses: AddressService,
        payment_methods: PaymentMethodService,
        payment_intents: PaymentIntentService,
        orders: OrderService,
        carts: CartService,
        pricing: PricingService,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            addresses,
            payment_methods,
            payment_intents,
            orders,
            carts,
            pricing,
            event_sender,
            currency: config.currency.clone(),
        }
    }

    /// Opens a checkout session for an active, non-empty cart. The
    /// customer's default addresses and payment method are pre-filled so a
    /// returning customer can go straight to review.
    #[instrument(skip(self))]
    pub async fn start_checkout(
        &self,
        customer_id: Uuid,
        cart_id: Uuid,
    ) -> Result<checkout_session::Model, ServiceError> {
        let cart = self.carts.get_cart(cart_id).await?;
        if cart.customer_id != customer_id {
            return Err(ServiceError::NotFound(format!("Cart {} not found", cart_id)));
        }
        if cart.status != CartStatus::Active {
            return Err(ServiceError::InvalidOperation(
                "Cart is no longer active".to_string(),
            ));
        }
        let items = self.carts.get_cart_items(cart_id).await?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot check out an empty cart".to_string(),
            ));
        }

        let default_shipping = self
            .addresses
            .default_address(customer_id, AddressKind::Shipping)
            .await?;
        let default_billing = self
            .addresses
            .default_address(customer_id, AddressKind::Billing)
            .await?;
        let default_payment = self.payment_methods.default_payment_method(customer_id).await?;

        let shipping_snapshot = default_shipping
            .as_ref()
            .map(|a| to_json(&AddressSnapshot::from(a)))
            .transpose()?;
        // No billing default: fall back to billing at the shipping address.
        let billing_snapshot = match (&default_billing, &default_shipping) {
            (Some(b), _) => Some(to_json(&AddressSnapshot::from(b))?),
            (None, Some(s)) => Some(to_json(&AddressSnapshot::from(s))?),
            (None, None) => None,
        };

        let now = Utc::now();
        let session_id = Uuid::new_v4();
        let model = checkout_session::ActiveModel {
            id: Set(session_id),
            cart_id: Set(cart_id),
            customer_id: Set(customer_id),
            step: Set(CheckoutStep::Address),
            shipping_address: Set(shipping_snapshot),
            billing_address: Set(billing_snapshot),
            payment_method_id: Set(default_payment.map(|pm| pm.id)),
            idempotency_key: Set(format!("co_{}", Uuid::new_v4().simple())),
            order_id: Set(None),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
        };
        let created = model.insert(&*self.db).await?;

        info!(session_id = %created.id, cart_id = %cart_id, "checkout started");
        self.event_sender
            .send(Event::CheckoutStarted {
                session_id: created.id,
                cart_id,
            })
            .await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_session(
        &self,
        customer_id: Uuid,
        session_id: Uuid,
    ) -> Result<checkout_session::Model, ServiceError> {
        let session = CheckoutSessionEntity::find_by_id(session_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Checkout session {} not found", session_id))
            })?;
        if session.customer_id != customer_id {
            return Err(ServiceError::NotFound(format!(
                "Checkout session {} not found",
                session_id
            )));
        }
        Ok(session)
    }

    /// Snapshots the chosen addresses into the session. Allowed any time
    /// before the order is placed; changing an address from review keeps the
    /// session at review.
    #[instrument(skip(self, request), fields(session_id = %session_id))]
    pub async fn set_addresses(
        &self,
        customer_id: Uuid,
        session_id: Uuid,
        request: SetAddressesRequest,
    ) -> Result<checkout_session::Model, ServiceError> {
        let session = self.get_session(customer_id, session_id).await?;
        self.ensure_editable(&session)?;

        let shipping = self
            .addresses
            .get_address(customer_id, request.shipping_address_id)
            .await?;
        if shipping.kind != AddressKind::Shipping {
            return Err(ServiceError::InvalidInput(
                "shipping_address_id must reference a shipping address".to_string(),
            ));
        }
        let billing_snapshot = match request.billing_address_id {
            Some(billing_id) => {
                let billing = self.addresses.get_address(customer_id, billing_id).await?;
                if billing.kind != AddressKind::Billing {
                    return Err(ServiceError::InvalidInput(
                        "billing_address_id must reference a billing address".to_string(),
                    ));
                }
                AddressSnapshot::from(&billing)
            }
            None => AddressSnapshot::from(&shipping),
        };

        let next_step = match session.step {
            CheckoutStep::Address => CheckoutStep::Payment,
            other => other,
        };
        let mut active: checkout_session::ActiveModel = session.into();
        active.shipping_address = Set(Some(to_json(&AddressSnapshot::from(&shipping))?));
        active.billing_address = Set(Some(to_json(&billing_snapshot)?));
        active.step = Set(next_step);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        Ok(updated)
    }

    /// Records the chosen payment method and advances to review. Requires
    /// addresses to be set first.
    #[instrument(skip(self, request), fields(session_id = %session_id))]
    pub async fn set_payment_method(
        &self,
        customer_id: Uuid,
        session_id: Uuid,
        request: SetPaymentMethodRequest,
    ) -> Result<checkout_session::Model, ServiceError> {
        let session = self.get_session(customer_id, session_id).await?;
        self.ensure_editable(&session)?;
        if session.shipping_address.is_none() || session.billing_address.is_none() {
            return Err(ServiceError::InvalidOperation(
                "Addresses must be set before choosing a payment method".to_string(),
            ));
        }

        // Must exist, be active, and belong to the customer.
        self.payment_methods
            .get_payment_method(customer_id, request.payment_method_id)
            .await?;

        let mut active: checkout_session::ActiveModel = session.into();
        active.payment_method_id = Set(Some(request.payment_method_id));
        active.step = Set(CheckoutStep::Review);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        Ok(updated)
    }

    /// Review step: the session's snapshots plus totals priced from the live
    /// cart right now, so the customer confirms exactly what will be charged.
    #[instrument(skip(self))]
    pub async fn review(
        &self,
        customer_id: Uuid,
        session_id: Uuid,
    ) -> Result<CheckoutReview, ServiceError> {
        let session = self.get_session(customer_id, session_id).await?;
        let (shipping, billing, payment_method_id) = self.require_review_inputs(&session)?;

        let payment_method = self
            .payment_methods
            .get_payment_method(customer_id, payment_method_id)
            .await?;
        let items = self.carts.get_cart_items(session.cart_id).await?;
        let summary = self.pricing.order_summary(&items)?;

        Ok(CheckoutReview {
            summary,
            shipping_address: shipping,
            billing_address: billing,
            payment_method: PaymentMethodSnapshot::from(&payment_method),
            session,
        })
    }

    /// Places the order: creates or reuses the payment intent for this
    /// attempt, confirms it against the gateway, and on approval commits
    /// order, intent linkage, cart conversion, and session completion in one
    /// transaction. A declined payment parks the session back at review with
    /// the reason recorded; no order is created. Retrying after success
    /// returns the already-created order.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn place_order(
        &self,
        customer_id: Uuid,
        session_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let session = self.get_session(customer_id, session_id).await?;

        // Idempotent replay of a finished checkout.
        if session.step == CheckoutStep::Completed {
            if let Some(order_id) = session.order_id {
                return self.orders.get_order(customer_id, order_id).await;
            }
        }
        match session.step {
            CheckoutStep::Review | CheckoutStep::Processing => {}
            CheckoutStep::Completed | CheckoutStep::Failed => {
                return Err(ServiceError::InvalidOperation(
                    "Checkout session is already finished".to_string(),
                ))
            }
            _ => {
                return Err(ServiceError::InvalidOperation(
                    "Checkout is not ready to place an order".to_string(),
                ))
            }
        }

        let (shipping, billing, payment_method_id) = self.require_review_inputs(&session)?;
        let payment_method = self
            .payment_methods
            .get_payment_method(customer_id, payment_method_id)
            .await?;

        let cart = self.carts.get_cart(session.cart_id).await?;
        if !matches!(cart.status, CartStatus::Active | CartStatus::Converting) {
            return Err(ServiceError::InvalidOperation(
                "Cart is no longer available for checkout".to_string(),
            ));
        }
        let items = self.carts.get_cart_items(session.cart_id).await?;
        let summary = self.pricing.order_summary(&items)?;

        let session = self.set_step(session, CheckoutStep::Processing).await?;

        // Any failure from here on (declined charge, a conflicting amount
        // from a retried attempt, a database error) must hand the session
        // back to review so the customer can retry or edit.
        match self
            .charge_and_place(customer_id, &session, &payment_method, cart, shipping, billing, summary)
            .await
        {
            Ok(order) => Ok(order),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "checkout failed, returning session to review");
                let reason = err.to_string();
                let mut active: checkout_session::ActiveModel = session.into();
                active.step = Set(CheckoutStep::Review);
                active.last_error = Set(Some(reason.clone()));
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
                self.event_sender
                    .send(Event::CheckoutFailed { session_id, reason })
                    .await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn charge_and_place(
        &self,
        customer_id: Uuid,
        session: &checkout_session::Model,
        payment_method: &crate::entities::payment_method::Model,
        cart: cart::Model,
        shipping: AddressSnapshot,
        billing: AddressSnapshot,
        summary: OrderSummary,
    ) -> Result<order::Model, ServiceError> {
        let intent = self
            .payment_intents
            .create_intent(session.id, &session.idempotency_key, &summary, &self.currency)
            .await?;

        // A crash after charge but before order creation leaves a succeeded
        // intent already linked; just hand back that order.
        if let Some(order_id) = intent.order_id {
            return self.orders.get_order(customer_id, order_id).await;
        }

        let intent = self.payment_intents.confirm(intent.id, payment_method).await?;

        let txn = self.db.begin().await?;

        let created = self
            .orders
            .create_order_in_txn(
                &txn,
                NewOrder {
                    customer_id,
                    currency: self.currency.clone(),
                    summary,
                    shipping_address: shipping,
                    billing_address: billing,
                    payment_method: PaymentMethodSnapshot::from(payment_method),
                    payment_intent_id: intent.id,
                },
            )
            .await?;

        self.payment_intents
            .attach_order(&txn, intent.id, created.id)
            .await?;

        let mut cart_active: cart::ActiveModel = cart.into();
        cart_active.status = Set(CartStatus::Converted);
        cart_active.updated_at = Set(Utc::now());
        cart_active.update(&txn).await?;

        let now = Utc::now();
        let mut session_active: checkout_session::ActiveModel = session.clone().into();
        session_active.step = Set(CheckoutStep::Completed);
        session_active.order_id = Set(Some(created.id));
        session_active.last_error = Set(None);
        session_active.updated_at = Set(now);
        session_active.completed_at = Set(Some(now));
        session_active.update(&txn).await?;

        txn.commit().await?;

        info!(session_id = %session.id, order_id = %created.id, "checkout completed");
        self.event_sender.send(Event::OrderCreated(created.id)).await;
        self.event_sender
            .send(Event::CheckoutCompleted {
                session_id: session.id,
                order_id: created.id,
            })
            .await;

        Ok(created)
    }

    fn ensure_editable(&self, session: &checkout_session::Model) -> Result<(), ServiceError> {
        match session.step {
            CheckoutStep::Address | CheckoutStep::Payment | CheckoutStep::Review => Ok(()),
            CheckoutStep::Processing => Err(ServiceError::InvalidOperation(
                "Checkout is processing and can no longer be edited".to_string(),
            )),
            CheckoutStep::Completed | CheckoutStep::Failed => Err(ServiceError::InvalidOperation(
                "Checkout session is already finished".to_string(),
            )),
        }
    }

    fn require_review_inputs(
        &self,
        session: &checkout_session::Model,
    ) -> Result<(AddressSnapshot, AddressSnapshot, Uuid), ServiceError> {
        let shipping = session
            .shipping_address
            .as_ref()
            .map(from_json::<AddressSnapshot>)
            .transpose()?
            .ok_or_else(|| {
                ServiceError::InvalidOperation("Shipping address is not set".to_string())
            })?;
        let billing = session
            .billing_address
            .as_ref()
            .map(from_json::<AddressSnapshot>)
            .transpose()?
            .ok_or_else(|| {
                ServiceError::InvalidOperation("Billing address is not set".to_string())
            })?;
        let payment_method_id = session.payment_method_id.ok_or_else(|| {
            ServiceError::InvalidOperation("Payment method is not set".to_string())
        })?;
        Ok((shipping, billing, payment_method_id))
    }

    async fn set_step(
        &self,
        session: checkout_session::Model,
        step: CheckoutStep,
    ) -> Result<checkout_session::Model, ServiceError> {
        let mut active: checkout_session::ActiveModel = session.into();
        active.step = Set(step);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}
