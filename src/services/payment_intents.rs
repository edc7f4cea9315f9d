use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::GatewayConfig,
    entities::{
        payment_intent::{self, Entity as PaymentIntentEntity, PaymentIntentStatus},
        payment_method,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::OrderSummary,
};

/// Outcome of a gateway confirmation round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approved { charge_reference: String },
    Declined { reason: String },
}

/// Seam for the payment gateway. The production implementation would call
/// the real processor; the bundled simulator drives tests and development.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm(
        &self,
        intent: &payment_intent::Model,
        payment_method: &payment_method::Model,
    ) -> Result<GatewayOutcome, ServiceError>;
}

/// Simulated gateway: fixed latency, configurable success rate, and
/// deterministic outcomes for designated test cards (by stored last4).
pub struct SimulatedGateway {
    latency: Duration,
    success_rate: f64,
}

/// Test card last4 that always succeeds (4242 4242 4242 4242).
pub const TEST_CARD_SUCCESS_LAST4: &str = "4242";
/// Test card last4 that always declines (4000 0000 0000 0002).
pub const TEST_CARD_DECLINE_LAST4: &str = "0002";

impl SimulatedGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            success_rate: config.success_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn confirm(
        &self,
        intent: &payment_intent::Model,
        payment_method: &payment_method::Model,
    ) -> Result<GatewayOutcome, ServiceError> {
        // Simulated processor round-trip.
        tokio::time::sleep(self.latency).await;
        info!(
            intent_id = %intent.id,
            amount_minor = intent.amount_minor,
            last4 = %payment_method.last4,
            "simulated gateway charge"
        );

        let approved = match payment_method.last4.as_str() {
            TEST_CARD_DECLINE_LAST4 => false,
            TEST_CARD_SUCCESS_LAST4 => true,
            _ => rand::thread_rng().gen_bool(self.success_rate),
        };

        if approved {
            Ok(GatewayOutcome::Approved {
                charge_reference: format!("ch_{}", Uuid::new_v4().simple()),
            })
        } else {
            Ok(GatewayOutcome::Declined {
                reason: "card was declined".to_string(),
            })
        }
    }
}

/// Service owning the persisted payment-intent lifecycle.
#[derive(Clone)]
pub struct PaymentIntentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
}

impl PaymentIntentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Creates an intent for a checkout attempt, or returns the existing one
    /// for the same idempotency key. Amount is integer minor units derived
    /// from the summary total. The payment method is already selected by the
    /// time checkout reaches this step, so a fresh intent starts at
    /// `requires_confirmation`.
    #[instrument(skip(self, summary), fields(session_id = %checkout_session_id))]
    pub async fn create_intent(
        &self,
        checkout_session_id: Uuid,
        idempotency_key: &str,
        summary: &OrderSummary,
        currency: &str,
    ) -> Result<payment_intent::Model, ServiceError> {
        if let Some(existing) = PaymentIntentEntity::find()
            .filter(payment_intent::Column::IdempotencyKey.eq(idempotency_key))
            .one(&*self.db)
            .await?
        {
            if existing.amount_minor != summary.amount_minor() {
                // Same attempt, different amount: the cart changed under a
                // retried key. Refuse rather than charge a stale total.
                return Err(ServiceError::Conflict(
                    "Checkout attempt amount changed; restart checkout".to_string(),
                ));
            }
            info!(intent_id = %existing.id, "reusing payment intent for idempotency key");
            return Ok(existing);
        }

        let now = Utc::now();
        let intent_id = Uuid::new_v4();
        let model = payment_intent::ActiveModel {
            id: Set(intent_id),
            checkout_session_id: Set(checkout_session_id),
            idempotency_key: Set(idempotency_key.to_string()),
            client_secret: Set(format!("pi_{}_secret_{}", intent_id.simple(), Uuid::new_v4().simple())),
            amount_minor: Set(summary.amount_minor()),
            currency: Set(currency.to_string()),
            status: Set(PaymentIntentStatus::RequiresConfirmation),
            order_id: Set(None),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        info!(intent_id = %created.id, amount_minor = created.amount_minor, "payment intent created");
        self.event_sender
            .send(Event::PaymentIntentCreated(created.id))
            .await;
        Ok(created)
    }

    /// Confirms an intent against the gateway. On approval the intent moves
    /// to `succeeded`; on decline it is parked back at
    /// `requires_confirmation` with the failure recorded, and the caller
    /// must not create an order.
    #[instrument(skip(self, payment_method), fields(intent_id = %intent_id))]
    pub async fn confirm(
        &self,
        intent_id: Uuid,
        payment_method: &payment_method::Model,
    ) -> Result<payment_intent::Model, ServiceError> {
        let intent = PaymentIntentEntity::find_by_id(intent_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment intent {} not found", intent_id))
            })?;

        match intent.status {
            // Confirming an already-succeeded intent is a retried request;
            // the idempotency key did its job, return as-is.
            PaymentIntentStatus::Succeeded => return Ok(intent),
            PaymentIntentStatus::Canceled => {
                return Err(ServiceError::InvalidOperation(
                    "Payment intent is canceled".to_string(),
                ))
            }
            PaymentIntentStatus::RequiresConfirmation | PaymentIntentStatus::Processing => {}
            other => {
                return Err(ServiceError::InvalidOperation(format!(
                    "Payment intent cannot be confirmed from status {:?}",
                    other
                )))
            }
        }

        // Mark processing before the gateway call so a crash mid-confirm is
        // visible and the retry path goes through the same idempotency key.
        let mut active: payment_intent::ActiveModel = intent.clone().into();
        active.status = Set(PaymentIntentStatus::Processing);
        active.updated_at = Set(Utc::now());
        let intent = active.update(&*self.db).await?;

        let outcome = self.gateway.confirm(&intent, payment_method).await?;

        match outcome {
            GatewayOutcome::Approved { charge_reference } => {
                let mut active: payment_intent::ActiveModel = intent.into();
                active.status = Set(PaymentIntentStatus::Succeeded);
                active.last_error = Set(None);
                active.updated_at = Set(Utc::now());
                let updated = active.update(&*self.db).await?;

                info!(intent_id = %intent_id, %charge_reference, "payment confirmed");
                self.event_sender
                    .send(Event::PaymentSucceeded(intent_id))
                    .await;
                Ok(updated)
            }
            GatewayOutcome::Declined { reason } => {
                let mut active: payment_intent::ActiveModel = intent.into();
                active.status = Set(PaymentIntentStatus::RequiresConfirmation);
                active.last_error = Set(Some(reason.clone()));
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;

                warn!(intent_id = %intent_id, %reason, "payment declined");
                self.event_sender
                    .send(Event::PaymentDeclined(intent_id))
                    .await;
                Err(ServiceError::PaymentFailed(format!(
                    "payment declined: {}",
                    reason
                )))
            }
        }
    }

    /// Links a succeeded intent to its order inside the caller's
    /// transaction.
    pub async fn attach_order<C>(
        &self,
        txn: &C,
        intent_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), ServiceError>
    where
        C: sea_orm::ConnectionTrait,
    {
        let intent = PaymentIntentEntity::find_by_id(intent_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment intent {} not found", intent_id))
            })?;

        let mut active: payment_intent::ActiveModel = intent.into();
        active.order_id = Set(Some(order_id));
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;
        Ok(())
    }

    /// Intents that charged but never got an order attached: the
    /// reconciliation gap a crashed checkout leaves behind.
    pub async fn find_orphaned_intents(
        &self,
    ) -> Result<Vec<payment_intent::Model>, ServiceError> {
        let orphans = PaymentIntentEntity::find()
            .filter(payment_intent::Column::Status.eq(PaymentIntentStatus::Succeeded))
            .filter(payment_intent::Column::OrderId.is_null())
            .all(&*self.db)
            .await?;
        Ok(orphans)
    }

    /// Periodic reconciliation sweep. Runs for the lifetime of the
    /// process and logs every charged-but-unlinked intent so it can be
    /// repaired or refunded.
    pub async fn sweep_orphaned_intents(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.find_orphaned_intents().await {
                Ok(orphans) => {
                    for intent in orphans {
                        warn!(
                            intent_id = %intent.id,
                            checkout_session_id = %intent.checkout_session_id,
                            amount_minor = intent.amount_minor,
                            "payment intent succeeded but no order was attached"
                        );
                    }
                }
                Err(e) => {
                    error!("orphaned intent sweep failed: {}", e);
                }
            }
        }
    }
}
