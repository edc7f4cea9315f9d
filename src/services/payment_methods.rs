use chrono::{Datelike, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    PaginatorTrait, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::payment_method::{self, Entity as PaymentMethodEntity, PaymentMethodKind},
    errors::ServiceError,
    events::{Event, EventSender},
    services::cards,
};

/// Raw card input. The number and CVC live only for the duration of this
/// request; validation derives brand/last4/expiry and the rest is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentMethodRequest {
    #[validate(length(min = 1, message = "Card number is required"))]
    pub card_number: String,
    #[validate(length(min = 1, message = "CVC is required"))]
    pub cvc: String,
    pub exp_month: i16,
    pub exp_year: i16,
    #[serde(default)]
    pub set_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodResponse {
    pub id: Uuid,
    pub kind: PaymentMethodKind,
    pub last4: String,
    pub brand: Option<String>,
    pub exp_month: Option<i16>,
    pub exp_year: Option<i16>,
    pub is_default: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<payment_method::Model> for PaymentMethodResponse {
    fn from(model: payment_method::Model) -> Self {
        Self {
            id: model.id,
            kind: model.kind,
            last4: model.last4,
            brand: model.brand,
            exp_month: model.exp_month,
            exp_year: model.exp_year,
            is_default: model.is_default,
            created_at: model.created_at,
        }
    }
}

/// Service for managing tokenized payment methods.
#[derive(Clone)]
pub struct PaymentMethodService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PaymentMethodService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Active payment methods for a customer, defaults first.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_payment_methods(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<payment_method::Model>, ServiceError> {
        let methods = PaymentMethodEntity::find()
            .filter(payment_method::Column::CustomerId.eq(customer_id))
            .filter(payment_method::Column::IsActive.eq(true))
            .order_by_desc(payment_method::Column::IsDefault)
            .order_by_desc(payment_method::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(methods)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, payment_method_id = %payment_method_id))]
    pub async fn get_payment_method(
        &self,
        customer_id: Uuid,
        payment_method_id: Uuid,
    ) -> Result<payment_method::Model, ServiceError> {
        PaymentMethodEntity::find_by_id(payment_method_id)
            .filter(payment_method::Column::CustomerId.eq(customer_id))
            .filter(payment_method::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment method {} not found", payment_method_id))
            })
    }

    /// Validates the raw card, persists the derived token. The first active
    /// method for a customer becomes the default automatically; an explicit
    /// `set_default` displaces the current default in the same transaction.
    #[instrument(skip(self, request), fields(customer_id = %customer_id))]
    pub async fn create_payment_method(
        &self,
        customer_id: Uuid,
        request: CreatePaymentMethodRequest,
    ) -> Result<payment_method::Model, ServiceError> {
        request.validate()?;

        let digits = cards::validate_card_number(&request.card_number)?;
        let brand = cards::detect_brand(&digits);
        cards::validate_cvc(&request.cvc, brand)?;

        let now = Utc::now();
        cards::validate_expiry(
            request.exp_month,
            request.exp_year,
            now.year() as i16,
            now.month() as i16,
        )?;

        let last4 = cards::last4(&digits);
        // Raw PAN and CVC go no further than this point.
        drop(digits);

        let txn = self.db.begin().await?;

        let existing_count = PaymentMethodEntity::find()
            .filter(payment_method::Column::CustomerId.eq(customer_id))
            .filter(payment_method::Column::IsActive.eq(true))
            .count(&txn)
            .await?;

        let is_default = existing_count == 0 || request.set_default;
        if is_default && existing_count > 0 {
            PaymentMethodEntity::update_many()
                .col_expr(payment_method::Column::IsDefault, Expr::value(false))
                .filter(payment_method::Column::CustomerId.eq(customer_id))
                .exec(&txn)
                .await?;
        }

        let payment_method_id = Uuid::new_v4();
        let model = payment_method::ActiveModel {
            id: Set(payment_method_id),
            customer_id: Set(customer_id),
            kind: Set(PaymentMethodKind::Card),
            last4: Set(last4),
            brand: Set(Some(brand.to_string())),
            exp_month: Set(Some(request.exp_month)),
            exp_year: Set(Some(request.exp_year)),
            is_default: Set(is_default),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&txn).await?;
        txn.commit().await?;

        info!(payment_method_id = %payment_method_id, brand = %brand, "payment method created");
        self.event_sender
            .send(Event::PaymentMethodCreated(payment_method_id))
            .await;
        Ok(created)
    }

    /// Soft delete: the row stays for historical orders, but is no longer
    /// listed or usable at checkout.
    #[instrument(skip(self), fields(customer_id = %customer_id, payment_method_id = %payment_method_id))]
    pub async fn delete_payment_method(
        &self,
        customer_id: Uuid,
        payment_method_id: Uuid,
    ) -> Result<(), ServiceError> {
        let existing = self
            .get_payment_method(customer_id, payment_method_id)
            .await?;

        let mut active: payment_method::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.is_default = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        info!(payment_method_id = %payment_method_id, "payment method removed");
        self.event_sender
            .send(Event::PaymentMethodRemoved(payment_method_id))
            .await;
        Ok(())
    }

    /// Default active payment method, if any.
    pub async fn default_payment_method(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<payment_method::Model>, ServiceError> {
        let found = PaymentMethodEntity::find()
            .filter(payment_method::Column::CustomerId.eq(customer_id))
            .filter(payment_method::Column::IsActive.eq(true))
            .filter(payment_method::Column::IsDefault.eq(true))
            .one(&*self.db)
            .await?;
        Ok(found)
    }
}
