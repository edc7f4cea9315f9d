use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::cart::{self, CartStatus, Entity as CartEntity},
    entities::cart_item::{self, Entity as CartItemEntity},
    errors::ServiceError,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    #[validate(range(min = 1, max = 999, message = "Quantity must be between 1 and 999"))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_cart(
        &self,
        customer_id: Uuid,
        currency: &str,
    ) -> Result<cart::Model, ServiceError> {
        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            currency: Set(currency.to_string()),
            status: Set(CartStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&*self.db).await?;
        info!(cart_id = %created.id, "cart created");
        Ok(created)
    }

    pub async fn get_cart(&self, cart_id: Uuid) -> Result<cart::Model, ServiceError> {
        CartEntity::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    pub async fn get_cart_items(
        &self,
        cart_id: Uuid,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        let items = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Adds a line to an active cart. If the product is already present the
    /// quantity is bumped instead of adding a duplicate line. Price comes
    /// from the request because catalog lookup is out of scope here.
    #[instrument(skip(self, request), fields(cart_id = %cart_id))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        request: AddCartItemRequest,
    ) -> Result<cart_item::Model, ServiceError> {
        request.validate()?;
        if request.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit price cannot be negative".to_string(),
            ));
        }

        let cart = self.get_cart(cart_id).await?;
        if cart.status != CartStatus::Active {
            return Err(ServiceError::InvalidOperation(
                "Cart is no longer active".to_string(),
            ));
        }

        let existing = CartItemEntity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(request.product_id))
            .one(&*self.db)
            .await?;

        let item = if let Some(existing) = existing {
            let quantity = existing.quantity;
            let mut active: cart_item::ActiveModel = existing.into();
            active.quantity = Set(quantity + request.quantity);
            active.update(&*self.db).await?
        } else {
            let model = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                product_id: Set(request.product_id),
                name: Set(request.name),
                quantity: Set(request.quantity),
                unit_price: Set(request.unit_price),
                created_at: Set(Utc::now()),
            };
            model.insert(&*self.db).await?
        };

        let mut cart_active: cart::ActiveModel = cart.into();
        cart_active.updated_at = Set(Utc::now());
        cart_active.update(&*self.db).await?;

        Ok(item)
    }
}
