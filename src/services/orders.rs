use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{to_json, AddressSnapshot, PaymentMethodSnapshot},
    services::pricing::OrderSummary,
};

/// Everything needed to materialize an order row plus its items. Built by
/// checkout from the session snapshots and the freshly-priced summary.
pub struct NewOrder {
    pub customer_id: Uuid,
    pub currency: String,
    pub summary: OrderSummary,
    pub shipping_address: AddressSnapshot,
    pub billing_address: AddressSnapshot,
    pub payment_method: PaymentMethodSnapshot,
    pub payment_intent_id: Uuid,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    estimated_delivery_days: i64,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, config: &AppConfig) -> Self {
        Self {
            db,
            event_sender,
            estimated_delivery_days: config.estimated_delivery_days,
        }
    }

    /// Inserts the order and its items inside the caller's transaction so
    /// order creation, intent linkage, and cart conversion commit together.
    /// Snapshots arrive by value; the order never references live rows.
    pub async fn create_order_in_txn<C>(
        &self,
        txn: &C,
        new_order: NewOrder,
    ) -> Result<order::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = self.next_order_number(txn).await?;

        let model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            customer_id: Set(new_order.customer_id),
            status: Set(OrderStatus::Pending),
            currency: Set(new_order.currency),
            subtotal: Set(new_order.summary.subtotal),
            shipping_total: Set(new_order.summary.shipping),
            tax_total: Set(new_order.summary.tax),
            total: Set(new_order.summary.total),
            shipping_address: Set(to_json(&new_order.shipping_address)?),
            billing_address: Set(to_json(&new_order.billing_address)?),
            payment_method: Set(to_json(&new_order.payment_method)?),
            payment_intent_id: Set(Some(new_order.payment_intent_id)),
            tracking_number: Set(None),
            estimated_delivery: Set(Some(now + Duration::days(self.estimated_delivery_days))),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let created = model.insert(txn).await?;

        for line in &new_order.summary.items {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total),
                created_at: Set(now),
            };
            item.insert(txn).await?;
        }

        info!(order_id = %created.id, order_number = %created.order_number, "order created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order_by_number(
        &self,
        customer_id: Uuid,
        order_number: &str,
    ) -> Result<order::Model, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }

    /// Newest-first page of a customer's orders plus the total count.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    pub async fn get_order_items(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        // Ownership check before exposing line items.
        self.get_order(customer_id, order_id).await?;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Cancels an order if its status still allows it. Delivered and
    /// cancelled orders are terminal and shipped orders are already in the
    /// carrier's hands.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.can_cancel() {
            return Err(ServiceError::InvalidOperation(format!(
                "order cannot be cancelled from status {}",
                order.status
            )));
        }

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, "order cancelled");
        self.event_sender.send(Event::OrderCancelled(order_id)).await;
        Ok(updated)
    }

    /// Fulfillment-side status update. Transitions are validated against the
    /// lifecycle table; anything else is rejected without touching the row.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidOperation(format!(
                "invalid order status transition from {} to {}",
                old_status, new_status
            )));
        }

        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = %order_id, %old_status, %new_status, "order status updated");
        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;
        Ok(updated)
    }

    // Sequential human-facing numbers, derived from the row count inside the
    // creating transaction.
    async fn next_order_number<C>(&self, txn: &C) -> Result<String, ServiceError>
    where
        C: ConnectionTrait,
    {
        let count = OrderEntity::find().count(txn).await?;
        Ok(format!("ORD-{}", 100_000 + count + 1))
    }
}
