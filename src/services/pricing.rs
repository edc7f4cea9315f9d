//! Order totals: the free-shipping threshold and flat sales tax applied to a
//! cart at review time and again at place-order time.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::cart_item;
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SummaryLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Ephemeral totals computed from the live cart. Never persisted on its own;
/// the values are copied onto the order at placement time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSummary {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub items: Vec<SummaryLine>,
}

impl OrderSummary {
    /// Intent amount in integer minor units (cents), rounded half-up.
    pub fn amount_minor(&self) -> i64 {
        (self.total * Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .try_into()
            .unwrap_or(i64::MAX)
    }
}

#[derive(Clone)]
pub struct PricingService {
    free_shipping_threshold: Decimal,
    flat_shipping_rate: Decimal,
    tax_rate: Decimal,
}

impl PricingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            free_shipping_threshold: config.free_shipping_threshold,
            flat_shipping_rate: config.flat_shipping_rate,
            tax_rate: config.tax_rate,
        }
    }

    /// Compute the summary for a set of cart items. An empty item set is a
    /// caller bug at this layer; checkout guards it before ever pricing.
    pub fn order_summary(&self, items: &[cart_item::Model]) -> Result<OrderSummary, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let lines: Vec<SummaryLine> = items
            .iter()
            .map(|item| SummaryLine {
                product_id: item.product_id,
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total(),
            })
            .collect();

        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
        // Strictly greater than the threshold; an exactly-at-threshold cart
        // still pays the flat rate.
        let shipping = if subtotal > self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping_rate
        };
        let tax = (subtotal * self.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let total = subtotal + shipping + tax;

        Ok(OrderSummary {
            subtotal,
            shipping,
            tax,
            total,
            items: lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn service() -> PricingService {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        PricingService::new(&cfg)
    }

    fn item(unit_price: Decimal, quantity: i32) -> cart_item::Model {
        cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "widget".to_string(),
            quantity,
            unit_price,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn free_shipping_above_the_threshold() {
        let summary = service().order_summary(&[item(dec!(60.00), 1)]).unwrap();
        assert_eq!(summary.subtotal, dec!(60.00));
        assert_eq!(summary.shipping, dec!(0));
        assert_eq!(summary.tax, dec!(4.80));
        assert_eq!(summary.total, dec!(64.80));
    }

    #[test]
    fn flat_rate_below_the_threshold() {
        let summary = service().order_summary(&[item(dec!(40.00), 1)]).unwrap();
        assert_eq!(summary.shipping, dec!(9.99));
        assert_eq!(summary.tax, dec!(3.20));
        assert_eq!(summary.total, dec!(53.19));
    }

    #[test]
    fn exactly_at_the_threshold_still_pays_shipping() {
        let summary = service().order_summary(&[item(dec!(50.00), 1)]).unwrap();
        assert_eq!(summary.shipping, dec!(9.99));
    }

    #[test]
    fn quantities_multiply_into_the_subtotal() {
        let summary = service()
            .order_summary(&[item(dec!(19.99), 2), item(dec!(5.00), 3)])
            .unwrap();
        assert_eq!(summary.subtotal, dec!(54.98));
        assert_eq!(summary.shipping, dec!(0));
    }

    #[test]
    fn amount_minor_rounds_to_cents() {
        let summary = service().order_summary(&[item(dec!(40.00), 1)]).unwrap();
        assert_eq!(summary.amount_minor(), 5319);
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(service().order_summary(&[]).is_err());
    }
}
