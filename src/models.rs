//! Copied-by-value snapshots embedded into orders and checkout sessions.
//!
//! Orders never reference live address or payment-method rows; they embed
//! these snapshots at creation time, so editing or deleting the source
//! record afterwards cannot change a placed order.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{address, payment_method};
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AddressSnapshot {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub address_line_1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line_2: Option<String>,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl From<&address::Model> for AddressSnapshot {
    fn from(model: &address::Model) -> Self {
        Self {
            first_name: model.first_name.clone(),
            last_name: model.last_name.clone(),
            company: model.company.clone(),
            address_line_1: model.address_line_1.clone(),
            address_line_2: model.address_line_2.clone(),
            city: model.city.clone(),
            province: model.province.clone(),
            postal_code: model.postal_code.clone(),
            country_code: model.country_code.clone(),
            phone: model.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodSnapshot {
    pub kind: payment_method::PaymentMethodKind,
    pub last4: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<i16>,
}

impl From<&payment_method::Model> for PaymentMethodSnapshot {
    fn from(model: &payment_method::Model) -> Self {
        Self {
            kind: model.kind,
            last4: model.last4.clone(),
            brand: model.brand.clone(),
            exp_month: model.exp_month,
            exp_year: model.exp_year,
        }
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|e| ServiceError::InternalError(format!("snapshot serialization failed: {e}")))
}

pub fn from_json<T: for<'de> Deserialize<'de>>(
    value: &serde_json::Value,
) -> Result<T, ServiceError> {
    serde_json::from_value(value.clone())
        .map_err(|e| ServiceError::InternalError(format!("snapshot deserialization failed: {e}")))
}
