use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::address::{self, AddressKind, Entity as AddressEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

// Loose international phone pattern: optional +, digits with common
// separators, 7-20 characters total.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9 ().\-]{7,20}$").unwrap());

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let digit_count = value.chars().filter(|c| c.is_ascii_digit()).count();
    if PHONE_RE.is_match(value) && (7..=15).contains(&digit_count) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateAddressRequest {
    pub kind: AddressKind,
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    pub company: Option<String>,
    #[validate(length(min = 1, message = "Address line 1 is required"))]
    pub address_line_1: String,
    pub address_line_2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State/province is required"))]
    pub province: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country_code: String,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateAddressRequest {
    #[validate(length(min = 1, message = "First name must not be empty"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, message = "Last name must not be empty"))]
    pub last_name: Option<String>,
    pub company: Option<String>,
    #[validate(length(min = 1, message = "Address line 1 must not be empty"))]
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    #[validate(length(min = 1, message = "City must not be empty"))]
    pub city: Option<String>,
    #[validate(length(min = 1, message = "State/province must not be empty"))]
    pub province: Option<String>,
    #[validate(length(min = 1, message = "Postal code must not be empty"))]
    pub postal_code: Option<String>,
    #[validate(length(min = 1, message = "Country must not be empty"))]
    pub country_code: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: Option<String>,
    pub is_default: Option<bool>,
}

/// Service for managing customer shipping and billing addresses.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn list_addresses(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<address::Model>, ServiceError> {
        let addresses = AddressEntity::find()
            .filter(address::Column::CustomerId.eq(customer_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(addresses)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id, address_id = %address_id))]
    pub async fn get_address(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<address::Model, ServiceError> {
        AddressEntity::find_by_id(address_id)
            .filter(address::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))
    }

    /// Creates an address. A new default displaces any existing default of
    /// the same kind in the same transaction (clear-then-set), so the
    /// one-default-per-kind invariant holds after every call.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, kind = ?request.kind))]
    pub async fn create_address(
        &self,
        customer_id: Uuid,
        request: CreateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let address_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        if request.is_default {
            AddressEntity::update_many()
                .col_expr(address::Column::IsDefault, Expr::value(false))
                .filter(address::Column::CustomerId.eq(customer_id))
                .filter(address::Column::Kind.eq(request.kind))
                .exec(&txn)
                .await?;
        }

        let model = address::ActiveModel {
            id: Set(address_id),
            customer_id: Set(customer_id),
            kind: Set(request.kind),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            company: Set(request.company),
            address_line_1: Set(request.address_line_1),
            address_line_2: Set(request.address_line_2),
            city: Set(request.city),
            province: Set(request.province),
            postal_code: Set(request.postal_code),
            country_code: Set(request.country_code),
            phone: Set(request.phone),
            is_default: Set(request.is_default),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&txn).await?;
        txn.commit().await?;

        info!(address_id = %address_id, "address created");
        if created.is_default {
            self.event_sender
                .send(Event::AddressDefaultChanged {
                    customer_id,
                    address_id,
                })
                .await;
        }
        Ok(created)
    }

    /// Partial update. Setting `is_default = true` elects this address as
    /// the sole default for its kind (last writer wins).
    #[instrument(skip(self, request), fields(customer_id = %customer_id, address_id = %address_id))]
    pub async fn update_address(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
        request: UpdateAddressRequest,
    ) -> Result<address::Model, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let existing = AddressEntity::find_by_id(address_id)
            .filter(address::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;

        let kind = existing.kind;
        let becomes_default = request.is_default == Some(true) && !existing.is_default;

        if becomes_default {
            AddressEntity::update_many()
                .col_expr(address::Column::IsDefault, Expr::value(false))
                .filter(address::Column::CustomerId.eq(customer_id))
                .filter(address::Column::Kind.eq(kind))
                .exec(&txn)
                .await?;
        }

        let mut active: address::ActiveModel = existing.into();
        if let Some(first_name) = request.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = request.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(company) = request.company {
            active.company = Set(Some(company));
        }
        if let Some(address_line_1) = request.address_line_1 {
            active.address_line_1 = Set(address_line_1);
        }
        if let Some(address_line_2) = request.address_line_2 {
            active.address_line_2 = Set(Some(address_line_2));
        }
        if let Some(city) = request.city {
            active.city = Set(city);
        }
        if let Some(province) = request.province {
            active.province = Set(province);
        }
        if let Some(postal_code) = request.postal_code {
            active.postal_code = Set(postal_code);
        }
        if let Some(country_code) = request.country_code {
            active.country_code = Set(country_code);
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(is_default) = request.is_default {
            active.is_default = Set(is_default);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!(address_id = %address_id, "address updated");
        if becomes_default {
            self.event_sender
                .send(Event::AddressDefaultChanged {
                    customer_id,
                    address_id,
                })
                .await;
        }
        Ok(updated)
    }

    /// Deletes an address. Orders embed snapshots, so no cascade is needed.
    #[instrument(skip(self), fields(customer_id = %customer_id, address_id = %address_id))]
    pub async fn delete_address(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = AddressEntity::delete_many()
            .filter(address::Column::Id.eq(address_id))
            .filter(address::Column::CustomerId.eq(customer_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Address {} not found",
                address_id
            )));
        }
        info!(address_id = %address_id, "address deleted");
        Ok(())
    }

    /// Default address of the given kind, if one exists.
    pub async fn default_address(
        &self,
        customer_id: Uuid,
        kind: AddressKind,
    ) -> Result<Option<address::Model>, ServiceError> {
        let found = AddressEntity::find()
            .filter(address::Column::CustomerId.eq(customer_id))
            .filter(address::Column::Kind.eq(kind))
            .filter(address::Column::IsDefault.eq(true))
            .one(&*self.db)
            .await?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_pattern_accepts_common_formats() {
        assert!(validate_phone("+1 555 123 4567").is_ok());
        assert!(validate_phone("(555) 123-4567").is_ok());
        assert!(validate_phone("5551234567").is_ok());
        assert!(validate_phone("+44 20 7946 0958").is_ok());
    }

    #[test]
    fn phone_pattern_rejects_garbage() {
        assert!(validate_phone("not a phone").is_err());
        assert!(validate_phone("123").is_err());
        assert!(validate_phone("").is_err());
        assert!(validate_phone("(((-)))").is_err());
    }
}
