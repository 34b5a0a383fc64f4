use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::DomainError;
use super::fulfillment::Coverage;

/// Persisted lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    InProduction,
    Fulfilled,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::InProduction => "in_production",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// The state reached by applying `event`, or `None` when the transition is illegal.
    pub fn next(self, event: OrderEvent) -> Option<OrderStatus> {
        use OrderEvent::*;
        use OrderStatus::*;
        match (self, event) {
            (Draft, BeginProduction) => Some(InProduction),
            (Draft | InProduction, Cancel) => Some(Cancelled),
            (Cancelled, Reopen) => Some(Draft),
            (InProduction, Fulfill) => Some(Fulfilled),
            (Fulfilled, Complete) => Some(Completed),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            "in_production" => Ok(OrderStatus::InProduction),
            "fulfilled" => Ok(OrderStatus::Fulfilled),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::Internal(format!("unknown order status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    BeginProduction,
    Cancel,
    Reopen,
    Fulfill,
    Complete,
}

impl OrderEvent {
    pub fn action(&self) -> &'static str {
        match self {
            OrderEvent::BeginProduction => "submit",
            OrderEvent::Cancel => "cancel",
            OrderEvent::Reopen => "reopen",
            OrderEvent::Fulfill => "fulfill",
            OrderEvent::Complete => "complete",
        }
    }
}

/// State shown to merchants. `PartiallyFulfilled` is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Draft,
    InProduction,
    PartiallyFulfilled,
    Fulfilled,
    Completed,
    Cancelled,
}

/// Tenant owning an order: a storefront connection or a user placing manual orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderOwner {
    Store(Uuid),
    User(Uuid),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping: i64,
    pub tax: i64,
    pub discount: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub uid: String,
    pub owner: OrderOwner,
    pub external_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub currency: String,
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub country_code: Option<String>,
    pub production_order_id: Option<String>,
    pub promised_dispatch_date: Option<NaiveDate>,
    pub placed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub raw_payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        owner: OrderOwner,
        external_id: Option<String>,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            uid: generate_uid(),
            owner,
            external_id,
            name: String::new(),
            email: None,
            currency: currency.into(),
            totals: OrderTotals::default(),
            status: OrderStatus::Draft,
            country_code: None,
            production_order_id: None,
            promised_dispatch_date: None,
            placed_at: None,
            submitted_at: None,
            fulfilled_at: None,
            completed_at: None,
            cancelled_at: None,
            raw_payload: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn store_id(&self) -> Option<Uuid> {
        match self.owner {
            OrderOwner::Store(id) => Some(id),
            OrderOwner::User(_) => None,
        }
    }

    pub fn may(&self, event: OrderEvent) -> bool {
        self.status.next(event).is_some()
    }

    /// Apply a lifecycle event, stamping the matching timestamp.
    ///
    /// Illegal transitions leave the order untouched.
    pub fn apply(
        &mut self,
        event: OrderEvent,
        at: DateTime<Utc>,
    ) -> Result<OrderStatus, DomainError> {
        let next = self.status.next(event).ok_or_else(|| DomainError::StateTransition {
            action: event.action(),
            state: self.status.to_string(),
        })?;
        match event {
            OrderEvent::BeginProduction => self.submitted_at = Some(at),
            OrderEvent::Cancel => self.cancelled_at = Some(at),
            OrderEvent::Reopen => self.cancelled_at = None,
            OrderEvent::Fulfill => self.fulfilled_at = Some(at),
            OrderEvent::Complete => self.completed_at = Some(at),
        }
        self.status = next;
        self.updated_at = at;
        Ok(next)
    }

    pub fn display_status(&self, coverage: &Coverage) -> DisplayStatus {
        match self.status {
            OrderStatus::Draft => DisplayStatus::Draft,
            OrderStatus::InProduction if coverage.is_partial() => DisplayStatus::PartiallyFulfilled,
            OrderStatus::InProduction => DisplayStatus::InProduction,
            OrderStatus::Fulfilled => DisplayStatus::Fulfilled,
            OrderStatus::Completed => DisplayStatus::Completed,
            OrderStatus::Cancelled => DisplayStatus::Cancelled,
        }
    }
}

/// Public order identifier, e.g. `PO-3F9A1C0B7D2E`.
pub fn generate_uid() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("PO-{}", &raw[..12])
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub external_line_id: Option<String>,
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub tax: i64,
    pub discount: i64,
    pub product_variant_id: Option<Uuid>,
    /// Upstream line as received, kept for audit.
    pub snapshot: Value,
    /// Soft-delete marker; items are never hard-deleted.
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(order_id: Uuid, title: impl Into<String>, quantity: i32) -> Self {
        let now = Utc::now();
        OrderItem {
            id: Uuid::new_v4(),
            order_id,
            external_line_id: None,
            title: title.into(),
            sku: None,
            quantity,
            unit_price: 0,
            tax: 0,
            discount: 0,
            product_variant_id: None,
            snapshot: Value::Null,
            removed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: Option<String>,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province_code: Option<String>,
    pub zip: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
}

impl ShippingAddress {
    /// Blank out personal data, keeping only the country for reporting.
    pub fn redacted(&self) -> Self {
        ShippingAddress {
            country_code: self.country_code.clone(),
            ..ShippingAddress::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> Order {
        Order::new(OrderOwner::Store(Uuid::new_v4()), Some("1001".into()), "USD")
    }

    #[test]
    fn submit_only_from_draft() {
        let mut order = draft();
        assert_eq!(
            order.apply(OrderEvent::BeginProduction, Utc::now()).unwrap(),
            OrderStatus::InProduction
        );
        assert!(order.submitted_at.is_some());

        let err = order.apply(OrderEvent::BeginProduction, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { action: "submit", .. }));
        assert_eq!(order.status, OrderStatus::InProduction);
    }

    #[test]
    fn cancel_and_reopen_cycle() {
        let mut order = draft();
        order.apply(OrderEvent::Cancel, Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancelled_at.is_some());

        order.apply(OrderEvent::Reopen, Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Draft);
        assert!(order.cancelled_at.is_none());
    }

    #[test]
    fn in_production_can_cancel_but_fulfilled_cannot() {
        let mut order = draft();
        order.apply(OrderEvent::BeginProduction, Utc::now()).unwrap();
        assert!(order.may(OrderEvent::Cancel));

        order.apply(OrderEvent::Fulfill, Utc::now()).unwrap();
        assert!(!order.may(OrderEvent::Cancel));
        assert!(order.may(OrderEvent::Complete));
    }

    #[test]
    fn fulfill_requires_in_production() {
        let mut order = draft();
        assert!(order.apply(OrderEvent::Fulfill, Utc::now()).is_err());
        assert!(order.fulfilled_at.is_none());
    }

    #[test]
    fn status_string_roundtrip() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::InProduction,
            OrderStatus::Fulfilled,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("partially_fulfilled".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn uid_has_prefix_and_fixed_length() {
        let uid = generate_uid();
        assert!(uid.starts_with("PO-"));
        assert_eq!(uid.len(), 15);
    }

    #[test]
    fn redaction_keeps_only_country() {
        let address = ShippingAddress {
            name: Some("Ada".into()),
            address1: Some("1 Loop".into()),
            country_code: Some("GB".into()),
            ..ShippingAddress::default()
        };
        let redacted = address.redacted();
        assert_eq!(redacted.name, None);
        assert_eq!(redacted.address1, None);
        assert_eq!(redacted.country_code.as_deref(), Some("GB"));
    }
}
