use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::order::OrderItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Shipped,
    InTransit,
    Delivered,
    Cancelled,
    Failed,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::InTransit => "in_transit",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
            FulfillmentStatus::Failed => "failed",
        }
    }

    /// Whether the shipment still accounts for the quantities it carries.
    pub fn counts_toward_quantity(&self) -> bool {
        !matches!(self, FulfillmentStatus::Cancelled | FulfillmentStatus::Failed)
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FulfillmentStatus::Pending),
            "shipped" => Ok(FulfillmentStatus::Shipped),
            "in_transit" => Ok(FulfillmentStatus::InTransit),
            "delivered" => Ok(FulfillmentStatus::Delivered),
            "cancelled" => Ok(FulfillmentStatus::Cancelled),
            "failed" => Ok(FulfillmentStatus::Failed),
            other => Err(DomainError::validation(format!("unknown fulfillment status '{other}'"))),
        }
    }
}

/// Where a shipment event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentSource {
    Production,
    Storefront,
    Manual,
}

impl FulfillmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentSource::Production => "production",
            FulfillmentSource::Storefront => "storefront",
            FulfillmentSource::Manual => "manual",
        }
    }
}

impl FromStr for FulfillmentSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(FulfillmentSource::Production),
            "storefront" => Ok(FulfillmentSource::Storefront),
            "manual" => Ok(FulfillmentSource::Manual),
            other => Err(DomainError::Internal(format!("unknown fulfillment source '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub carrier: Option<String>,
    pub number: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentLineItem {
    pub id: Uuid,
    pub fulfillment_id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fulfillment {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Idempotency key of the shipment event that created this record.
    pub external_id: String,
    pub source: FulfillmentSource,
    pub status: FulfillmentStatus,
    pub tracking: Tracking,
    pub shipped_at: Option<DateTime<Utc>>,
    pub line_items: Vec<FulfillmentLineItem>,
    /// Storefront fulfillment created from this one, as a [`platform_key`].
    pub platform_fulfillment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comparable form of a storefront fulfillment id. Shopify hands out global
/// ids (`gid://shopify/Fulfillment/42`) but webhooks carry the bare `42`.
pub fn platform_key(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

impl Fulfillment {
    pub fn new(
        order_id: Uuid,
        external_id: impl Into<String>,
        source: FulfillmentSource,
        status: FulfillmentStatus,
        tracking: Tracking,
        lines: &[(Uuid, i32)],
    ) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Fulfillment {
            id,
            order_id,
            external_id: external_id.into(),
            source,
            status,
            tracking,
            shipped_at: Some(now),
            line_items: lines
                .iter()
                .map(|(order_item_id, quantity)| FulfillmentLineItem {
                    id: Uuid::new_v4(),
                    fulfillment_id: id,
                    order_item_id: *order_item_id,
                    quantity: *quantity,
                })
                .collect(),
            platform_fulfillment_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Ordered versus fulfilled quantity for every active item of an order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    ordered: HashMap<Uuid, i32>,
    fulfilled: HashMap<Uuid, i32>,
}

impl Coverage {
    pub fn compute(items: &[OrderItem], fulfillments: &[Fulfillment]) -> Self {
        let ordered: HashMap<Uuid, i32> = items
            .iter()
            .filter(|i| i.is_active())
            .map(|i| (i.id, i.quantity))
            .collect();
        let mut fulfilled: HashMap<Uuid, i32> = HashMap::new();
        for f in fulfillments.iter().filter(|f| f.status.counts_toward_quantity()) {
            for line in &f.line_items {
                *fulfilled.entry(line.order_item_id).or_default() += line.quantity;
            }
        }
        Coverage { ordered, fulfilled }
    }

    pub fn fulfilled(&self, item_id: Uuid) -> i32 {
        self.fulfilled.get(&item_id).copied().unwrap_or(0)
    }

    pub fn remaining(&self, item_id: Uuid) -> i32 {
        self.ordered.get(&item_id).copied().unwrap_or(0) - self.fulfilled(item_id)
    }

    pub fn total_ordered(&self) -> i32 {
        self.ordered.values().sum()
    }

    pub fn total_fulfilled(&self) -> i32 {
        self.ordered.keys().map(|id| self.fulfilled(*id).min(self.ordered[id])).sum()
    }

    /// Every active item is fully shipped.
    pub fn is_complete(&self) -> bool {
        !self.ordered.is_empty() && self.ordered.iter().all(|(id, qty)| self.fulfilled(*id) >= *qty)
    }

    pub fn is_partial(&self) -> bool {
        self.total_fulfilled() > 0 && !self.is_complete()
    }

    /// Reject an allocation that would push any item past its ordered quantity.
    pub fn check_allocation(&self, lines: &[(Uuid, i32)]) -> Result<(), DomainError> {
        let mut requested: HashMap<Uuid, i32> = HashMap::new();
        for (item_id, qty) in lines {
            if *qty <= 0 {
                return Err(DomainError::validation(format!(
                    "fulfillment quantity for item {item_id} must be positive"
                )));
            }
            *requested.entry(*item_id).or_default() += qty;
        }
        for (item_id, qty) in requested {
            let remaining = self.remaining(item_id);
            if qty > remaining {
                return Err(DomainError::validation(format!(
                    "item {item_id} has {remaining} unfulfilled, cannot ship {qty}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(order_id: Uuid, qty: i32) -> OrderItem {
        OrderItem::new(order_id, "Print", qty)
    }

    fn shipment(order_id: Uuid, ext: &str, lines: &[(Uuid, i32)]) -> Fulfillment {
        Fulfillment::new(
            order_id,
            ext,
            FulfillmentSource::Production,
            FulfillmentStatus::Shipped,
            Tracking::default(),
            lines,
        )
    }

    #[test]
    fn partial_then_complete() {
        let order_id = Uuid::new_v4();
        let a = item(order_id, 1);
        let b = item(order_id, 1);
        let items = vec![a.clone(), b.clone()];

        let first = vec![shipment(order_id, "f1", &[(a.id, 1)])];
        let coverage = Coverage::compute(&items, &first);
        assert!(coverage.is_partial());
        assert!(!coverage.is_complete());

        let both = vec![first[0].clone(), shipment(order_id, "f2", &[(b.id, 1)])];
        let coverage = Coverage::compute(&items, &both);
        assert!(coverage.is_complete());
        assert!(!coverage.is_partial());
    }

    #[test]
    fn removed_items_do_not_count() {
        let order_id = Uuid::new_v4();
        let a = item(order_id, 2);
        let mut gone = item(order_id, 5);
        gone.removed_at = Some(Utc::now());

        let shipped = shipment(order_id, "f", &[(a.id, 2)]);
        let coverage = Coverage::compute(&[a.clone(), gone], &[shipped]);
        assert_eq!(coverage.total_ordered(), 2);
        assert!(coverage.is_complete());
    }

    #[test]
    fn cancelled_shipments_release_quantity() {
        let order_id = Uuid::new_v4();
        let a = item(order_id, 1);
        let mut cancelled = shipment(order_id, "f", &[(a.id, 1)]);
        cancelled.status = FulfillmentStatus::Cancelled;

        let coverage = Coverage::compute(&[a.clone()], &[cancelled]);
        assert_eq!(coverage.remaining(a.id), 1);
    }

    #[test]
    fn allocation_cannot_exceed_ordered_quantity() {
        let order_id = Uuid::new_v4();
        let a = item(order_id, 2);
        let coverage = Coverage::compute(&[a.clone()], &[shipment(order_id, "f", &[(a.id, 1)])]);

        assert!(coverage.check_allocation(&[(a.id, 1)]).is_ok());
        assert!(coverage.check_allocation(&[(a.id, 2)]).is_err());
        // Split across two lines still sums per item.
        assert!(coverage.check_allocation(&[(a.id, 1), (a.id, 1)]).is_err());
        assert!(coverage.check_allocation(&[(a.id, 0)]).is_err());
    }

    #[test]
    fn empty_order_is_never_complete() {
        assert!(!Coverage::compute(&[], &[]).is_complete());
    }
}
