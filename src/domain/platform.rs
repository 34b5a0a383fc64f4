use chrono::{DateTime, Utc};
use serde_json::Value;

use super::errors::DomainError;
use super::fulfillment::Tracking;
use super::order::{OrderTotals, ShippingAddress};
use super::store::Platform;

/// Order graph fetched from a storefront, already converted to local
/// money and status representations.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOrder {
    pub external_id: String,
    pub name: String,
    pub email: Option<String>,
    pub currency: String,
    pub totals: OrderTotals,
    pub cancelled: bool,
    pub placed_at: Option<DateTime<Utc>>,
    pub line_items: Vec<RemoteLineItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteLineItem {
    pub external_line_id: String,
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub tax: i64,
    pub discount: i64,
    pub variant_external_id: Option<String>,
    pub raw: Value,
}

/// Open fulfillment sub-order on the storefront side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOrder {
    pub id: String,
    pub lines: Vec<FulfillmentOrderLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOrderLine {
    pub id: String,
    /// Storefront order line this sub-order line belongs to.
    pub line_item_id: String,
    pub remaining_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentLine {
    pub fulfillment_order_line_id: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentGroup {
    pub fulfillment_order_id: String,
    pub lines: Vec<ShipmentLine>,
}

/// Platform-side fulfillment to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformShipment {
    pub order_external_id: String,
    pub tracking: Tracking,
    pub notify_customer: bool,
    pub groups: Vec<ShipmentGroup>,
}

/// Merchant-initiated fulfillment or cancellation request awaiting our answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantRequest {
    pub fulfillment_order_id: String,
    pub order_external_id: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredService {
    pub service_id: String,
    pub location_id: String,
}

fn unsupported(platform: Platform, what: &str) -> DomainError {
    DomainError::Unsupported(format!("{what} on {platform}"))
}

/// Capabilities of one storefront platform, bound to one store's credentials.
///
/// Callers depend only on this trait; platform differences stay inside the
/// implementations. Credential rejections surface as
/// [`DomainError::Authentication`].
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn fetch_order(&self, external_order_id: &str) -> Result<RemoteOrder, DomainError>;

    fn open_fulfillment_orders(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<FulfillmentOrder>, DomainError>;

    /// Returns the platform's id for the created fulfillment.
    fn create_fulfillment(&self, shipment: &PlatformShipment) -> Result<String, DomainError>;

    fn pending_fulfillment_requests(&self) -> Result<Vec<MerchantRequest>, DomainError> {
        Err(unsupported(self.platform(), "fulfillment requests"))
    }

    fn pending_cancellation_requests(&self) -> Result<Vec<MerchantRequest>, DomainError> {
        Err(unsupported(self.platform(), "cancellation requests"))
    }

    fn accept_fulfillment_request(
        &self,
        _fulfillment_order_id: &str,
        _message: &str,
    ) -> Result<(), DomainError> {
        Err(unsupported(self.platform(), "fulfillment requests"))
    }

    fn accept_cancellation_request(
        &self,
        _fulfillment_order_id: &str,
        _message: &str,
    ) -> Result<(), DomainError> {
        Err(unsupported(self.platform(), "cancellation requests"))
    }

    fn reject_cancellation_request(
        &self,
        _fulfillment_order_id: &str,
        _message: &str,
    ) -> Result<(), DomainError> {
        Err(unsupported(self.platform(), "cancellation requests"))
    }

    fn register_fulfillment_service(
        &self,
        _name: &str,
        _callback_url: Option<&str>,
    ) -> Result<RegisteredService, DomainError> {
        Err(unsupported(self.platform(), "fulfillment services"))
    }

    fn unregister_fulfillment_service(&self, _service_id: &str) -> Result<(), DomainError> {
        Err(unsupported(self.platform(), "fulfillment services"))
    }

    fn activate_inventory(
        &self,
        _inventory_item_id: &str,
        _location_id: &str,
    ) -> Result<(), DomainError> {
        Err(unsupported(self.platform(), "inventory locations"))
    }

    fn deactivate_inventory(
        &self,
        _inventory_item_id: &str,
        _location_id: &str,
    ) -> Result<(), DomainError> {
        Err(unsupported(self.platform(), "inventory locations"))
    }
}
