use uuid::Uuid;

use super::activity::{OrderActivity, OutboxEvent};
use super::errors::DomainError;
use super::fulfillment::Fulfillment;
use super::mapping::{Bundle, BundleSlot, VariantMapping};
use super::order::{Order, OrderItem, OrderOwner, ShippingAddress};
use super::platform::PlatformAdapter;
use super::store::{Platform, ProductVariant, Store};
use super::webhook::{Claim, WebhookLog};

/// Operations available inside one database transaction.
///
/// `lock_order` takes an exclusive per-order lock held until the transaction
/// ends; every state transition and quantity check goes through it.
pub trait OrderTx {
    // ── Stores & catalog ────────────────────────────────────────────────────
    fn find_store(&mut self, id: Uuid) -> Result<Option<Store>, DomainError>;
    fn find_store_by_domain(&mut self, platform: Platform, shop_domain: &str)
        -> Result<Option<Store>, DomainError>;
    fn update_store(&mut self, store: &Store) -> Result<(), DomainError>;
    fn find_product_variant(&mut self, id: Uuid) -> Result<Option<ProductVariant>, DomainError>;
    fn find_product_variant_by_external(
        &mut self,
        store_id: Uuid,
        external_id: &str,
    ) -> Result<Option<ProductVariant>, DomainError>;

    // ── Orders ──────────────────────────────────────────────────────────────
    fn find_order_by_uid(&mut self, uid: &str) -> Result<Option<Order>, DomainError>;
    fn find_order_by_external(&mut self, owner: OrderOwner, external_id: &str)
        -> Result<Option<Order>, DomainError>;
    fn lock_order(&mut self, id: Uuid) -> Result<Order, DomainError>;
    fn insert_order(&mut self, order: &Order) -> Result<(), DomainError>;
    fn update_order(&mut self, order: &Order) -> Result<(), DomainError>;
    /// All items, including soft-deleted ones.
    fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError>;
    fn insert_item(&mut self, item: &OrderItem) -> Result<(), DomainError>;
    fn update_item(&mut self, item: &OrderItem) -> Result<(), DomainError>;
    fn shipping_address(&mut self, order_id: Uuid) -> Result<Option<ShippingAddress>, DomainError>;
    fn replace_shipping_address(
        &mut self,
        order_id: Uuid,
        address: Option<&ShippingAddress>,
    ) -> Result<(), DomainError>;

    // ── Variant mappings & bundles ──────────────────────────────────────────
    fn find_mapping(&mut self, id: Uuid) -> Result<Option<VariantMapping>, DomainError>;
    /// Frozen copies attached to an order item, by slot position.
    fn snapshot_mappings(
        &mut self,
        order_item_id: Uuid,
    ) -> Result<Vec<VariantMapping>, DomainError>;
    fn default_mapping(&mut self, product_variant_id: Uuid, country: &str)
        -> Result<Option<VariantMapping>, DomainError>;
    /// Plain (non-bundle) catalog defaults of a variant, every country.
    fn variant_defaults(
        &mut self,
        product_variant_id: Uuid,
    ) -> Result<Vec<VariantMapping>, DomainError>;
    fn slot_default_mapping(&mut self, slot_id: Uuid, country: &str)
        -> Result<Option<VariantMapping>, DomainError>;
    /// Catalog mappings (every country) of one bundle slot.
    fn slot_mappings(&mut self, slot_id: Uuid) -> Result<Vec<VariantMapping>, DomainError>;
    fn insert_mapping(&mut self, mapping: &VariantMapping) -> Result<(), DomainError>;
    fn update_mapping(&mut self, mapping: &VariantMapping) -> Result<(), DomainError>;
    fn delete_mapping(&mut self, id: Uuid) -> Result<(), DomainError>;
    /// Whether any order item snapshot was copied from this mapping.
    fn mapping_is_referenced(&mut self, id: Uuid) -> Result<bool, DomainError>;
    fn find_bundle(&mut self, product_variant_id: Uuid) -> Result<Option<Bundle>, DomainError>;
    fn insert_bundle(&mut self, bundle: &Bundle) -> Result<(), DomainError>;
    fn insert_bundle_slot(&mut self, slot: &BundleSlot) -> Result<(), DomainError>;
    fn delete_bundle_slot(&mut self, id: Uuid) -> Result<(), DomainError>;

    // ── Fulfillments ────────────────────────────────────────────────────────
    fn find_fulfillment_by_external(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Fulfillment>, DomainError>;
    fn fulfillments(&mut self, order_id: Uuid) -> Result<Vec<Fulfillment>, DomainError>;
    fn insert_fulfillment(&mut self, fulfillment: &Fulfillment) -> Result<(), DomainError>;
    /// Persists status and tracking only; line items are immutable.
    fn update_fulfillment(&mut self, fulfillment: &Fulfillment) -> Result<(), DomainError>;
    fn link_platform_fulfillment(
        &mut self,
        fulfillment_id: Uuid,
        platform_fulfillment_id: &str,
    ) -> Result<(), DomainError>;

    // ── Audit & outbox ──────────────────────────────────────────────────────
    fn record_activity(&mut self, activity: &OrderActivity) -> Result<(), DomainError>;
    fn enqueue(&mut self, event: &OutboxEvent) -> Result<(), DomainError>;
}

/// Durable store. All writes of one `run` commit together or not at all.
pub trait OrderStore: Send + Sync + 'static {
    fn run(
        &self,
        work: &mut dyn FnMut(&mut dyn OrderTx) -> Result<(), DomainError>,
    ) -> Result<(), DomainError>;
}

impl dyn OrderStore {
    /// Run `f` in a transaction and return its value.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut dyn OrderTx) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let mut body = Some(f);
        let mut out = None;
        self.run(&mut |tx| {
            let body = body
                .take()
                .ok_or_else(|| DomainError::Internal("transaction body invoked twice".into()))?;
            out = Some(body(tx)?);
            Ok(())
        })?;
        out.ok_or_else(|| DomainError::Internal("transaction produced no result".into()))
    }
}

/// Webhook delivery log. Writes are autonomous so a log row survives a
/// rolled-back handler.
pub trait WebhookLogRepository: Send + Sync + 'static {
    /// Insert the row, or re-claim a row whose previous run ended
    /// with an error status (4xx or 5xx).
    /// A concurrent or completed delivery of the same id yields `Duplicate`.
    fn claim(&self, log: &WebhookLog) -> Result<Claim, DomainError>;
    fn finish(&self, log_id: Uuid, status_code: i32, duration_ms: i64, error: Option<&str>)
        -> Result<(), DomainError>;
}

/// Builds platform adapters bound to a store's credentials.
pub trait PlatformGateway: Send + Sync + 'static {
    fn adapter_for(&self, store: &Store) -> Result<Box<dyn PlatformAdapter>, DomainError>;
}
