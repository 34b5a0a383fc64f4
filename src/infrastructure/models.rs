use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::activity::{OrderActivity, OutboxEvent};
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::{Fulfillment, FulfillmentLineItem, Tracking};
use crate::domain::mapping::{BundleSlot, CropRegion, FrameSpec, VariantMapping};
use crate::domain::order::{Order, OrderItem, OrderOwner, OrderTotals, ShippingAddress};
use crate::domain::store::{ProductVariant, Store};
use crate::domain::webhook::WebhookLog;
use crate::schema::{
    bundle_slots, bundles, fulfillment_line_items, fulfillments, order_activities, order_items,
    order_outbox, orders, product_variants, shipping_addresses, stores, variant_mappings,
    webhook_logs,
};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = stores)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StoreRow {
    pub id: Uuid,
    pub platform: String,
    pub shop_domain: String,
    pub access_token: String,
    pub owner_user_id: Uuid,
    pub needs_reauth: bool,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub fulfillment_service_id: Option<String>,
    pub fulfillment_location_id: Option<String>,
}

/// Columns this service may change on a store it does not own.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = stores)]
#[diesel(treat_none_as_null = true)]
pub struct StoreChanges {
    pub access_token: String,
    pub needs_reauth: bool,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub fulfillment_service_id: Option<String>,
    pub fulfillment_location_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Store> for StoreRow {
    fn from(s: &Store) -> Self {
        StoreRow {
            id: s.id,
            platform: s.platform.as_str().to_string(),
            shop_domain: s.shop_domain.clone(),
            access_token: s.access_token.clone(),
            owner_user_id: s.owner_user_id,
            needs_reauth: s.needs_reauth,
            uninstalled_at: s.uninstalled_at,
            fulfillment_service_id: s.fulfillment_service_id.clone(),
            fulfillment_location_id: s.fulfillment_location_id.clone(),
        }
    }
}

impl From<&Store> for StoreChanges {
    fn from(s: &Store) -> Self {
        StoreChanges {
            access_token: s.access_token.clone(),
            needs_reauth: s.needs_reauth,
            uninstalled_at: s.uninstalled_at,
            fulfillment_service_id: s.fulfillment_service_id.clone(),
            fulfillment_location_id: s.fulfillment_location_id.clone(),
            updated_at: Utc::now(),
        }
    }
}

impl TryFrom<StoreRow> for Store {
    type Error = DomainError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        Ok(Store {
            id: row.id,
            platform: row.platform.parse()?,
            shop_domain: row.shop_domain,
            access_token: row.access_token,
            owner_user_id: row.owner_user_id,
            needs_reauth: row.needs_reauth,
            uninstalled_at: row.uninstalled_at,
            fulfillment_service_id: row.fulfillment_service_id,
            fulfillment_location_id: row.fulfillment_location_id,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = product_variants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductVariantRow {
    pub id: Uuid,
    pub store_id: Uuid,
    pub external_id: String,
    pub inventory_item_id: Option<String>,
}

impl From<ProductVariantRow> for ProductVariant {
    fn from(row: ProductVariantRow) -> Self {
        ProductVariant {
            id: row.id,
            store_id: row.store_id,
            external_id: row.external_id,
            inventory_item_id: row.inventory_item_id,
        }
    }
}

impl From<&ProductVariant> for ProductVariantRow {
    fn from(v: &ProductVariant) -> Self {
        ProductVariantRow {
            id: v.id,
            store_id: v.store_id,
            external_id: v.external_id.clone(),
            inventory_item_id: v.inventory_item_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub uid: String,
    pub store_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub currency: String,
    pub subtotal: i64,
    pub shipping_total: i64,
    pub tax_total: i64,
    pub discount_total: i64,
    pub total: i64,
    pub status: String,
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

impl From<&Order> for OrderRow {
    fn from(o: &Order) -> Self {
        let (store_id, user_id) = match o.owner {
            OrderOwner::Store(id) => (Some(id), None),
            OrderOwner::User(id) => (None, Some(id)),
        };
        OrderRow {
            id: o.id,
            uid: o.uid.clone(),
            store_id,
            user_id,
            external_id: o.external_id.clone(),
            name: o.name.clone(),
            email: o.email.clone(),
            currency: o.currency.clone(),
            subtotal: o.totals.subtotal,
            shipping_total: o.totals.shipping,
            tax_total: o.totals.tax,
            discount_total: o.totals.discount,
            total: o.totals.total,
            status: o.status.as_str().to_string(),
            country_code: o.country_code.clone(),
            production_order_id: o.production_order_id.clone(),
            promised_dispatch_date: o.promised_dispatch_date,
            placed_at: o.placed_at,
            submitted_at: o.submitted_at,
            fulfilled_at: o.fulfilled_at,
            completed_at: o.completed_at,
            cancelled_at: o.cancelled_at,
            raw_payload: o.raw_payload.clone(),
            created_at: o.created_at,
            updated_at: o.updated_at,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let owner = match (row.store_id, row.user_id) {
            (Some(id), _) => OrderOwner::Store(id),
            (None, Some(id)) => OrderOwner::User(id),
            (None, None) => {
                return Err(DomainError::Internal(format!("order {} has no owner", row.uid)))
            }
        };
        Ok(Order {
            id: row.id,
            owner,
            external_id: row.external_id,
            name: row.name,
            email: row.email,
            totals: OrderTotals {
                subtotal: row.subtotal,
                shipping: row.shipping_total,
                tax: row.tax_total,
                discount: row.discount_total,
                total: row.total,
            },
            status: row.status.parse()?,
            currency: row.currency,
            country_code: row.country_code,
            production_order_id: row.production_order_id,
            promised_dispatch_date: row.promised_dispatch_date,
            placed_at: row.placed_at,
            submitted_at: row.submitted_at,
            fulfilled_at: row.fulfilled_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            raw_payload: row.raw_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
            uid: row.uid,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = order_items)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemRow {
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
    pub snapshot: Value,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&OrderItem> for OrderItemRow {
    fn from(i: &OrderItem) -> Self {
        OrderItemRow {
            id: i.id,
            order_id: i.order_id,
            external_line_id: i.external_line_id.clone(),
            title: i.title.clone(),
            sku: i.sku.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
            tax: i.tax,
            discount: i.discount,
            product_variant_id: i.product_variant_id,
            snapshot: i.snapshot.clone(),
            removed_at: i.removed_at,
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            external_line_id: row.external_line_id,
            title: row.title,
            sku: row.sku,
            quantity: row.quantity,
            unit_price: row.unit_price,
            tax: row.tax,
            discount: row.discount,
            product_variant_id: row.product_variant_id,
            snapshot: row.snapshot,
            removed_at: row.removed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = shipping_addresses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ShippingAddressRow {
    pub order_id: Uuid,
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

impl ShippingAddressRow {
    pub fn new(order_id: Uuid, a: &ShippingAddress) -> Self {
        ShippingAddressRow {
            order_id,
            name: a.name.clone(),
            company: a.company.clone(),
            address1: a.address1.clone(),
            address2: a.address2.clone(),
            city: a.city.clone(),
            province_code: a.province_code.clone(),
            zip: a.zip.clone(),
            country_code: a.country_code.clone(),
            phone: a.phone.clone(),
        }
    }
}

impl From<ShippingAddressRow> for ShippingAddress {
    fn from(row: ShippingAddressRow) -> Self {
        ShippingAddress {
            name: row.name,
            company: row.company,
            address1: row.address1,
            address2: row.address2,
            city: row.city,
            province_code: row.province_code,
            zip: row.zip,
            country_code: row.country_code,
            phone: row.phone,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = bundles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BundleRow {
    pub id: Uuid,
    pub product_variant_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = bundle_slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BundleSlotRow {
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub slot_position: i32,
}

impl From<&BundleSlot> for BundleSlotRow {
    fn from(s: &BundleSlot) -> Self {
        BundleSlotRow {
            id: s.id,
            bundle_id: s.bundle_id,
            slot_position: s.slot_position,
        }
    }
}

impl From<BundleSlotRow> for BundleSlot {
    fn from(row: BundleSlotRow) -> Self {
        BundleSlot {
            id: row.id,
            bundle_id: row.bundle_id,
            slot_position: row.slot_position,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = variant_mappings)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VariantMappingRow {
    pub id: Uuid,
    pub product_variant_id: Uuid,
    pub country_code: String,
    pub is_default: bool,
    pub bundle_slot_id: Option<Uuid>,
    pub order_item_id: Option<Uuid>,
    pub source_mapping_id: Option<Uuid>,
    pub slot_position: Option<i32>,
    pub frame_sku_id: String,
    pub frame_width: f64,
    pub frame_height: f64,
    pub frame_unit: String,
    pub frame_cost: i64,
    pub image_id: Option<String>,
    pub crop_x: f64,
    pub crop_y: f64,
    pub crop_w: f64,
    pub crop_h: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&VariantMapping> for VariantMappingRow {
    fn from(m: &VariantMapping) -> Self {
        VariantMappingRow {
            id: m.id,
            product_variant_id: m.product_variant_id,
            country_code: m.country_code.clone(),
            is_default: m.is_default,
            bundle_slot_id: m.bundle_slot_id,
            order_item_id: m.order_item_id,
            source_mapping_id: m.source_mapping_id,
            slot_position: m.slot_position,
            frame_sku_id: m.frame.frame_sku_id.clone(),
            frame_width: m.frame.width,
            frame_height: m.frame.height,
            frame_unit: m.frame.unit.clone(),
            frame_cost: m.frame.cost,
            image_id: m.image_id.clone(),
            crop_x: m.crop.cx,
            crop_y: m.crop.cy,
            crop_w: m.crop.cw,
            crop_h: m.crop.ch,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

impl From<VariantMappingRow> for VariantMapping {
    fn from(row: VariantMappingRow) -> Self {
        VariantMapping {
            id: row.id,
            product_variant_id: row.product_variant_id,
            country_code: row.country_code,
            is_default: row.is_default,
            bundle_slot_id: row.bundle_slot_id,
            order_item_id: row.order_item_id,
            source_mapping_id: row.source_mapping_id,
            slot_position: row.slot_position,
            frame: FrameSpec {
                frame_sku_id: row.frame_sku_id,
                width: row.frame_width,
                height: row.frame_height,
                unit: row.frame_unit,
                cost: row.frame_cost,
            },
            image_id: row.image_id,
            crop: CropRegion {
                cx: row.crop_x,
                cy: row.crop_y,
                cw: row.crop_w,
                ch: row.crop_h,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = fulfillments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FulfillmentRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub external_id: String,
    pub source: String,
    pub status: String,
    pub tracking_carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub platform_fulfillment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The only columns a fulfillment update may touch.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = fulfillments)]
#[diesel(treat_none_as_null = true)]
pub struct FulfillmentChanges {
    pub status: String,
    pub tracking_carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = fulfillment_line_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FulfillmentLineItemRow {
    pub id: Uuid,
    pub fulfillment_id: Uuid,
    pub order_item_id: Uuid,
    pub quantity: i32,
}

impl From<&Fulfillment> for FulfillmentRow {
    fn from(f: &Fulfillment) -> Self {
        FulfillmentRow {
            id: f.id,
            order_id: f.order_id,
            external_id: f.external_id.clone(),
            source: f.source.as_str().to_string(),
            status: f.status.as_str().to_string(),
            tracking_carrier: f.tracking.carrier.clone(),
            tracking_number: f.tracking.number.clone(),
            tracking_url: f.tracking.url.clone(),
            shipped_at: f.shipped_at,
            platform_fulfillment_id: f.platform_fulfillment_id.clone(),
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

impl From<&Fulfillment> for FulfillmentChanges {
    fn from(f: &Fulfillment) -> Self {
        FulfillmentChanges {
            status: f.status.as_str().to_string(),
            tracking_carrier: f.tracking.carrier.clone(),
            tracking_number: f.tracking.number.clone(),
            tracking_url: f.tracking.url.clone(),
            shipped_at: f.shipped_at,
            updated_at: f.updated_at,
        }
    }
}

impl From<&FulfillmentLineItem> for FulfillmentLineItemRow {
    fn from(l: &FulfillmentLineItem) -> Self {
        FulfillmentLineItemRow {
            id: l.id,
            fulfillment_id: l.fulfillment_id,
            order_item_id: l.order_item_id,
            quantity: l.quantity,
        }
    }
}

impl FulfillmentRow {
    pub fn into_domain(
        self,
        lines: Vec<FulfillmentLineItemRow>,
    ) -> Result<Fulfillment, DomainError> {
        Ok(Fulfillment {
            id: self.id,
            order_id: self.order_id,
            external_id: self.external_id,
            source: self.source.parse()?,
            status: self.status.parse()?,
            tracking: Tracking {
                carrier: self.tracking_carrier,
                number: self.tracking_number,
                url: self.tracking_url,
            },
            shipped_at: self.shipped_at,
            line_items: lines
                .into_iter()
                .map(|l| FulfillmentLineItem {
                    id: l.id,
                    fulfillment_id: l.fulfillment_id,
                    order_item_id: l.order_item_id,
                    quantity: l.quantity,
                })
                .collect(),
            platform_fulfillment_id: self.platform_fulfillment_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = webhook_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WebhookLogRow {
    pub id: Uuid,
    pub webhook_id: Option<String>,
    pub topic: String,
    pub shop_domain: Option<String>,
    pub api_version: Option<String>,
    pub status_code: i32,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WebhookLog> for WebhookLogRow {
    fn from(l: &WebhookLog) -> Self {
        WebhookLogRow {
            id: l.id,
            webhook_id: l.webhook_id.clone(),
            topic: l.topic.clone(),
            shop_domain: l.shop_domain.clone(),
            api_version: l.api_version.clone(),
            status_code: l.status_code,
            duration_ms: l.duration_ms,
            error: l.error.clone(),
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = order_activities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderActivityRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderActivity> for OrderActivityRow {
    fn from(a: &OrderActivity) -> Self {
        OrderActivityRow {
            id: a.id,
            order_id: a.order_id,
            actor_id: a.actor_id,
            kind: a.kind.clone(),
            message: a.message.clone(),
            details: a.details.clone(),
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = order_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl From<&OutboxEvent> for OutboxEventRow {
    fn from(e: &OutboxEvent) -> Self {
        OutboxEventRow {
            id: e.id,
            aggregate_type: e.aggregate_type.clone(),
            aggregate_id: e.aggregate_id.clone(),
            event_type: e.event_type.clone(),
            payload: e.payload.clone(),
            created_at: Utc::now(),
        }
    }
}
