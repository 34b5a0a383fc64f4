use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::Text;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::activity::{OrderActivity, OutboxEvent};
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::Fulfillment;
use crate::domain::mapping::{Bundle, BundleSlot, VariantMapping};
use crate::domain::order::{Order, OrderItem, OrderOwner, ShippingAddress};
use crate::domain::ports::{OrderStore, OrderTx, WebhookLogRepository};
use crate::domain::store::{Platform, ProductVariant, Store};
use crate::domain::webhook::{Claim, WebhookLog};
use crate::schema::{
    bundle_slots, bundles, fulfillment_line_items, fulfillments, order_activities, order_items,
    order_outbox, orders, product_variants, shipping_addresses, stores, variant_mappings,
    webhook_logs,
};

use super::models::{
    BundleRow, BundleSlotRow, FulfillmentChanges, FulfillmentLineItemRow, FulfillmentRow,
    OrderActivityRow, OrderItemRow, OrderRow, OutboxEventRow, ProductVariantRow, ShippingAddressRow,
    StoreChanges, StoreRow, VariantMappingRow, WebhookLogRow,
};

diesel::define_sql_function!(fn lower(x: Text) -> Text);

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

/// Unique violations are caller mistakes, everything else is ours.
fn unique(what: &str) -> impl FnOnce(DieselError) -> DomainError + '_ {
    move |e| match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            DomainError::validation(format!("duplicate {what}"))
        }
        other => other.into(),
    }
}

// ── Order store ───────────────────────────────────────────────────────────────

pub struct DieselOrderStore {
    pool: DbPool,
}

impl DieselOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderStore for DieselOrderStore {
    fn run(
        &self,
        work: &mut dyn FnMut(&mut dyn OrderTx) -> Result<(), DomainError>,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| work(&mut PgTx { conn }))
    }
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl PgTx<'_> {
    fn lines_for(&mut self, rows: Vec<FulfillmentRow>) -> Result<Vec<Fulfillment>, DomainError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines: HashMap<Uuid, Vec<FulfillmentLineItemRow>> = HashMap::new();
        for line in fulfillment_line_items::table
            .filter(fulfillment_line_items::fulfillment_id.eq_any(ids))
            .select(FulfillmentLineItemRow::as_select())
            .load(self.conn)?
        {
            lines.entry(line.fulfillment_id).or_default().push(line);
        }
        rows.into_iter()
            .map(|row| {
                let own = lines.remove(&row.id).unwrap_or_default();
                row.into_domain(own)
            })
            .collect()
    }

    fn mappings(
        &mut self,
        query: variant_mappings::BoxedQuery<'_, diesel::pg::Pg>,
    ) -> Result<Vec<VariantMapping>, DomainError> {
        Ok(query
            .select(VariantMappingRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(VariantMapping::from)
            .collect())
    }
}

impl OrderTx for PgTx<'_> {
    fn find_store(&mut self, id: Uuid) -> Result<Option<Store>, DomainError> {
        stores::table
            .find(id)
            .select(StoreRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Store::try_from)
            .transpose()
    }

    fn find_store_by_domain(
        &mut self,
        platform: Platform,
        shop_domain: &str,
    ) -> Result<Option<Store>, DomainError> {
        stores::table
            .filter(stores::platform.eq(platform.as_str()))
            .filter(lower(stores::shop_domain).eq(shop_domain.to_ascii_lowercase()))
            .select(StoreRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Store::try_from)
            .transpose()
    }

    fn update_store(&mut self, store: &Store) -> Result<(), DomainError> {
        diesel::update(stores::table.find(store.id))
            .set(&StoreChanges::from(store))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_product_variant(&mut self, id: Uuid) -> Result<Option<ProductVariant>, DomainError> {
        Ok(product_variants::table
            .find(id)
            .select(ProductVariantRow::as_select())
            .first(self.conn)
            .optional()?
            .map(ProductVariant::from))
    }

    fn find_product_variant_by_external(
        &mut self,
        store_id: Uuid,
        external_id: &str,
    ) -> Result<Option<ProductVariant>, DomainError> {
        Ok(product_variants::table
            .filter(product_variants::store_id.eq(store_id))
            .filter(product_variants::external_id.eq(external_id))
            .select(ProductVariantRow::as_select())
            .first(self.conn)
            .optional()?
            .map(ProductVariant::from))
    }

    fn find_order_by_uid(&mut self, uid: &str) -> Result<Option<Order>, DomainError> {
        orders::table
            .filter(orders::uid.eq(uid))
            .select(OrderRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Order::try_from)
            .transpose()
    }

    fn find_order_by_external(
        &mut self,
        owner: OrderOwner,
        external_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        let query = orders::table
            .filter(orders::external_id.eq(external_id))
            .select(OrderRow::as_select())
            .into_boxed();
        let query = match owner {
            OrderOwner::Store(store_id) => query.filter(orders::store_id.eq(store_id)),
            OrderOwner::User(_) => query.filter(orders::store_id.is_null()),
        };
        query.first(self.conn).optional()?.map(Order::try_from).transpose()
    }

    fn lock_order(&mut self, id: Uuid) -> Result<Order, DomainError> {
        orders::table
            .find(id)
            .select(OrderRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .ok_or_else(|| DomainError::not_found("order"))
            .and_then(Order::try_from)
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), DomainError> {
        diesel::insert_into(orders::table)
            .values(OrderRow::from(order))
            .execute(self.conn)
            .map_err(unique("order external id"))?;
        Ok(())
    }

    fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        let updated = diesel::update(orders::table.find(order.id))
            .set(&OrderRow::from(order))
            .execute(self.conn)
            .map_err(unique("order external id"))?;
        if updated == 0 {
            return Err(DomainError::not_found("order"));
        }
        Ok(())
    }

    fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
        Ok(order_items::table
            .filter(order_items::order_id.eq(order_id))
            .order(order_items::created_at.asc())
            .select(OrderItemRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(OrderItem::from)
            .collect())
    }

    fn insert_item(&mut self, item: &OrderItem) -> Result<(), DomainError> {
        diesel::insert_into(order_items::table)
            .values(OrderItemRow::from(item))
            .execute(self.conn)
            .map_err(unique("active external line id"))?;
        Ok(())
    }

    fn update_item(&mut self, item: &OrderItem) -> Result<(), DomainError> {
        diesel::update(order_items::table.find(item.id))
            .set(&OrderItemRow::from(item))
            .execute(self.conn)
            .map_err(unique("active external line id"))?;
        Ok(())
    }

    fn shipping_address(&mut self, order_id: Uuid) -> Result<Option<ShippingAddress>, DomainError> {
        Ok(shipping_addresses::table
            .find(order_id)
            .select(ShippingAddressRow::as_select())
            .first(self.conn)
            .optional()?
            .map(ShippingAddress::from))
    }

    fn replace_shipping_address(
        &mut self,
        order_id: Uuid,
        address: Option<&ShippingAddress>,
    ) -> Result<(), DomainError> {
        diesel::delete(shipping_addresses::table.find(order_id)).execute(self.conn)?;
        if let Some(address) = address {
            diesel::insert_into(shipping_addresses::table)
                .values(ShippingAddressRow::new(order_id, address))
                .execute(self.conn)?;
        }
        Ok(())
    }

    fn find_mapping(&mut self, id: Uuid) -> Result<Option<VariantMapping>, DomainError> {
        Ok(variant_mappings::table
            .find(id)
            .select(VariantMappingRow::as_select())
            .first(self.conn)
            .optional()?
            .map(VariantMapping::from))
    }

    fn snapshot_mappings(
        &mut self,
        order_item_id: Uuid,
    ) -> Result<Vec<VariantMapping>, DomainError> {
        self.mappings(
            variant_mappings::table
                .filter(variant_mappings::order_item_id.eq(order_item_id))
                .order(variant_mappings::slot_position.asc())
                .into_boxed(),
        )
    }

    fn default_mapping(
        &mut self,
        product_variant_id: Uuid,
        country: &str,
    ) -> Result<Option<VariantMapping>, DomainError> {
        let found = self.mappings(
            variant_mappings::table
                .filter(variant_mappings::product_variant_id.eq(product_variant_id))
                .filter(variant_mappings::country_code.eq(country.to_string()))
                .filter(variant_mappings::is_default.eq(true))
                .filter(variant_mappings::bundle_slot_id.is_null())
                .filter(variant_mappings::order_item_id.is_null())
                .into_boxed(),
        )?;
        Ok(found.into_iter().next())
    }

    fn variant_defaults(
        &mut self,
        product_variant_id: Uuid,
    ) -> Result<Vec<VariantMapping>, DomainError> {
        self.mappings(
            variant_mappings::table
                .filter(variant_mappings::product_variant_id.eq(product_variant_id))
                .filter(variant_mappings::is_default.eq(true))
                .filter(variant_mappings::bundle_slot_id.is_null())
                .filter(variant_mappings::order_item_id.is_null())
                .into_boxed(),
        )
    }

    fn slot_default_mapping(
        &mut self,
        slot_id: Uuid,
        country: &str,
    ) -> Result<Option<VariantMapping>, DomainError> {
        let found = self.mappings(
            variant_mappings::table
                .filter(variant_mappings::bundle_slot_id.eq(slot_id))
                .filter(variant_mappings::country_code.eq(country.to_string()))
                .filter(variant_mappings::is_default.eq(true))
                .into_boxed(),
        )?;
        Ok(found.into_iter().next())
    }

    fn slot_mappings(&mut self, slot_id: Uuid) -> Result<Vec<VariantMapping>, DomainError> {
        self.mappings(
            variant_mappings::table
                .filter(variant_mappings::bundle_slot_id.eq(slot_id))
                .filter(variant_mappings::order_item_id.is_null())
                .into_boxed(),
        )
    }

    fn insert_mapping(&mut self, mapping: &VariantMapping) -> Result<(), DomainError> {
        diesel::insert_into(variant_mappings::table)
            .values(VariantMappingRow::from(mapping))
            .execute(self.conn)
            .map_err(unique("default mapping"))?;
        Ok(())
    }

    fn update_mapping(&mut self, mapping: &VariantMapping) -> Result<(), DomainError> {
        diesel::update(variant_mappings::table.find(mapping.id))
            .set(&VariantMappingRow::from(mapping))
            .execute(self.conn)
            .map_err(unique("default mapping"))?;
        Ok(())
    }

    fn delete_mapping(&mut self, id: Uuid) -> Result<(), DomainError> {
        diesel::delete(variant_mappings::table.find(id)).execute(self.conn)?;
        Ok(())
    }

    fn mapping_is_referenced(&mut self, id: Uuid) -> Result<bool, DomainError> {
        let referencing: i64 = variant_mappings::table
            .filter(variant_mappings::source_mapping_id.eq(id))
            .count()
            .get_result(self.conn)?;
        Ok(referencing > 0)
    }

    fn find_bundle(&mut self, product_variant_id: Uuid) -> Result<Option<Bundle>, DomainError> {
        let Some(bundle) = bundles::table
            .filter(bundles::product_variant_id.eq(product_variant_id))
            .select(BundleRow::as_select())
            .first(self.conn)
            .optional()?
        else {
            return Ok(None);
        };
        let slots = bundle_slots::table
            .filter(bundle_slots::bundle_id.eq(bundle.id))
            .order(bundle_slots::slot_position.asc())
            .select(BundleSlotRow::as_select())
            .load(self.conn)?;
        Ok(Some(Bundle {
            id: bundle.id,
            product_variant_id: bundle.product_variant_id,
            slots: slots.into_iter().map(BundleSlot::from).collect(),
        }))
    }

    fn insert_bundle(&mut self, bundle: &Bundle) -> Result<(), DomainError> {
        diesel::insert_into(bundles::table)
            .values(BundleRow {
                id: bundle.id,
                product_variant_id: bundle.product_variant_id,
            })
            .execute(self.conn)
            .map_err(unique("bundle for variant"))?;
        let slots: Vec<BundleSlotRow> = bundle.slots.iter().map(BundleSlotRow::from).collect();
        if !slots.is_empty() {
            diesel::insert_into(bundle_slots::table)
                .values(&slots)
                .execute(self.conn)
                .map_err(unique("slot position"))?;
        }
        Ok(())
    }

    fn insert_bundle_slot(&mut self, slot: &BundleSlot) -> Result<(), DomainError> {
        diesel::insert_into(bundle_slots::table)
            .values(BundleSlotRow::from(slot))
            .execute(self.conn)
            .map_err(unique("slot position"))?;
        Ok(())
    }

    fn delete_bundle_slot(&mut self, id: Uuid) -> Result<(), DomainError> {
        diesel::delete(bundle_slots::table.find(id)).execute(self.conn)?;
        Ok(())
    }

    fn find_fulfillment_by_external(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Fulfillment>, DomainError> {
        let rows = fulfillments::table
            .filter(fulfillments::external_id.eq(external_id))
            .select(FulfillmentRow::as_select())
            .load(self.conn)?;
        Ok(self.lines_for(rows)?.into_iter().next())
    }

    fn fulfillments(&mut self, order_id: Uuid) -> Result<Vec<Fulfillment>, DomainError> {
        let rows = fulfillments::table
            .filter(fulfillments::order_id.eq(order_id))
            .order(fulfillments::created_at.asc())
            .select(FulfillmentRow::as_select())
            .load(self.conn)?;
        self.lines_for(rows)
    }

    fn insert_fulfillment(&mut self, fulfillment: &Fulfillment) -> Result<(), DomainError> {
        diesel::insert_into(fulfillments::table)
            .values(FulfillmentRow::from(fulfillment))
            .execute(self.conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    DomainError::DuplicateEvent(fulfillment.external_id.clone())
                }
                other => other.into(),
            })?;
        let lines: Vec<FulfillmentLineItemRow> = fulfillment
            .line_items
            .iter()
            .map(FulfillmentLineItemRow::from)
            .collect();
        diesel::insert_into(fulfillment_line_items::table)
            .values(&lines)
            .execute(self.conn)?;
        Ok(())
    }

    fn update_fulfillment(&mut self, fulfillment: &Fulfillment) -> Result<(), DomainError> {
        let updated = diesel::update(fulfillments::table.find(fulfillment.id))
            .set(&FulfillmentChanges::from(fulfillment))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(DomainError::not_found("fulfillment"));
        }
        Ok(())
    }

    fn link_platform_fulfillment(
        &mut self,
        fulfillment_id: Uuid,
        platform_fulfillment_id: &str,
    ) -> Result<(), DomainError> {
        let updated = diesel::update(fulfillments::table.find(fulfillment_id))
            .set(fulfillments::platform_fulfillment_id.eq(platform_fulfillment_id))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(DomainError::not_found("fulfillment"));
        }
        Ok(())
    }

    fn record_activity(&mut self, activity: &OrderActivity) -> Result<(), DomainError> {
        diesel::insert_into(order_activities::table)
            .values(OrderActivityRow::from(activity))
            .execute(self.conn)?;
        Ok(())
    }

    fn enqueue(&mut self, event: &OutboxEvent) -> Result<(), DomainError> {
        // The relay routes on `aggregate_type`.
        diesel::insert_into(order_outbox::table)
            .values(OutboxEventRow::from(event))
            .execute(self.conn)?;
        Ok(())
    }
}

// ── Webhook log ──────────────────────────────────────────────────────────────

/// Every call runs on its own connection and commits immediately.
pub struct DieselWebhookLogRepository {
    pool: DbPool,
}

impl DieselWebhookLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl WebhookLogRepository for DieselWebhookLogRepository {
    fn claim(&self, log: &WebhookLog) -> Result<Claim, DomainError> {
        let mut conn = self.pool.get()?;
        let inserted = diesel::insert_into(webhook_logs::table)
            .values(WebhookLogRow::from(log))
            .on_conflict(webhook_logs::webhook_id)
            .do_nothing()
            .execute(&mut conn)?;
        if inserted == 1 {
            return Ok(Claim::Started(log.id));
        }
        let Some(webhook_id) = &log.webhook_id else {
            return Err(DomainError::Internal("webhook log without id was not inserted".into()));
        };

        // Single statement, so two retries racing for a failed row cannot both win.
        let reclaimed: Option<Uuid> = diesel::update(
            webhook_logs::table
                .filter(webhook_logs::webhook_id.eq(webhook_id))
                .filter(webhook_logs::status_code.ge(400)),
        )
        .set((
            webhook_logs::status_code.eq(WebhookLog::IN_FLIGHT),
            webhook_logs::error.eq(None::<String>),
            webhook_logs::updated_at.eq(Utc::now()),
        ))
        .returning(webhook_logs::id)
        .get_result(&mut conn)
        .optional()?;
        Ok(reclaimed.map_or(Claim::Duplicate, Claim::Started))
    }

    fn finish(
        &self,
        log_id: Uuid,
        status_code: i32,
        duration_ms: i64,
        error: Option<&str>,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(webhook_logs::table.find(log_id))
            .set((
                webhook_logs::status_code.eq(status_code),
                webhook_logs::duration_ms.eq(Some(duration_ms)),
                webhook_logs::error.eq(error),
                webhook_logs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DomainError::not_found("webhook log"));
        }
        Ok(())
    }
}
