use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use super::order_service::transition;
use super::platform_calls::{active_store, guard};
use crate::domain::activity::{Actor, OrderActivity};
use crate::domain::errors::DomainError;
use crate::domain::mapping::normalize_country;
use crate::domain::order::{Order, OrderEvent, OrderItem, OrderOwner};
use crate::domain::platform::{RemoteLineItem, RemoteOrder};
use crate::domain::ports::{OrderStore, OrderTx, PlatformGateway};
use crate::domain::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemChanges {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

#[derive(Clone)]
pub struct ImportService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PlatformGateway>,
}

impl ImportService {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PlatformGateway>) -> Self {
        Self { store, gateway }
    }

    /// Fetch an order from its storefront and upsert it with its items and
    /// shipping address. The local write is a single transaction.
    pub fn import_or_resync(
        &self,
        actor: Actor,
        owner: OrderOwner,
        external_order_id: &str,
    ) -> Result<Order, DomainError> {
        let OrderOwner::Store(store_id) = owner else {
            return Err(DomainError::validation("manual orders have no storefront to import from"));
        };
        if external_order_id.trim().is_empty() {
            return Err(DomainError::validation("external order id is required"));
        }
        let store = active_store(self.store.as_ref(), store_id)?;
        let adapter = self.gateway.adapter_for(&store)?;
        let remote = guard(self.store.as_ref(), &store, adapter.fetch_order(external_order_id))?;

        self.store.transaction(|tx| apply_remote(tx, &store, &remote, actor))
    }
}

fn apply_remote(
    tx: &mut dyn OrderTx,
    store: &Store,
    remote: &RemoteOrder,
    actor: Actor,
) -> Result<Order, DomainError> {
    let owner = OrderOwner::Store(store.id);
    let existing = tx.find_order_by_external(owner, &remote.external_id)?;
    let created = existing.is_none();
    let mut order = match existing {
        Some(found) => tx.lock_order(found.id)?,
        None => Order::new(owner, Some(remote.external_id.clone()), remote.currency.clone()),
    };

    order.name = remote.name.clone();
    order.email = remote.email.clone();
    order.currency = remote.currency.clone();
    order.totals = remote.totals;
    order.placed_at = remote.placed_at.or(order.placed_at);
    order.raw_payload = remote.raw.clone();
    order.country_code = remote
        .shipping_address
        .as_ref()
        .and_then(|a| a.country_code.as_deref())
        .and_then(|c| normalize_country(c).ok());
    order.updated_at = Utc::now();
    if created {
        tx.insert_order(&order)?;
    } else {
        tx.update_order(&order)?;
    }

    let changes = sync_items(tx, store, &order, &remote.line_items)?;
    tx.replace_shipping_address(order.id, remote.shipping_address.as_ref())?;

    let (kind, verb) = if created {
        ("imported", "imported from")
    } else {
        ("resynced", "resynced with")
    };
    tx.record_activity(
        &OrderActivity::new(order.id, actor, kind, format!("order {verb} {}", store.platform))
            .with_details(json!({
                "external_id": remote.external_id,
                "items_created": changes.created,
                "items_updated": changes.updated,
                "items_removed": changes.removed,
            })),
    )?;

    if remote.cancelled && order.may(OrderEvent::Cancel) {
        transition(tx, &mut order, OrderEvent::Cancel, actor)?;
    }

    info!(
        "order {} ({} #{}) {kind}: +{} ~{} -{}",
        order.uid,
        store.shop_domain,
        remote.external_id,
        changes.created,
        changes.updated,
        changes.removed
    );
    Ok(order)
}

/// Replace the order's active items with the fetched lines, matching on the
/// external line id. Items missing upstream are soft-deleted so fulfillment
/// history that points at them survives.
fn sync_items(
    tx: &mut dyn OrderTx,
    store: &Store,
    order: &Order,
    lines: &[RemoteLineItem],
) -> Result<ItemChanges, DomainError> {
    let mut active: HashMap<String, OrderItem> = HashMap::new();
    let mut stale = Vec::new();
    for item in tx.order_items(order.id)?.into_iter().filter(OrderItem::is_active) {
        match item.external_line_id.clone() {
            Some(line_id) if !active.contains_key(&line_id) => {
                active.insert(line_id, item);
            }
            _ => stale.push(item),
        }
    }

    let now = Utc::now();
    let mut changes = ItemChanges::default();
    let mut seen = HashSet::new();
    for line in lines {
        if !seen.insert(line.external_line_id.as_str()) {
            warn!(
                "order {} lists line {} twice, ignoring the repeat",
                order.uid, line.external_line_id
            );
            continue;
        }
        let product_variant_id = match &line.variant_external_id {
            Some(ext) => tx.find_product_variant_by_external(store.id, ext)?.map(|v| v.id),
            None => None,
        };

        match active.remove(&line.external_line_id) {
            Some(mut item) => {
                fill_item(&mut item, line, product_variant_id);
                item.updated_at = now;
                tx.update_item(&item)?;
                changes.updated += 1;
            }
            None => {
                let mut item = OrderItem::new(order.id, line.title.clone(), line.quantity);
                item.external_line_id = Some(line.external_line_id.clone());
                fill_item(&mut item, line, product_variant_id);
                tx.insert_item(&item)?;
                changes.created += 1;
            }
        }
    }

    for mut item in active.into_values().chain(stale) {
        item.removed_at = Some(now);
        item.updated_at = now;
        tx.update_item(&item)?;
        changes.removed += 1;
    }
    Ok(changes)
}

fn fill_item(item: &mut OrderItem, line: &RemoteLineItem, product_variant_id: Option<Uuid>) {
    item.title = line.title.clone();
    item.sku = line.sku.clone();
    item.quantity = line.quantity;
    item.unit_price = line.unit_price;
    item.tax = line.tax;
    item.discount = line.discount;
    item.product_variant_id = product_variant_id;
    item.snapshot = line.raw.clone();
}
