//! In-memory implementation of the store ports.
//!
//! A transaction works on a copy of the state and swaps it in on success, so
//! a failing body leaves nothing behind. The mutex is held for the whole
//! transaction, which serializes writers like a table-wide lock would. The
//! same uniqueness constraints as the Postgres schema are enforced.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::domain::activity::{OrderActivity, OutboxEvent};
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::Fulfillment;
use crate::domain::mapping::{Bundle, BundleSlot, VariantMapping};
use crate::domain::order::{Order, OrderItem, OrderOwner, ShippingAddress};
use crate::domain::ports::{OrderStore, OrderTx, WebhookLogRepository};
use crate::domain::store::{Platform, ProductVariant, Store};
use crate::domain::webhook::{Claim, WebhookLog};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub stores: HashMap<Uuid, Store>,
    pub variants: HashMap<Uuid, ProductVariant>,
    pub orders: HashMap<Uuid, Order>,
    pub items: HashMap<Uuid, OrderItem>,
    pub addresses: HashMap<Uuid, ShippingAddress>,
    pub mappings: HashMap<Uuid, VariantMapping>,
    pub bundles: HashMap<Uuid, Bundle>,
    pub fulfillments: HashMap<Uuid, Fulfillment>,
    pub activities: Vec<OrderActivity>,
    pub outbox: Vec<OutboxEvent>,
    pub webhook_logs: Vec<WebhookLog>,
}

impl MemoryState {
    pub fn activities_for(&self, order_id: Uuid) -> Vec<&OrderActivity> {
        self.activities.iter().filter(|a| a.order_id == order_id).collect()
    }

    pub fn active_items(&self, order_id: Uuid) -> Vec<&OrderItem> {
        self.items
            .values()
            .filter(|i| i.order_id == order_id && i.is_active())
            .collect()
    }

    pub fn order_by_external(&self, external_id: &str) -> Option<&Order> {
        self.orders
            .values()
            .find(|o| o.external_id.as_deref() == Some(external_id))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Internal("in-memory store poisoned".into()))
    }

    /// Direct mutable access for seeding fixtures.
    pub fn seed(&self, f: impl FnOnce(&mut MemoryState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    /// Read-only view of the committed state.
    pub fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl OrderStore for InMemoryStore {
    fn run(
        &self,
        work: &mut dyn FnMut(&mut dyn OrderTx) -> Result<(), DomainError>,
    ) -> Result<(), DomainError> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        work(&mut MemoryTx { state: &mut working })?;
        *guard = working;
        Ok(())
    }
}

impl WebhookLogRepository for InMemoryStore {
    fn claim(&self, log: &WebhookLog) -> Result<Claim, DomainError> {
        let mut state = self.lock()?;
        if let Some(webhook_id) = &log.webhook_id {
            if let Some(existing) = state
                .webhook_logs
                .iter_mut()
                .find(|l| l.webhook_id.as_ref() == Some(webhook_id))
            {
                if !existing.is_reclaimable() {
                    return Ok(Claim::Duplicate);
                }
                existing.status_code = WebhookLog::IN_FLIGHT;
                existing.error = None;
                existing.updated_at = Utc::now();
                return Ok(Claim::Started(existing.id));
            }
        }
        state.webhook_logs.push(log.clone());
        Ok(Claim::Started(log.id))
    }

    fn finish(
        &self,
        log_id: Uuid,
        status_code: i32,
        duration_ms: i64,
        error: Option<&str>,
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        let log = state
            .webhook_logs
            .iter_mut()
            .find(|l| l.id == log_id)
            .ok_or_else(|| DomainError::not_found("webhook log"))?;
        log.status_code = status_code;
        log.duration_ms = Some(duration_ms);
        log.error = error.map(str::to_string);
        log.updated_at = Utc::now();
        Ok(())
    }
}

struct MemoryTx<'a> {
    state: &'a mut MemoryState,
}

fn unique_violation(what: &str) -> DomainError {
    DomainError::validation(format!("duplicate {what}"))
}

fn default_key(m: &VariantMapping) -> Option<(Uuid, String)> {
    if !m.is_default || m.order_item_id.is_some() {
        return None;
    }
    Some((m.bundle_slot_id.unwrap_or(m.product_variant_id), m.country_code.clone()))
}

impl MemoryTx<'_> {
    fn check_order_unique(&self, order: &Order) -> Result<(), DomainError> {
        let Some(external_id) = &order.external_id else {
            return Ok(());
        };
        let clash = self.state.orders.values().any(|o| {
            o.id != order.id
                && o.external_id.as_ref() == Some(external_id)
                && match (o.owner, order.owner) {
                    (OrderOwner::Store(a), OrderOwner::Store(b)) => a == b,
                    (OrderOwner::User(_), OrderOwner::User(_)) => true,
                    _ => false,
                }
        });
        if clash {
            return Err(unique_violation("order external id"));
        }
        Ok(())
    }

    fn check_item_unique(&self, item: &OrderItem) -> Result<(), DomainError> {
        let (Some(line_id), true) = (&item.external_line_id, item.is_active()) else {
            return Ok(());
        };
        let clash = self.state.items.values().any(|i| {
            i.id != item.id
                && i.order_id == item.order_id
                && i.is_active()
                && i.external_line_id.as_ref() == Some(line_id)
        });
        if clash {
            return Err(unique_violation("active external line id"));
        }
        Ok(())
    }

    fn check_default_unique(&self, mapping: &VariantMapping) -> Result<(), DomainError> {
        let Some(key) = default_key(mapping) else {
            return Ok(());
        };
        let clash = self
            .state
            .mappings
            .values()
            .any(|m| m.id != mapping.id && default_key(m).as_ref() == Some(&key));
        if clash {
            return Err(unique_violation("default mapping"));
        }
        Ok(())
    }
}

impl OrderTx for MemoryTx<'_> {
    fn find_store(&mut self, id: Uuid) -> Result<Option<Store>, DomainError> {
        Ok(self.state.stores.get(&id).cloned())
    }

    fn find_store_by_domain(
        &mut self,
        platform: Platform,
        shop_domain: &str,
    ) -> Result<Option<Store>, DomainError> {
        Ok(self
            .state
            .stores
            .values()
            .find(|s| s.platform == platform && s.shop_domain.eq_ignore_ascii_case(shop_domain))
            .cloned())
    }

    fn update_store(&mut self, store: &Store) -> Result<(), DomainError> {
        self.state.stores.insert(store.id, store.clone());
        Ok(())
    }

    fn find_product_variant(&mut self, id: Uuid) -> Result<Option<ProductVariant>, DomainError> {
        Ok(self.state.variants.get(&id).cloned())
    }

    fn find_product_variant_by_external(
        &mut self,
        store_id: Uuid,
        external_id: &str,
    ) -> Result<Option<ProductVariant>, DomainError> {
        Ok(self
            .state
            .variants
            .values()
            .find(|v| v.store_id == store_id && v.external_id == external_id)
            .cloned())
    }

    fn find_order_by_uid(&mut self, uid: &str) -> Result<Option<Order>, DomainError> {
        Ok(self.state.orders.values().find(|o| o.uid == uid).cloned())
    }

    fn find_order_by_external(
        &mut self,
        owner: OrderOwner,
        external_id: &str,
    ) -> Result<Option<Order>, DomainError> {
        Ok(self
            .state
            .orders
            .values()
            .find(|o| {
                o.external_id.as_deref() == Some(external_id)
                    && match (owner, o.owner) {
                        (OrderOwner::Store(a), OrderOwner::Store(b)) => a == b,
                        (OrderOwner::User(_), OrderOwner::User(_)) => true,
                        _ => false,
                    }
            })
            .cloned())
    }

    fn lock_order(&mut self, id: Uuid) -> Result<Order, DomainError> {
        self.state
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("order"))
    }

    fn insert_order(&mut self, order: &Order) -> Result<(), DomainError> {
        self.check_order_unique(order)?;
        if self.state.orders.values().any(|o| o.uid == order.uid) {
            return Err(unique_violation("order uid"));
        }
        self.state.orders.insert(order.id, order.clone());
        Ok(())
    }

    fn update_order(&mut self, order: &Order) -> Result<(), DomainError> {
        self.check_order_unique(order)?;
        match self.state.orders.get_mut(&order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(())
            }
            None => Err(DomainError::not_found("order")),
        }
    }

    fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>, DomainError> {
        let mut items: Vec<OrderItem> = self
            .state
            .items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    fn insert_item(&mut self, item: &OrderItem) -> Result<(), DomainError> {
        self.check_item_unique(item)?;
        self.state.items.insert(item.id, item.clone());
        Ok(())
    }

    fn update_item(&mut self, item: &OrderItem) -> Result<(), DomainError> {
        self.check_item_unique(item)?;
        self.state.items.insert(item.id, item.clone());
        Ok(())
    }

    fn shipping_address(&mut self, order_id: Uuid) -> Result<Option<ShippingAddress>, DomainError> {
        Ok(self.state.addresses.get(&order_id).cloned())
    }

    fn replace_shipping_address(
        &mut self,
        order_id: Uuid,
        address: Option<&ShippingAddress>,
    ) -> Result<(), DomainError> {
        match address {
            Some(a) => self.state.addresses.insert(order_id, a.clone()),
            None => self.state.addresses.remove(&order_id),
        };
        Ok(())
    }

    fn find_mapping(&mut self, id: Uuid) -> Result<Option<VariantMapping>, DomainError> {
        Ok(self.state.mappings.get(&id).cloned())
    }

    fn snapshot_mappings(
        &mut self,
        order_item_id: Uuid,
    ) -> Result<Vec<VariantMapping>, DomainError> {
        let mut found: Vec<VariantMapping> = self
            .state
            .mappings
            .values()
            .filter(|m| m.order_item_id == Some(order_item_id))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.slot_position.unwrap_or(0));
        Ok(found)
    }

    fn default_mapping(
        &mut self,
        product_variant_id: Uuid,
        country: &str,
    ) -> Result<Option<VariantMapping>, DomainError> {
        Ok(self
            .state
            .mappings
            .values()
            .find(|m| {
                m.is_default
                    && m.product_variant_id == product_variant_id
                    && m.bundle_slot_id.is_none()
                    && m.order_item_id.is_none()
                    && m.country_code == country
            })
            .cloned())
    }

    fn variant_defaults(
        &mut self,
        product_variant_id: Uuid,
    ) -> Result<Vec<VariantMapping>, DomainError> {
        Ok(self
            .state
            .mappings
            .values()
            .filter(|m| {
                m.is_default
                    && m.product_variant_id == product_variant_id
                    && m.bundle_slot_id.is_none()
                    && m.order_item_id.is_none()
            })
            .cloned()
            .collect())
    }

    fn slot_default_mapping(
        &mut self,
        slot_id: Uuid,
        country: &str,
    ) -> Result<Option<VariantMapping>, DomainError> {
        Ok(self
            .state
            .mappings
            .values()
            .find(|m| {
                m.is_default && m.bundle_slot_id == Some(slot_id) && m.country_code == country
            })
            .cloned())
    }

    fn slot_mappings(&mut self, slot_id: Uuid) -> Result<Vec<VariantMapping>, DomainError> {
        Ok(self
            .state
            .mappings
            .values()
            .filter(|m| m.bundle_slot_id == Some(slot_id) && m.order_item_id.is_none())
            .cloned()
            .collect())
    }

    fn insert_mapping(&mut self, mapping: &VariantMapping) -> Result<(), DomainError> {
        self.check_default_unique(mapping)?;
        self.state.mappings.insert(mapping.id, mapping.clone());
        Ok(())
    }

    fn update_mapping(&mut self, mapping: &VariantMapping) -> Result<(), DomainError> {
        self.check_default_unique(mapping)?;
        self.state.mappings.insert(mapping.id, mapping.clone());
        Ok(())
    }

    fn delete_mapping(&mut self, id: Uuid) -> Result<(), DomainError> {
        self.state.mappings.remove(&id);
        Ok(())
    }

    fn mapping_is_referenced(&mut self, id: Uuid) -> Result<bool, DomainError> {
        Ok(self.state.mappings.values().any(|m| m.source_mapping_id == Some(id)))
    }

    fn find_bundle(&mut self, product_variant_id: Uuid) -> Result<Option<Bundle>, DomainError> {
        Ok(self
            .state
            .bundles
            .values()
            .find(|b| b.product_variant_id == product_variant_id)
            .cloned())
    }

    fn insert_bundle(&mut self, bundle: &Bundle) -> Result<(), DomainError> {
        if self
            .state
            .bundles
            .values()
            .any(|b| b.product_variant_id == bundle.product_variant_id)
        {
            return Err(unique_violation("bundle for variant"));
        }
        self.state.bundles.insert(bundle.id, bundle.clone());
        Ok(())
    }

    fn insert_bundle_slot(&mut self, slot: &BundleSlot) -> Result<(), DomainError> {
        let bundle = self
            .state
            .bundles
            .get_mut(&slot.bundle_id)
            .ok_or_else(|| DomainError::not_found("bundle"))?;
        if bundle.slots.iter().any(|s| s.slot_position == slot.slot_position) {
            return Err(unique_violation("slot position"));
        }
        bundle.slots.push(slot.clone());
        bundle.slots.sort_by_key(|s| s.slot_position);
        Ok(())
    }

    fn delete_bundle_slot(&mut self, id: Uuid) -> Result<(), DomainError> {
        for bundle in self.state.bundles.values_mut() {
            bundle.slots.retain(|s| s.id != id);
        }
        Ok(())
    }

    fn find_fulfillment_by_external(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Fulfillment>, DomainError> {
        Ok(self
            .state
            .fulfillments
            .values()
            .find(|f| f.external_id == external_id)
            .cloned())
    }

    fn fulfillments(&mut self, order_id: Uuid) -> Result<Vec<Fulfillment>, DomainError> {
        let mut found: Vec<Fulfillment> = self
            .state
            .fulfillments
            .values()
            .filter(|f| f.order_id == order_id)
            .cloned()
            .collect();
        found.sort_by_key(|f| f.created_at);
        Ok(found)
    }

    fn insert_fulfillment(&mut self, fulfillment: &Fulfillment) -> Result<(), DomainError> {
        if self
            .state
            .fulfillments
            .values()
            .any(|f| f.external_id == fulfillment.external_id)
        {
            return Err(DomainError::DuplicateEvent(fulfillment.external_id.clone()));
        }
        self.state.fulfillments.insert(fulfillment.id, fulfillment.clone());
        Ok(())
    }

    fn update_fulfillment(&mut self, fulfillment: &Fulfillment) -> Result<(), DomainError> {
        let existing = self
            .state
            .fulfillments
            .get_mut(&fulfillment.id)
            .ok_or_else(|| DomainError::not_found("fulfillment"))?;
        existing.status = fulfillment.status;
        existing.tracking = fulfillment.tracking.clone();
        existing.shipped_at = fulfillment.shipped_at;
        existing.updated_at = fulfillment.updated_at;
        Ok(())
    }

    fn link_platform_fulfillment(
        &mut self,
        fulfillment_id: Uuid,
        platform_fulfillment_id: &str,
    ) -> Result<(), DomainError> {
        let existing = self
            .state
            .fulfillments
            .get_mut(&fulfillment_id)
            .ok_or_else(|| DomainError::not_found("fulfillment"))?;
        existing.platform_fulfillment_id = Some(platform_fulfillment_id.to_string());
        Ok(())
    }

    fn record_activity(&mut self, activity: &OrderActivity) -> Result<(), DomainError> {
        self.state.activities.push(activity.clone());
        Ok(())
    }

    fn enqueue(&mut self, event: &OutboxEvent) -> Result<(), DomainError> {
        self.state.outbox.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryStore::new();
        let dyn_store: &dyn OrderStore = &store;
        let order = Order::new(OrderOwner::User(Uuid::new_v4()), None, "USD");

        let result: Result<(), DomainError> = dyn_store.transaction(|tx| {
            tx.insert_order(&order)?;
            Err(DomainError::validation("boom"))
        });

        assert!(result.is_err());
        assert!(store.read(|s| s.orders.is_empty()));
    }

    #[test]
    fn duplicate_external_id_per_store_is_rejected() {
        let store = InMemoryStore::new();
        let dyn_store: &dyn OrderStore = &store;
        let store_id = Uuid::new_v4();
        let first = Order::new(OrderOwner::Store(store_id), Some("1001".into()), "USD");
        let second = Order::new(OrderOwner::Store(store_id), Some("1001".into()), "USD");
        let other_store = Order::new(OrderOwner::Store(Uuid::new_v4()), Some("1001".into()), "USD");

        dyn_store.transaction(|tx| tx.insert_order(&first)).unwrap();
        assert!(dyn_store.transaction(|tx| tx.insert_order(&second)).is_err());
        assert!(dyn_store.transaction(|tx| tx.insert_order(&other_store)).is_ok());
    }

    #[test]
    fn webhook_claims_dedup_and_reclaim_after_server_error() {
        let store = InMemoryStore::new();
        let mut log = WebhookLog::start(&crate::domain::webhook::WebhookEnvelope {
            topic: crate::domain::webhook::WebhookTopic::OrdersCreate,
            shop_domain: None,
            webhook_id: Some("evt-1".into()),
            api_version: None,
        });

        let Claim::Started(id) = store.claim(&log).unwrap() else {
            panic!("first delivery should start");
        };
        log.id = Uuid::new_v4();
        assert_eq!(store.claim(&log).unwrap(), Claim::Duplicate);

        store.finish(id, 500, 3, Some("db down")).unwrap();
        assert_eq!(store.claim(&log).unwrap(), Claim::Started(id));
        assert_eq!(store.read(|s| s.webhook_logs.len()), 1);
    }
}
