use std::sync::Arc;

use chrono::Utc;
use log::info;
use uuid::Uuid;

use super::platform_calls::{active_store, guard};
use crate::domain::activity::{Actor, OrderActivity};
use crate::domain::errors::DomainError;
use crate::domain::order::OrderOwner;
use crate::domain::ports::{OrderStore, PlatformGateway};
use crate::domain::store::{Platform, ProductVariant, Store};

/// Store lifecycle as seen by order processing: fulfillment service
/// registration, inventory at the service location, uninstall and privacy
/// requests.
#[derive(Clone)]
pub struct StoreService {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PlatformGateway>,
    service_name: String,
    callback_url: Option<String>,
}

impl StoreService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PlatformGateway>,
        service_name: impl Into<String>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            service_name: service_name.into(),
            callback_url,
        }
    }

    pub fn find_by_domain(
        &self,
        platform: Platform,
        shop_domain: &str,
    ) -> Result<Store, DomainError> {
        self.store
            .transaction(|tx| tx.find_store_by_domain(platform, shop_domain))?
            .ok_or_else(|| DomainError::not_found(format!("{platform} store {shop_domain}")))
    }

    /// Register the production backend as the store's fulfillment service.
    /// Already registered stores are returned unchanged.
    pub fn enable_fulfillment_service(&self, store_id: Uuid) -> Result<Store, DomainError> {
        let mut store = active_store(self.store.as_ref(), store_id)?;
        if store.fulfillment_service_id.is_some() {
            return Ok(store);
        }
        let adapter = self.gateway.adapter_for(&store)?;
        let registered = guard(
            self.store.as_ref(),
            &store,
            adapter.register_fulfillment_service(&self.service_name, self.callback_url.as_deref()),
        )?;

        store.fulfillment_service_id = Some(registered.service_id);
        store.fulfillment_location_id = Some(registered.location_id);
        self.store.transaction(|tx| tx.update_store(&store))?;
        info!(
            "fulfillment service registered for {} (location {:?})",
            store.shop_domain, store.fulfillment_location_id
        );
        Ok(store)
    }

    pub fn disable_fulfillment_service(&self, store_id: Uuid) -> Result<Store, DomainError> {
        let mut store = active_store(self.store.as_ref(), store_id)?;
        let Some(service_id) = store.fulfillment_service_id.clone() else {
            return Ok(store);
        };
        let adapter = self.gateway.adapter_for(&store)?;
        guard(self.store.as_ref(), &store, adapter.unregister_fulfillment_service(&service_id))?;

        store.fulfillment_service_id = None;
        store.fulfillment_location_id = None;
        self.store.transaction(|tx| tx.update_store(&store))?;
        info!("fulfillment service removed from {}", store.shop_domain);
        Ok(store)
    }

    /// Stock a variant at the fulfillment service location.
    pub fn activate_inventory(
        &self,
        store_id: Uuid,
        product_variant_id: Uuid,
    ) -> Result<(), DomainError> {
        let (store, inventory_item_id, location_id) =
            self.inventory_target(store_id, product_variant_id)?;
        let adapter = self.gateway.adapter_for(&store)?;
        guard(
            self.store.as_ref(),
            &store,
            adapter.activate_inventory(&inventory_item_id, &location_id),
        )?;
        info!("inventory {inventory_item_id} activated at {location_id} for {}", store.shop_domain);
        Ok(())
    }

    pub fn deactivate_inventory(
        &self,
        store_id: Uuid,
        product_variant_id: Uuid,
    ) -> Result<(), DomainError> {
        let (store, inventory_item_id, location_id) =
            self.inventory_target(store_id, product_variant_id)?;
        let adapter = self.gateway.adapter_for(&store)?;
        guard(
            self.store.as_ref(),
            &store,
            adapter.deactivate_inventory(&inventory_item_id, &location_id),
        )?;
        info!(
            "inventory {inventory_item_id} deactivated at {location_id} for {}",
            store.shop_domain
        );
        Ok(())
    }

    fn inventory_target(
        &self,
        store_id: Uuid,
        product_variant_id: Uuid,
    ) -> Result<(Store, String, String), DomainError> {
        let store = active_store(self.store.as_ref(), store_id)?;
        let location_id = store
            .fulfillment_location_id
            .clone()
            .ok_or_else(|| {
                DomainError::validation("fulfillment service is not enabled for this store")
            })?;
        let variant: ProductVariant = self
            .store
            .transaction(|tx| tx.find_product_variant(product_variant_id))?
            .filter(|v| v.store_id == store.id)
            .ok_or_else(|| {
                DomainError::not_found(format!("product variant {product_variant_id}"))
            })?;
        let inventory_item_id = variant
            .inventory_item_id
            .ok_or_else(|| DomainError::validation("variant has no inventory item"))?;
        Ok((store, inventory_item_id, location_id))
    }

    /// The app was removed from the storefront. Idempotent.
    pub fn mark_uninstalled(&self, store_id: Uuid) -> Result<Store, DomainError> {
        self.store.transaction(|tx| {
            let mut store = tx
                .find_store(store_id)?
                .ok_or_else(|| DomainError::not_found(format!("store {store_id}")))?;
            if store.uninstalled_at.is_none() {
                store.uninstalled_at = Some(Utc::now());
                store.fulfillment_service_id = None;
                store.fulfillment_location_id = None;
                tx.update_store(&store)?;
                info!("{} store {} uninstalled", store.platform, store.shop_domain);
            }
            Ok(store)
        })
    }

    /// Scrub customer personal data from the listed orders. Returns how many
    /// orders were found and redacted.
    pub fn redact_customer(
        &self,
        store_id: Uuid,
        external_order_ids: &[String],
    ) -> Result<usize, DomainError> {
        self.store.transaction(|tx| {
            let mut redacted = 0;
            for external_id in external_order_ids {
                let owner = OrderOwner::Store(store_id);
                let Some(found) = tx.find_order_by_external(owner, external_id)? else {
                    continue;
                };
                let mut order = tx.lock_order(found.id)?;
                order.email = None;
                order.updated_at = Utc::now();
                tx.update_order(&order)?;
                if let Some(address) = tx.shipping_address(order.id)? {
                    tx.replace_shipping_address(order.id, Some(&address.redacted()))?;
                }
                tx.record_activity(&OrderActivity::new(
                    order.id,
                    Actor::System,
                    "customer_redacted",
                    "customer data redacted on request",
                ))?;
                redacted += 1;
            }
            info!("redacted customer data on {redacted} orders of store {store_id}");
            Ok(redacted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Fixture;

    #[test]
    fn enabling_fulfillment_service_stores_location_once() {
        let fx = Fixture::new();
        let first = fx.services.stores.enable_fulfillment_service(fx.store.id).unwrap();
        let second = fx.services.stores.enable_fulfillment_service(fx.store.id).unwrap();

        assert!(first.fulfillment_location_id.is_some());
        assert_eq!(first, second);
        assert_eq!(fx.platform.registrations(), 1);

        let disabled = fx.services.stores.disable_fulfillment_service(fx.store.id).unwrap();
        assert_eq!(disabled.fulfillment_service_id, None);
    }

    #[test]
    fn inventory_needs_a_fulfillment_location() {
        let fx = Fixture::new();
        let variant = fx.variant("var-inv");

        let err = fx.services.stores.activate_inventory(fx.store.id, variant).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        fx.services.stores.enable_fulfillment_service(fx.store.id).unwrap();
        fx.services.stores.activate_inventory(fx.store.id, variant).unwrap();
        assert_eq!(fx.platform.active_inventory().len(), 1);
        fx.services.stores.deactivate_inventory(fx.store.id, variant).unwrap();
        assert!(fx.platform.active_inventory().is_empty());
    }

    #[test]
    fn uninstall_is_idempotent_and_blocks_platform_calls() {
        let fx = Fixture::new();
        let first = fx.services.stores.mark_uninstalled(fx.store.id).unwrap();
        let again = fx.services.stores.mark_uninstalled(fx.store.id).unwrap();
        assert_eq!(first.uninstalled_at, again.uninstalled_at);

        let err = fx.services.stores.enable_fulfillment_service(fx.store.id).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn redaction_keeps_country_only() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);

        let count = fx
            .services
            .stores
            .redact_customer(fx.store.id, &[order.external_id.clone().unwrap(), "missing".into()])
            .unwrap();

        assert_eq!(count, 1);
        fx.memory.read(|s| {
            let address = &s.addresses[&order.id];
            assert_eq!(address.name, None);
            assert_eq!(address.country_code.as_deref(), Some("US"));
            assert_eq!(s.orders[&order.id].email, None);
        });
    }
}
