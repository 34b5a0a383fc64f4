//! Test doubles and a seeded fixture shared by the service tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{ServiceSettings, Services};
use crate::domain::activity::Actor;
use crate::domain::errors::{DomainError, ExternalApiError};
use crate::domain::mapping::{CropRegion, FrameSpec, VariantMapping};
use crate::domain::order::{Order, OrderItem, OrderOwner, OrderTotals, ShippingAddress};
use crate::domain::platform::{
    FulfillmentOrder, FulfillmentOrderLine, MerchantRequest, PlatformAdapter, PlatformShipment,
    RegisteredService, RemoteLineItem, RemoteOrder,
};
use crate::domain::ports::PlatformGateway;
use crate::domain::production::{DraftOrderRequest, ProductionAck, ProductionApi};
use crate::domain::store::{Platform, ProductVariant, Store};
use crate::infrastructure::memory::InMemoryStore;

#[derive(Default)]
struct PlatformState {
    orders: HashMap<String, RemoteOrder>,
    open: HashMap<String, Vec<FulfillmentOrder>>,
    created: Vec<PlatformShipment>,
    fulfillment_requests: Vec<MerchantRequest>,
    cancellation_requests: Vec<MerchantRequest>,
    accepted_fulfillments: Vec<String>,
    accepted_cancellations: Vec<String>,
    rejected_cancellations: Vec<(String, String)>,
    registrations: usize,
    inventory: HashSet<(String, String)>,
    reject_credentials: bool,
}

type Hook = Box<dyn FnOnce() + Send>;

/// Scriptable storefront shared by every adapter the fake gateway hands out.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<PlatformState>,
    before_cancellation_accepted: Mutex<Option<Hook>>,
}

impl FakePlatform {
    fn with<T>(&self, f: impl FnOnce(&mut PlatformState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn put_order(&self, order: RemoteOrder) {
        self.with(|s| s.orders.insert(order.external_id.clone(), order));
    }

    pub fn reject_credentials(&self, reject: bool) {
        self.with(|s| s.reject_credentials = reject);
    }

    pub fn open_fulfillment_order(&self, order_external_id: &str, lines: &[(&str, i32)]) {
        let fo = FulfillmentOrder {
            id: format!("fo-{order_external_id}"),
            lines: lines
                .iter()
                .enumerate()
                .map(|(n, (line_item_id, remaining))| FulfillmentOrderLine {
                    id: format!("fol-{order_external_id}-{n}"),
                    line_item_id: line_item_id.to_string(),
                    remaining_quantity: *remaining,
                })
                .collect(),
        };
        self.with(|s| s.open.entry(order_external_id.to_string()).or_default().push(fo));
    }

    pub fn request_fulfillment(&self, fulfillment_order_id: &str, order_external_id: &str) {
        let pending = request(fulfillment_order_id, order_external_id);
        self.with(|s| s.fulfillment_requests.push(pending));
    }

    pub fn request_cancellation(&self, fulfillment_order_id: &str, order_external_id: &str) {
        let pending = request(fulfillment_order_id, order_external_id);
        self.with(|s| s.cancellation_requests.push(pending));
    }

    /// Run `hook` once, just before the next cancellation request is accepted.
    pub fn before_cancellation_accepted(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_cancellation_accepted.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn created_fulfillments(&self) -> Vec<PlatformShipment> {
        self.with(|s| s.created.clone())
    }

    pub fn accepted_fulfillments(&self) -> Vec<String> {
        self.with(|s| s.accepted_fulfillments.clone())
    }

    pub fn accepted_cancellations(&self) -> Vec<String> {
        self.with(|s| s.accepted_cancellations.clone())
    }

    pub fn rejected_cancellations(&self) -> Vec<(String, String)> {
        self.with(|s| s.rejected_cancellations.clone())
    }

    pub fn registrations(&self) -> usize {
        self.with(|s| s.registrations)
    }

    pub fn active_inventory(&self) -> Vec<(String, String)> {
        self.with(|s| s.inventory.iter().cloned().collect())
    }
}

fn request(fulfillment_order_id: &str, order_external_id: &str) -> MerchantRequest {
    MerchantRequest {
        fulfillment_order_id: fulfillment_order_id.into(),
        order_external_id: order_external_id.into(),
        message: None,
    }
}

struct FakeAdapter {
    platform: Platform,
    shared: Arc<FakePlatform>,
}

impl FakeAdapter {
    fn call<T>(
        &self,
        f: impl FnOnce(&mut PlatformState) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        self.shared.with(|s| {
            if s.reject_credentials {
                return Err(DomainError::Authentication("401 Unauthorized".into()));
            }
            f(s)
        })
    }
}

impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn fetch_order(&self, external_order_id: &str) -> Result<RemoteOrder, DomainError> {
        self.call(|s| {
            s.orders
                .get(external_order_id)
                .cloned()
                .ok_or_else(|| DomainError::not_found(format!("remote order {external_order_id}")))
        })
    }

    fn open_fulfillment_orders(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<FulfillmentOrder>, DomainError> {
        self.call(|s| Ok(s.open.get(external_order_id).cloned().unwrap_or_default()))
    }

    fn create_fulfillment(&self, shipment: &PlatformShipment) -> Result<String, DomainError> {
        self.call(|s| {
            s.created.push(shipment.clone());
            Ok(format!("gid://shopify/Fulfillment/{}", s.created.len()))
        })
    }

    fn pending_fulfillment_requests(&self) -> Result<Vec<MerchantRequest>, DomainError> {
        self.call(|s| Ok(s.fulfillment_requests.clone()))
    }

    fn pending_cancellation_requests(&self) -> Result<Vec<MerchantRequest>, DomainError> {
        self.call(|s| Ok(s.cancellation_requests.clone()))
    }

    fn accept_fulfillment_request(
        &self,
        fulfillment_order_id: &str,
        _message: &str,
    ) -> Result<(), DomainError> {
        self.call(|s| {
            s.accepted_fulfillments.push(fulfillment_order_id.into());
            Ok(())
        })
    }

    fn accept_cancellation_request(
        &self,
        fulfillment_order_id: &str,
        _message: &str,
    ) -> Result<(), DomainError> {
        let hook = self.shared.before_cancellation_accepted.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.call(|s| {
            s.accepted_cancellations.push(fulfillment_order_id.into());
            Ok(())
        })
    }

    fn reject_cancellation_request(
        &self,
        fulfillment_order_id: &str,
        message: &str,
    ) -> Result<(), DomainError> {
        self.call(|s| {
            s.rejected_cancellations
                .push((fulfillment_order_id.into(), message.into()));
            Ok(())
        })
    }

    fn register_fulfillment_service(
        &self,
        _name: &str,
        _callback_url: Option<&str>,
    ) -> Result<RegisteredService, DomainError> {
        self.call(|s| {
            s.registrations += 1;
            Ok(RegisteredService {
                service_id: format!("fs-{}", s.registrations),
                location_id: format!("loc-{}", s.registrations),
            })
        })
    }

    fn unregister_fulfillment_service(&self, _service_id: &str) -> Result<(), DomainError> {
        self.call(|_| Ok(()))
    }

    fn activate_inventory(
        &self,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<(), DomainError> {
        self.call(|s| {
            s.inventory.insert((inventory_item_id.into(), location_id.into()));
            Ok(())
        })
    }

    fn deactivate_inventory(
        &self,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<(), DomainError> {
        self.call(|s| {
            s.inventory.remove(&(inventory_item_id.to_string(), location_id.to_string()));
            Ok(())
        })
    }
}

struct FakeGateway {
    shared: Arc<FakePlatform>,
}

impl PlatformGateway for FakeGateway {
    fn adapter_for(&self, store: &Store) -> Result<Box<dyn PlatformAdapter>, DomainError> {
        Ok(Box::new(FakeAdapter {
            platform: store.platform,
            shared: self.shared.clone(),
        }))
    }
}

/// Production API answering from a queue, then with generated ids.
#[derive(Default)]
pub struct ScriptedProduction {
    responses: Mutex<VecDeque<Result<ProductionAck, ExternalApiError>>>,
    requests: Mutex<Vec<DraftOrderRequest>>,
}

impl ScriptedProduction {
    pub fn respond(&self, response: Result<ProductionAck, ExternalApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<DraftOrderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl ProductionApi for ScriptedProduction {
    fn create_draft_order(
        &self,
        request: &DraftOrderRequest,
    ) -> Result<ProductionAck, ExternalApiError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let n = requests.len();
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ProductionAck {
                production_order_id: format!("P-{n}"),
                promised_dispatch_date: None,
            })
        })
    }
}

pub fn frame() -> FrameSpec {
    FrameSpec {
        frame_sku_id: "FR-30x40-BLK".into(),
        width: 30.0,
        height: 40.0,
        unit: "cm".into(),
        cost: 1250,
    }
}

pub fn address() -> ShippingAddress {
    ShippingAddress {
        name: Some("Ada Lovelace".into()),
        address1: Some("1 Main St".into()),
        city: Some("Springfield".into()),
        zip: Some("12345".into()),
        country_code: Some("US".into()),
        ..ShippingAddress::default()
    }
}

pub struct Fixture {
    pub memory: Arc<InMemoryStore>,
    pub platform: Arc<FakePlatform>,
    pub production: Arc<ScriptedProduction>,
    pub services: Services,
    /// Seeded Shopify store, `demo.myshopify.com`.
    pub store: Store,
    next_order: AtomicU32,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_production_calls(true)
    }

    pub fn with_production_calls(calls_production: bool) -> Self {
        let memory = Arc::new(InMemoryStore::new());
        let platform = Arc::new(FakePlatform::default());
        let production = Arc::new(ScriptedProduction::default());
        let store = Store {
            id: Uuid::new_v4(),
            platform: Platform::Shopify,
            shop_domain: "demo.myshopify.com".into(),
            access_token: "shpat_test".into(),
            owner_user_id: Uuid::new_v4(),
            needs_reauth: false,
            uninstalled_at: None,
            fulfillment_service_id: None,
            fulfillment_location_id: None,
        };
        memory.seed(|s| {
            s.stores.insert(store.id, store.clone());
        });

        let settings = ServiceSettings {
            submit_calls_production: calls_production,
            ..ServiceSettings::default()
        };
        let services = Services::new(
            memory.clone(),
            memory.clone(),
            Arc::new(FakeGateway {
                shared: platform.clone(),
            }),
            production.clone(),
            &settings,
        );
        Fixture {
            memory,
            platform,
            production,
            services,
            store,
            next_order: AtomicU32::new(1001),
        }
    }

    /// Seed a storefront variant of the fixture store.
    pub fn variant(&self, external_id: &str) -> Uuid {
        let existing = self.memory.read(|s| {
            s.variants
                .values()
                .find(|v| v.store_id == self.store.id && v.external_id == external_id)
                .map(|v| v.id)
        });
        if let Some(id) = existing {
            return id;
        }
        let variant = ProductVariant {
            id: Uuid::new_v4(),
            store_id: self.store.id,
            external_id: external_id.into(),
            inventory_item_id: Some(format!("inv-{external_id}")),
        };
        let id = variant.id;
        self.memory.seed(|s| {
            s.variants.insert(variant.id, variant);
        });
        id
    }

    /// Storefront draft order with one item per quantity, lines `line-1`, `line-2`, ...
    pub fn draft_order_with_items(&self, quantities: &[i32]) -> Order {
        let external_id = self.next_order.fetch_add(1, Ordering::SeqCst).to_string();
        let owner = OrderOwner::Store(self.store.id);
        let mut order = Order::new(owner, Some(external_id.clone()), "USD");
        order.name = format!("#{external_id}");
        order.email = Some("buyer@example.com".into());
        order.country_code = Some("US".into());
        order.placed_at = Some(Utc::now());

        let mut items = Vec::new();
        for (n, quantity) in quantities.iter().enumerate() {
            let variant_id = self.variant(&format!("var-{external_id}-{}", n + 1));
            let mut item = OrderItem::new(order.id, format!("Print {}", n + 1), *quantity);
            item.external_line_id = Some(format!("line-{}", n + 1));
            item.unit_price = 2500;
            item.product_variant_id = Some(variant_id);
            items.push(item);
        }
        let subtotal = items.iter().map(|i| i.unit_price * i64::from(i.quantity)).sum();
        order.totals = OrderTotals {
            subtotal,
            total: subtotal,
            ..OrderTotals::default()
        };

        self.memory.seed(|s| {
            s.orders.insert(order.id, order.clone());
            for item in items {
                s.items.insert(item.id, item);
            }
            s.addresses.insert(order.id, address());
        });
        order
    }

    /// Give every active item of `order` a US catalog default.
    pub fn map_all_items(&self, order: &Order) {
        let items: Vec<OrderItem> = self
            .memory
            .read(|s| s.active_items(order.id).into_iter().cloned().collect());
        for item in &items {
            self.map_item(item);
        }
    }

    fn map_item(&self, item: &OrderItem) {
        let Some(variant_id) = item.product_variant_id else {
            return;
        };
        let mut mapping = VariantMapping::new_default(variant_id, "US".into(), frame());
        mapping.image_id = Some(format!("img-{}", item.id));
        mapping.crop = CropRegion {
            cx: 10.0,
            cy: 10.0,
            cw: 300.0,
            ch: 400.0,
        };
        self.memory.seed(|s| {
            s.mappings.insert(mapping.id, mapping);
        });
    }

    /// Draft order, mapped and successfully submitted.
    pub fn order_in_production(&self, quantities: &[i32]) -> Order {
        let order = self.draft_order_with_items(quantities);
        self.map_all_items(&order);
        let result = self.services.submissions.submit(Actor::System, &order.uid).unwrap();
        assert!(result.is_success(), "submission failed: {result:?}");
        self.memory.read(|s| s.orders[&order.id].clone())
    }

    /// Remote order whose lines reference variants seeded as `var-<line>`.
    pub fn remote_order(&self, external_id: &str, lines: &[(&str, i32)]) -> RemoteOrder {
        let line_items = lines
            .iter()
            .map(|(line_id, quantity)| {
                let variant_external_id = format!("var-{line_id}");
                self.variant(&variant_external_id);
                RemoteLineItem {
                    external_line_id: line_id.to_string(),
                    title: format!("Print {line_id}"),
                    sku: Some(format!("SKU-{line_id}")),
                    quantity: *quantity,
                    unit_price: 2500,
                    tax: 0,
                    discount: 0,
                    variant_external_id: Some(variant_external_id),
                    raw: json!({ "id": line_id, "quantity": quantity }),
                }
            })
            .collect::<Vec<_>>();
        let subtotal = line_items.iter().map(|l| l.unit_price * i64::from(l.quantity)).sum();
        RemoteOrder {
            external_id: external_id.into(),
            name: format!("#{external_id}"),
            email: Some("buyer@example.com".into()),
            currency: "USD".into(),
            totals: OrderTotals {
                subtotal,
                total: subtotal,
                ..OrderTotals::default()
            },
            cancelled: false,
            placed_at: Some(Utc::now()),
            line_items,
            shipping_address: Some(address()),
            raw: json!({ "id": external_id }),
        }
    }
}
