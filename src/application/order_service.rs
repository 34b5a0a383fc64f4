use std::sync::Arc;

use chrono::Utc;
use log::info;
use serde_json::json;
use uuid::Uuid;

use crate::domain::activity::{Actor, OrderActivity, OutboxEvent};
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::{Coverage, Fulfillment};
use crate::domain::mapping::normalize_country;
use crate::domain::order::{
    DisplayStatus, Order, OrderEvent, OrderItem, OrderOwner, OrderStatus, OrderTotals,
    ShippingAddress,
};
use crate::domain::ports::{OrderStore, OrderTx};

/// Apply a lifecycle event to a locked order and persist it together with
/// its audit entry and outbox event.
pub(crate) fn transition(
    tx: &mut dyn OrderTx,
    order: &mut Order,
    event: OrderEvent,
    actor: Actor,
) -> Result<OrderStatus, DomainError> {
    let from = order.status;
    let to = order.apply(event, Utc::now())?;
    tx.update_order(order)?;
    tx.record_activity(
        &OrderActivity::new(order.id, actor, "status_changed", format!("{from} → {to}"))
            .with_details(json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "event": event.action(),
            })),
    )?;
    tx.enqueue(&OutboxEvent::order_status_changed(&order.uid, from.as_str(), to.as_str()))?;
    info!("order {} {} → {}", order.uid, from, to);
    Ok(to)
}

/// Find an order by public uid and take its lock.
pub(crate) fn lock_by_uid(tx: &mut dyn OrderTx, uid: &str) -> Result<Order, DomainError> {
    let order = tx
        .find_order_by_uid(uid)?
        .ok_or_else(|| DomainError::not_found(format!("order {uid}")))?;
    tx.lock_order(order.id)
}

pub(crate) fn active_items(
    tx: &mut dyn OrderTx,
    order_id: Uuid,
) -> Result<Vec<OrderItem>, DomainError> {
    Ok(tx.order_items(order_id)?.into_iter().filter(OrderItem::is_active).collect())
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub order: Order,
    pub display_status: DisplayStatus,
    pub items: Vec<OrderItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub fulfillments: Vec<Fulfillment>,
}

#[derive(Debug, Clone)]
pub struct ManualItemInput {
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub product_variant_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ManualOrderInput {
    pub external_id: Option<String>,
    pub currency: String,
    pub email: Option<String>,
    pub items: Vec<ManualItemInput>,
    pub shipping_address: ShippingAddress,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub fn get_order(&self, uid: &str) -> Result<Option<OrderView>, DomainError> {
        self.store.transaction(|tx| {
            let Some(order) = tx.find_order_by_uid(uid)? else {
                return Ok(None);
            };
            let items = active_items(tx, order.id)?;
            let fulfillments = tx.fulfillments(order.id)?;
            let coverage = Coverage::compute(&items, &fulfillments);
            Ok(Some(OrderView {
                display_status: order.display_status(&coverage),
                shipping_address: tx.shipping_address(order.id)?,
                order,
                items,
                fulfillments,
            }))
        })
    }

    /// Store-less draft order placed directly by a user.
    pub fn create_manual_order(
        &self,
        actor: Actor,
        input: ManualOrderInput,
    ) -> Result<Order, DomainError> {
        let Actor::User(user_id) = actor else {
            return Err(DomainError::validation("manual orders need a user"));
        };
        if input.items.is_empty() {
            return Err(DomainError::validation("order needs at least one item"));
        }
        if let Some(bad) = input.items.iter().find(|i| i.quantity <= 0) {
            return Err(DomainError::validation(format!(
                "quantity for '{}' must be positive",
                bad.title
            )));
        }
        let country = input
            .shipping_address
            .country_code
            .as_deref()
            .map(normalize_country)
            .transpose()?;

        self.store.transaction(|tx| {
            let mut order = Order::new(
                OrderOwner::User(user_id),
                input.external_id.clone(),
                input.currency.clone(),
            );
            order.name = order.uid.clone();
            order.email = input.email.clone();
            order.country_code = country.clone();
            order.placed_at = Some(order.created_at);
            let subtotal: i64 = input
                .items
                .iter()
                .map(|i| i.unit_price * i64::from(i.quantity))
                .sum();
            order.totals = OrderTotals {
                subtotal,
                total: subtotal,
                ..OrderTotals::default()
            };
            tx.insert_order(&order)?;

            for input_item in &input.items {
                if let Some(variant_id) = input_item.product_variant_id {
                    tx.find_product_variant(variant_id)?.ok_or_else(|| {
                        DomainError::not_found(format!("product variant {variant_id}"))
                    })?;
                }
                let mut item =
                    OrderItem::new(order.id, input_item.title.clone(), input_item.quantity);
                item.sku = input_item.sku.clone();
                item.unit_price = input_item.unit_price;
                item.product_variant_id = input_item.product_variant_id;
                tx.insert_item(&item)?;
            }
            tx.replace_shipping_address(order.id, Some(&input.shipping_address))?;
            tx.record_activity(&OrderActivity::new(
                order.id,
                actor,
                "created",
                "manual order created",
            ))?;
            info!("manual order {} created by {}", order.uid, user_id);
            Ok(order)
        })
    }

    pub fn cancel(&self, actor: Actor, uid: &str) -> Result<Order, DomainError> {
        self.apply(actor, uid, OrderEvent::Cancel)
    }

    pub fn reopen(&self, actor: Actor, uid: &str) -> Result<Order, DomainError> {
        self.apply(actor, uid, OrderEvent::Reopen)
    }

    pub fn complete(&self, actor: Actor, uid: &str) -> Result<Order, DomainError> {
        self.apply(actor, uid, OrderEvent::Complete)
    }

    fn apply(&self, actor: Actor, uid: &str, event: OrderEvent) -> Result<Order, DomainError> {
        self.store.transaction(|tx| {
            let mut order = lock_by_uid(tx, uid)?;
            transition(tx, &mut order, event, actor)?;
            Ok(order)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Fixture;

    fn manual_input() -> ManualOrderInput {
        ManualOrderInput {
            external_id: Some("M-1".into()),
            currency: "USD".into(),
            email: Some("buyer@example.com".into()),
            items: vec![ManualItemInput {
                title: "Poster".into(),
                sku: None,
                quantity: 2,
                unit_price: 1500,
                product_variant_id: None,
            }],
            shipping_address: ShippingAddress {
                country_code: Some("us".into()),
                ..ShippingAddress::default()
            },
        }
    }

    #[test]
    fn manual_order_starts_as_draft_with_totals() {
        let fx = Fixture::new();
        let order = fx
            .services
            .orders
            .create_manual_order(Actor::User(Uuid::new_v4()), manual_input())
            .unwrap();

        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(order.totals.total, 3000);
        assert_eq!(order.country_code.as_deref(), Some("US"));
        assert_eq!(order.store_id(), None);
    }

    #[test]
    fn manual_external_id_is_unique_among_storeless_orders() {
        let fx = Fixture::new();
        let actor = Actor::User(Uuid::new_v4());
        fx.services.orders.create_manual_order(actor, manual_input()).unwrap();
        let err = fx.services.orders.create_manual_order(actor, manual_input()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn system_actor_cannot_place_manual_orders() {
        let fx = Fixture::new();
        assert!(fx.services.orders.create_manual_order(Actor::System, manual_input()).is_err());
    }

    #[test]
    fn cancel_reopen_records_activity_and_outbox() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        let actor = Actor::User(Uuid::new_v4());

        let cancelled = fx.services.orders.cancel(actor, &order.uid).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        let reopened = fx.services.orders.reopen(actor, &order.uid).unwrap();
        assert_eq!(reopened.status, OrderStatus::Draft);

        fx.memory.read(|s| {
            let changes: Vec<_> = s
                .activities_for(order.id)
                .into_iter()
                .filter(|a| a.kind == "status_changed")
                .collect();
            assert_eq!(changes.len(), 2);
            assert!(changes.iter().all(|a| a.actor_id == actor.user_id()));
            assert_eq!(s.outbox.iter().filter(|e| e.event_type == "OrderStatusChanged").count(), 2);
        });
    }

    #[test]
    fn illegal_transition_has_no_side_effects() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);

        let err = fx.services.orders.reopen(Actor::System, &order.uid).unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { action: "reopen", .. }));
        fx.memory.read(|s| {
            assert!(s.activities_for(order.id).is_empty());
            assert!(s.outbox.is_empty());
        });
    }

    #[test]
    fn unknown_uid_is_not_found() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.services.orders.cancel(Actor::System, "PO-NOPE"),
            Err(DomainError::NotFound(_))
        ));
        assert!(fx.services.orders.get_order("PO-NOPE").unwrap().is_none());
    }
}
