use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use super::order_service::{active_items, lock_by_uid, transition};
use super::platform_calls::{active_store, guard};
use crate::domain::activity::{Actor, OrderActivity, OutboxEvent};
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::{
    platform_key, Coverage, Fulfillment, FulfillmentSource, FulfillmentStatus, Tracking,
};
use crate::domain::order::{Order, OrderEvent, OrderItem, OrderOwner, OrderStatus};
use crate::domain::platform::{FulfillmentOrder, PlatformShipment, ShipmentGroup, ShipmentLine};
use crate::domain::ports::{OrderStore, OrderTx, PlatformGateway};

/// How a shipment event names its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    External { store_id: Uuid, external_order_id: String },
    Uid(String),
}

/// How a shipment event names one shipped line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRef {
    /// Storefront order line id.
    ExternalLine(String),
    /// Frozen mapping sent to production; resolves to the item it was frozen for.
    VariantMapping(Uuid),
    Item(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippedLine {
    pub line_ref: LineRef,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundShipment {
    pub order_ref: OrderRef,
    /// Idempotency key: the same id is recorded at most once.
    pub external_id: String,
    pub source: FulfillmentSource,
    pub status: FulfillmentStatus,
    pub tracking: Tracking,
    pub lines: Vec<ShippedLine>,
    pub notify_customer: bool,
    /// Id the storefront gave this fulfillment, for storefront events.
    pub platform_fulfillment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShipmentOutcome {
    Recorded { fulfillment: Fulfillment, order_status: OrderStatus },
    AlreadyProcessed,
}

/// Result of pushing a local fulfillment to the storefront.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundReport {
    pub platform_fulfillment_id: Option<String>,
    pub pushed_lines: usize,
    pub skipped: Vec<String>,
}

/// Lines of a local fulfillment keyed by storefront line id, matched against
/// the open fulfillment orders of the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundPlan {
    pub groups: Vec<ShipmentGroup>,
    pub skipped: Vec<String>,
}

/// Match `(external_line_id, quantity)` pairs to open fulfillment order
/// lines. A line is included only when some open line has enough remaining
/// quantity; everything else is reported in `skipped`.
pub fn plan_outbound(lines: &[(String, i32)], open: &[FulfillmentOrder]) -> OutboundPlan {
    let mut remaining: HashMap<&str, i32> = HashMap::new();
    for fo in open {
        for line in &fo.lines {
            remaining.insert(line.id.as_str(), line.remaining_quantity);
        }
    }

    let mut plan = OutboundPlan::default();
    for (line_item_id, quantity) in lines {
        let candidates: Vec<_> = open
            .iter()
            .flat_map(|fo| fo.lines.iter().map(move |l| (fo, l)))
            .filter(|(_, l)| &l.line_item_id == line_item_id)
            .collect();
        if candidates.is_empty() {
            plan.skipped.push(format!("line {line_item_id}: no open fulfillment order line"));
            continue;
        }
        let Some((fo, fo_line)) = candidates
            .into_iter()
            .find(|(_, l)| remaining.get(l.id.as_str()).copied().unwrap_or(0) >= *quantity)
        else {
            plan.skipped
                .push(format!("line {line_item_id}: remaining quantity below {quantity}"));
            continue;
        };
        if let Some(left) = remaining.get_mut(fo_line.id.as_str()) {
            *left -= quantity;
        }

        let shipment_line = ShipmentLine {
            fulfillment_order_line_id: fo_line.id.clone(),
            quantity: *quantity,
        };
        match plan.groups.iter_mut().find(|g| g.fulfillment_order_id == fo.id) {
            Some(group) => group.lines.push(shipment_line),
            None => plan.groups.push(ShipmentGroup {
                fulfillment_order_id: fo.id.clone(),
                lines: vec![shipment_line],
            }),
        }
    }
    plan
}

#[derive(Clone)]
pub struct FulfillmentSync {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PlatformGateway>,
}

impl FulfillmentSync {
    pub fn new(store: Arc<dyn OrderStore>, gateway: Arc<dyn PlatformGateway>) -> Self {
        Self { store, gateway }
    }

    /// Record a shipment against its order, advancing the order to
    /// `fulfilled` once every active item is covered.
    ///
    /// Recording commits first. Pushing the shipment to the storefront and
    /// queueing the customer notification happen afterwards and only ever
    /// leave an activity entry when they fail.
    pub fn record_shipment(
        &self,
        actor: Actor,
        shipment: InboundShipment,
    ) -> Result<ShipmentOutcome, DomainError> {
        if shipment.external_id.trim().is_empty() {
            return Err(DomainError::validation("shipment id is required"));
        }
        let recorded = match self.store.transaction(|tx| record(tx, actor, &shipment)) {
            Ok(recorded) => recorded,
            Err(DomainError::DuplicateEvent(id)) => {
                info!("shipment {id} already recorded");
                None
            }
            Err(e) => return Err(e),
        };
        let Some((order, fulfillment)) = recorded else {
            return Ok(ShipmentOutcome::AlreadyProcessed);
        };

        if shipment.source != FulfillmentSource::Storefront && order.store_id().is_some() {
            if let Err(e) = self.push_to_platform(actor, &order, &fulfillment) {
                let note = format!("storefront fulfillment push failed: {e}");
                self.note_failure(actor, &order, "platform_sync_failed", note);
            }
        }
        if shipment.notify_customer {
            if let Err(e) = self.queue_notification(&order, &fulfillment) {
                let note = format!("customer notification not queued: {e}");
                self.note_failure(actor, &order, "notification_failed", note);
            }
        }

        Ok(ShipmentOutcome::Recorded {
            order_status: order.status,
            fulfillment,
        })
    }

    /// Apply a status or tracking change to a recorded shipment. A fulfilled
    /// order completes once all of its shipments are delivered.
    pub fn update_shipment(
        &self,
        actor: Actor,
        external_id: &str,
        status: FulfillmentStatus,
        tracking: Option<Tracking>,
    ) -> Result<Fulfillment, DomainError> {
        self.store.transaction(|tx| {
            let mut fulfillment = tx
                .find_fulfillment_by_external(external_id)?
                .ok_or_else(|| DomainError::not_found(format!("fulfillment {external_id}")))?;
            let mut order = tx.lock_order(fulfillment.order_id)?;

            let previous = fulfillment.status;
            fulfillment.status = status;
            if let Some(tracking) = tracking {
                fulfillment.tracking = tracking;
            }
            fulfillment.updated_at = Utc::now();
            tx.update_fulfillment(&fulfillment)?;
            let note = format!("shipment {external_id} {status}");
            tx.record_activity(
                &OrderActivity::new(order.id, actor, "fulfillment_updated", note)
                    .with_details(json!({ "from": previous.as_str(), "to": status.as_str() })),
            )?;

            let uncounted = previous.counts_toward_quantity() && !status.counts_toward_quantity();
            if uncounted && order.status == OrderStatus::Fulfilled {
                warn!(
                    "order {} is fulfilled but shipment {external_id} became {status}",
                    order.uid
                );
            }

            if order.may(OrderEvent::Complete) {
                let counting: Vec<_> = tx
                    .fulfillments(order.id)?
                    .into_iter()
                    .filter(|f| f.status.counts_toward_quantity())
                    .collect();
                let delivered = counting.iter().all(|f| f.status == FulfillmentStatus::Delivered);
                if !counting.is_empty() && delivered {
                    transition(tx, &mut order, OrderEvent::Complete, actor)?;
                }
            }
            Ok(fulfillment)
        })
    }

    /// Create the matching fulfillment on the order's storefront.
    pub fn push_to_platform(
        &self,
        actor: Actor,
        order: &Order,
        fulfillment: &Fulfillment,
    ) -> Result<OutboundReport, DomainError> {
        let (Some(store_id), Some(order_external_id)) =
            (order.store_id(), order.external_id.clone())
        else {
            return Ok(OutboundReport::default());
        };
        let store = active_store(self.store.as_ref(), store_id)?;

        let items: HashMap<Uuid, OrderItem> = self
            .store
            .transaction(|tx| tx.order_items(order.id))?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();
        let mut skipped = Vec::new();
        let mut lines = Vec::new();
        for line in &fulfillment.line_items {
            match items.get(&line.order_item_id).and_then(|i| i.external_line_id.clone()) {
                Some(external_line_id) => lines.push((external_line_id, line.quantity)),
                None => skipped.push(format!("item {}: no storefront line", line.order_item_id)),
            }
        }

        let adapter = self.gateway.adapter_for(&store)?;
        let open = guard(
            self.store.as_ref(),
            &store,
            adapter.open_fulfillment_orders(&order_external_id),
        )?;
        let plan = plan_outbound(&lines, &open);
        skipped.extend(plan.skipped);
        for reason in &skipped {
            warn!("order {} shipment {}: {}", order.uid, fulfillment.external_id, reason);
        }

        let pushed_lines = plan.groups.iter().map(|g| g.lines.len()).sum();
        let platform_fulfillment_id = if plan.groups.is_empty() {
            None
        } else {
            let request = PlatformShipment {
                order_external_id,
                tracking: fulfillment.tracking.clone(),
                notify_customer: false,
                groups: plan.groups,
            };
            // The storefront echo of this fulfillment waits on the order lock
            // until the link below is committed.
            let created = self.store.transaction(|tx| {
                tx.lock_order(order.id)?;
                let created = adapter.create_fulfillment(&request);
                if let Ok(id) = &created {
                    tx.link_platform_fulfillment(fulfillment.id, platform_key(id))?;
                }
                Ok(created)
            })?;
            Some(guard(self.store.as_ref(), &store, created)?)
        };

        let report = OutboundReport {
            platform_fulfillment_id,
            pushed_lines,
            skipped,
        };
        self.store.transaction(|tx| {
            tx.record_activity(
                &OrderActivity::new(
                    order.id,
                    actor,
                    "platform_fulfillment",
                    format!("{pushed_lines} lines pushed to {}", store.platform),
                )
                .with_details(json!({
                    "shipment": fulfillment.external_id,
                    "platform_fulfillment_id": report.platform_fulfillment_id,
                    "skipped": report.skipped,
                })),
            )
        })?;
        Ok(report)
    }

    fn queue_notification(
        &self,
        order: &Order,
        fulfillment: &Fulfillment,
    ) -> Result<(), DomainError> {
        let Some(email) = order.email.as_deref() else {
            return Ok(());
        };
        let event = OutboxEvent::customer_shipment_notification(
            &order.uid,
            email,
            json!({
                "order_name": order.name,
                "shipment": fulfillment.external_id,
                "carrier": fulfillment.tracking.carrier,
                "tracking_number": fulfillment.tracking.number,
                "tracking_url": fulfillment.tracking.url,
            }),
        );
        self.store.transaction(|tx| tx.enqueue(&event))
    }

    fn note_failure(&self, actor: Actor, order: &Order, kind: &str, message: String) {
        warn!("order {}: {}", order.uid, message);
        let activity = OrderActivity::new(order.id, actor, kind, message);
        if let Err(e) = self.store.transaction(|tx| tx.record_activity(&activity)) {
            warn!("order {}: could not record {kind} activity: {e}", order.uid);
        }
    }
}

fn record(
    tx: &mut dyn OrderTx,
    actor: Actor,
    shipment: &InboundShipment,
) -> Result<Option<(Order, Fulfillment)>, DomainError> {
    if tx.find_fulfillment_by_external(&shipment.external_id)?.is_some() {
        return Ok(None);
    }
    let mut order = match &shipment.order_ref {
        OrderRef::Uid(uid) => lock_by_uid(tx, uid)?,
        OrderRef::External {
            store_id,
            external_order_id,
        } => {
            let found = tx
                .find_order_by_external(OrderOwner::Store(*store_id), external_order_id)?
                .ok_or_else(|| DomainError::not_found(format!("order {external_order_id}")))?;
            tx.lock_order(found.id)?
        }
    };
    // A concurrent delivery may have won while we waited for the lock.
    if tx.find_fulfillment_by_external(&shipment.external_id)?.is_some() {
        return Ok(None);
    }

    let existing = tx.fulfillments(order.id)?;
    if let Some(platform_id) = shipment.platform_fulfillment_id.as_deref() {
        let key = platform_key(platform_id);
        if let Some(pushed) = existing
            .iter()
            .find(|f| f.platform_fulfillment_id.as_deref() == Some(key))
        {
            info!(
                "order {} shipment {}: storefront copy of {}",
                order.uid, shipment.external_id, pushed.external_id
            );
            return Ok(None);
        }
    }

    let items = active_items(tx, order.id)?;
    let (lines, unmatched) = match_lines(tx, &items, &shipment.lines)?;
    for line in &unmatched {
        warn!("order {} shipment {}: {}", order.uid, shipment.external_id, line);
        tx.record_activity(&OrderActivity::new(
            order.id,
            actor,
            "fulfillment_line_unmatched",
            line.clone(),
        ))?;
    }
    if lines.is_empty() {
        return Err(DomainError::validation(format!(
            "shipment {} matches no active item of order {}",
            shipment.external_id, order.uid
        )));
    }

    Coverage::compute(&items, &existing).check_allocation(&lines)?;

    let mut fulfillment = Fulfillment::new(
        order.id,
        shipment.external_id.clone(),
        shipment.source,
        shipment.status,
        shipment.tracking.clone(),
        &lines,
    );
    if shipment.status == FulfillmentStatus::Pending {
        fulfillment.shipped_at = None;
    }
    tx.insert_fulfillment(&fulfillment)?;
    tx.record_activity(
        &OrderActivity::new(
            order.id,
            actor,
            "fulfillment_recorded",
            format!("shipment {} recorded from {}", shipment.external_id, shipment.source.as_str()),
        )
        .with_details(json!({
            "lines": lines
                .iter()
                .map(|(id, qty)| json!({ "order_item_id": id, "quantity": qty }))
                .collect::<Vec<_>>(),
            "carrier": shipment.tracking.carrier,
            "tracking_number": shipment.tracking.number,
        })),
    )?;

    let mut all = existing;
    all.push(fulfillment.clone());
    let coverage = Coverage::compute(&items, &all);
    if coverage.is_complete() && order.may(OrderEvent::Fulfill) {
        transition(tx, &mut order, OrderEvent::Fulfill, actor)?;
    }
    info!(
        "order {} shipment {}: {}/{} units shipped",
        order.uid,
        shipment.external_id,
        coverage.total_fulfilled(),
        coverage.total_ordered()
    );
    Ok(Some((order, fulfillment)))
}

/// Resolve shipped lines to `(order_item_id, quantity)`.
///
/// Bundle slots of one item arrive as separate lines carrying the item's
/// quantity; they collapse into one line with the largest quantity.
fn match_lines(
    tx: &mut dyn OrderTx,
    items: &[OrderItem],
    shipped: &[ShippedLine],
) -> Result<(Vec<(Uuid, i32)>, Vec<String>), DomainError> {
    let mut matched: Vec<(Uuid, i32)> = Vec::new();
    let mut via_mapping: HashMap<Uuid, i32> = HashMap::new();
    let mut unmatched = Vec::new();

    for line in shipped {
        match &line.line_ref {
            LineRef::ExternalLine(external_line_id) => {
                match items.iter().find(|i| i.external_line_id.as_ref() == Some(external_line_id)) {
                    Some(item) => matched.push((item.id, line.quantity)),
                    None => unmatched.push(format!("no active item for line {external_line_id}")),
                }
            }
            LineRef::Item(item_id) => match items.iter().find(|i| i.id == *item_id) {
                Some(item) => matched.push((item.id, line.quantity)),
                None => unmatched.push(format!("no active item {item_id}")),
            },
            LineRef::VariantMapping(mapping_id) => {
                let item_id = tx
                    .find_mapping(*mapping_id)?
                    .and_then(|m| m.order_item_id)
                    .filter(|id| items.iter().any(|i| i.id == *id));
                match item_id {
                    Some(item_id) => {
                        let entry = via_mapping.entry(item_id).or_default();
                        *entry = (*entry).max(line.quantity);
                    }
                    None => unmatched
                        .push(format!("no active item for variant mapping {mapping_id}")),
                }
            }
        }
    }
    for item in items {
        if let Some(quantity) = via_mapping.remove(&item.id) {
            matched.push((item.id, quantity));
        }
    }
    Ok((matched, unmatched))
}
