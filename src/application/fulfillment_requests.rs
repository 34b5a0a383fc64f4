use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use super::import_service::ImportService;
use super::order_service::transition;
use super::platform_calls::{active_store, guard};
use crate::domain::activity::{Actor, OrderActivity};
use crate::domain::errors::DomainError;
use crate::domain::order::{OrderEvent, OrderOwner, OrderStatus};
use crate::domain::platform::MerchantRequest;
use crate::domain::ports::{OrderStore, PlatformGateway};
use crate::domain::store::Store;

pub const ACCEPT_MESSAGE: &str = "Accepted for production";
pub const ALREADY_IN_PRODUCTION: &str = "Order is already in production and cannot be cancelled";
pub const CANCELLATION_ACCEPTED: &str = "Cancellation accepted";

enum CancellationAnswer {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: Vec<String>,
}

/// Answers merchant-initiated fulfillment and cancellation requests.
/// Every pending request gets an answer; one failure never stops the batch.
#[derive(Clone)]
pub struct FulfillmentRequestHandler {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PlatformGateway>,
    imports: ImportService,
}

impl FulfillmentRequestHandler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PlatformGateway>,
        imports: ImportService,
    ) -> Self {
        Self { store, gateway, imports }
    }

    /// Accept every pending fulfillment request, importing unknown orders first.
    pub fn handle_fulfillment_requests(
        &self,
        actor: Actor,
        store_id: Uuid,
    ) -> Result<RequestSummary, DomainError> {
        let store = active_store(self.store.as_ref(), store_id)?;
        let adapter = self.gateway.adapter_for(&store)?;
        let pending = guard(self.store.as_ref(), &store, adapter.pending_fulfillment_requests())?;

        let mut summary = RequestSummary::default();
        for request in pending {
            if let Err(e) = self.ensure_imported(actor, &store, &request) {
                summary.errors.push(format!("order {}: {e}", request.order_external_id));
                continue;
            }
            let accepted = guard(
                self.store.as_ref(),
                &store,
                adapter.accept_fulfillment_request(&request.fulfillment_order_id, ACCEPT_MESSAGE),
            );
            match accepted {
                Ok(()) => {
                    summary.accepted += 1;
                    let kind = "fulfillment_request_accepted";
                    self.note(actor, &store, &request, kind, ACCEPT_MESSAGE);
                }
                Err(e) => summary
                    .errors
                    .push(format!("fulfillment order {}: {e}", request.fulfillment_order_id)),
            }
        }
        log_summary("fulfillment", &store, &summary);
        Ok(summary)
    }

    /// Reject cancellation of orders already in production; accept the rest
    /// and cancel the local order when its state allows.
    ///
    /// The local order stays locked from the status check until the cancel
    /// commits, platform answer included, so a submission cannot start in
    /// between.
    pub fn handle_cancellation_requests(
        &self,
        actor: Actor,
        store_id: Uuid,
    ) -> Result<RequestSummary, DomainError> {
        let store = active_store(self.store.as_ref(), store_id)?;
        let adapter = self.gateway.adapter_for(&store)?;
        let pending = guard(self.store.as_ref(), &store, adapter.pending_cancellation_requests())?;
        let owner = OrderOwner::Store(store.id);

        let mut summary = RequestSummary::default();
        for request in pending {
            let answered = self.store.transaction(|tx| {
                let local = match tx.find_order_by_external(owner, &request.order_external_id)? {
                    Some(found) => Some(tx.lock_order(found.id)?),
                    None => None,
                };
                let fo_id = &request.fulfillment_order_id;

                if local.as_ref().map(|o| o.status) == Some(OrderStatus::InProduction) {
                    let rejected =
                        adapter.reject_cancellation_request(fo_id, ALREADY_IN_PRODUCTION);
                    if let Err(e) = rejected {
                        return Ok(Err(e));
                    }
                    if let Some(order) = &local {
                        tx.record_activity(&OrderActivity::new(
                            order.id,
                            actor,
                            "cancellation_request_rejected",
                            ALREADY_IN_PRODUCTION,
                        ))?;
                    }
                    return Ok(Ok(CancellationAnswer::Rejected));
                }

                if let Err(e) = adapter.accept_cancellation_request(fo_id, CANCELLATION_ACCEPTED) {
                    return Ok(Err(e));
                }
                if let Some(mut order) = local {
                    tx.record_activity(&OrderActivity::new(
                        order.id,
                        actor,
                        "cancellation_request_accepted",
                        CANCELLATION_ACCEPTED,
                    ))?;
                    if order.may(OrderEvent::Cancel) {
                        transition(tx, &mut order, OrderEvent::Cancel, actor)?;
                    }
                }
                Ok(Ok(CancellationAnswer::Accepted))
            });

            match answered {
                Ok(platform) => match guard(self.store.as_ref(), &store, platform) {
                    Ok(CancellationAnswer::Rejected) => summary.rejected += 1,
                    Ok(CancellationAnswer::Accepted) => summary.accepted += 1,
                    Err(e) => summary
                        .errors
                        .push(format!("fulfillment order {}: {e}", request.fulfillment_order_id)),
                },
                Err(e) => summary.errors.push(format!("order {}: {e}", request.order_external_id)),
            }
        }
        log_summary("cancellation", &store, &summary);
        Ok(summary)
    }

    fn ensure_imported(
        &self,
        actor: Actor,
        store: &Store,
        request: &MerchantRequest,
    ) -> Result<(), DomainError> {
        let owner = OrderOwner::Store(store.id);
        let known = self
            .store
            .transaction(|tx| tx.find_order_by_external(owner, &request.order_external_id))?;
        if known.is_none() {
            info!("importing order {} for fulfillment request", request.order_external_id);
            self.imports.import_or_resync(actor, owner, &request.order_external_id)?;
        }
        Ok(())
    }

    fn note(
        &self,
        actor: Actor,
        store: &Store,
        request: &MerchantRequest,
        kind: &str,
        message: &str,
    ) {
        let result = self.store.transaction(|tx| {
            let owner = OrderOwner::Store(store.id);
            if let Some(order) = tx.find_order_by_external(owner, &request.order_external_id)? {
                tx.record_activity(&OrderActivity::new(order.id, actor, kind, message))?;
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!("could not record {kind} for order {}: {e}", request.order_external_id);
        }
    }
}

fn log_summary(kind: &str, store: &Store, summary: &RequestSummary) {
    if summary.errors.is_empty() {
        info!(
            "{kind} requests for {}: {} accepted, {} rejected",
            store.shop_domain, summary.accepted, summary.rejected
        );
    } else {
        warn!(
            "{kind} requests for {}: {} accepted, {} rejected, errors: {}",
            store.shop_domain,
            summary.accepted,
            summary.rejected,
            summary.errors.join("; ")
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::application::testing::Fixture;

    #[test]
    fn fulfillment_requests_import_missing_orders_then_accept() {
        let fx = Fixture::new();
        fx.platform.put_order(fx.remote_order("2001", &[("L1", 1)]));
        fx.platform.request_fulfillment("fo-1", "2001");

        let summary = fx
            .services
            .requests
            .handle_fulfillment_requests(Actor::System, fx.store.id)
            .unwrap();

        assert_eq!(summary.accepted, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(fx.platform.accepted_fulfillments(), vec!["fo-1".to_string()]);
        fx.memory.read(|s| assert!(s.order_by_external("2001").is_some()));
    }

    #[test]
    fn one_failing_request_does_not_block_the_others() {
        let fx = Fixture::new();
        fx.platform.put_order(fx.remote_order("2001", &[("L1", 1)]));
        fx.platform.request_fulfillment("fo-missing", "no-such-order");
        fx.platform.request_fulfillment("fo-1", "2001");

        let summary = fx
            .services
            .requests
            .handle_fulfillment_requests(Actor::System, fx.store.id)
            .unwrap();

        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn cancellation_rejected_once_in_production() {
        let fx = Fixture::new();
        let order = fx.order_in_production(&[1]);
        fx.platform.request_cancellation("fo-1", order.external_id.as_deref().unwrap());

        let summary = fx
            .services
            .requests
            .handle_cancellation_requests(Actor::System, fx.store.id)
            .unwrap();

        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.accepted, 0);
        assert_eq!(
            fx.platform.rejected_cancellations(),
            vec![("fo-1".to_string(), ALREADY_IN_PRODUCTION.to_string())]
        );
        fx.memory.read(|s| assert_eq!(s.orders[&order.id].status, OrderStatus::InProduction));
    }

    #[test]
    fn cancellation_of_draft_is_accepted_and_cancels() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.platform.request_cancellation("fo-1", order.external_id.as_deref().unwrap());

        let summary = fx
            .services
            .requests
            .handle_cancellation_requests(Actor::System, fx.store.id)
            .unwrap();

        assert_eq!(summary.accepted, 1);
        assert_eq!(fx.platform.accepted_cancellations(), vec!["fo-1".to_string()]);
        fx.memory.read(|s| assert_eq!(s.orders[&order.id].status, OrderStatus::Cancelled));
    }

    #[test]
    fn cancellation_for_unknown_order_is_still_accepted() {
        let fx = Fixture::new();
        fx.platform.request_cancellation("fo-9", "9999");

        let summary = fx
            .services
            .requests
            .handle_cancellation_requests(Actor::System, fx.store.id)
            .unwrap();
        assert_eq!(summary.accepted, 1);
    }

    #[test]
    fn submission_waits_for_an_accepted_cancellation() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);
        fx.platform.request_cancellation("fo-1", order.external_id.as_deref().unwrap());

        let submissions = fx.services.submissions.clone();
        let uid = order.uid.clone();
        let racer = Arc::new(Mutex::new(None));
        let slot = racer.clone();
        fx.platform.before_cancellation_accepted(move || {
            let (done, finished) = mpsc::channel();
            let handle = thread::spawn(move || {
                let result = submissions.submit(Actor::System, &uid);
                let _ = done.send(());
                result
            });
            assert!(
                finished.recv_timeout(Duration::from_millis(200)).is_err(),
                "submission ran while the cancellation held the order"
            );
            *slot.lock().unwrap() = Some(handle);
        });

        let summary = fx
            .services
            .requests
            .handle_cancellation_requests(Actor::System, fx.store.id)
            .unwrap();
        assert_eq!(summary.accepted, 1);

        let handle = racer.lock().unwrap().take().expect("hook ran");
        let submitted = handle.join().unwrap();
        assert!(matches!(submitted, Err(DomainError::StateTransition { .. })));
        assert_eq!(fx.production.calls(), 0);
        fx.memory.read(|s| assert_eq!(s.orders[&order.id].status, OrderStatus::Cancelled));
    }
}
