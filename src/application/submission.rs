use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{info, warn};
use serde_json::json;

use super::mapping_service::resolve_item;
use super::order_service::{active_items, lock_by_uid, transition};
use crate::domain::activity::{Actor, OrderActivity};
use crate::domain::errors::{DomainError, ExternalApiError};
use crate::domain::mapping::{MappingSource, ResolvedItem, VariantMapping};
use crate::domain::order::{Order, OrderEvent};
use crate::domain::ports::{OrderStore, OrderTx};
use crate::domain::production::{DraftOrderBody, DraftOrderItem, DraftOrderRequest, ProductionApi};

/// Why an order did not enter production. The order stays `draft`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionFailure {
    NoEligibleItems,
    Rejected { status: u16, message: String },
    ServerError { status: u16, message: String },
    Timeout,
    Unreachable(String),
}

impl From<ExternalApiError> for SubmissionFailure {
    fn from(e: ExternalApiError) -> Self {
        match e {
            ExternalApiError::Client { status, message } => {
                SubmissionFailure::Rejected { status, message }
            }
            ExternalApiError::Server { status, message } => {
                SubmissionFailure::ServerError { status, message }
            }
            ExternalApiError::Timeout => SubmissionFailure::Timeout,
            ExternalApiError::Transport(msg) => SubmissionFailure::Unreachable(msg),
        }
    }
}

impl SubmissionFailure {
    pub fn message(&self) -> String {
        match self {
            SubmissionFailure::NoEligibleItems => {
                "no active item has a variant mapping".to_string()
            }
            SubmissionFailure::Rejected { status, message } => {
                format!("production rejected order ({status}): {message}")
            }
            SubmissionFailure::ServerError { status, message } => {
                format!("production server error ({status}): {message}")
            }
            SubmissionFailure::Timeout => "production API timed out".to_string(),
            SubmissionFailure::Unreachable(msg) => format!("production API unreachable: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResult {
    Submitted {
        order: Order,
        production_order_id: Option<String>,
        promised_dispatch_date: Option<NaiveDate>,
        submitted_items: usize,
    },
    Failed(SubmissionFailure),
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionResult::Submitted { .. })
    }
}

/// Resolved items paired with the frozen copies they will be produced from.
struct Plan {
    snapshots: Vec<VariantMapping>,
    request: DraftOrderRequest,
    items: usize,
}

fn build_plan(order: &Order, resolved: Vec<ResolvedItem>) -> Plan {
    let mut seen = HashSet::new();
    let mut snapshots = Vec::new();
    let mut entries = Vec::new();

    for item in resolved {
        if !seen.insert(item.order_item_id) {
            continue;
        }
        for mapping in item.mappings {
            let frozen = match item.source {
                MappingSource::Snapshot => mapping,
                MappingSource::CatalogDefault => {
                    let copy = mapping.snapshot_for(item.order_item_id);
                    snapshots.push(copy.clone());
                    copy
                }
            };
            entries.push(DraftOrderItem {
                variant_mapping_id: frozen.id,
                image_id: frozen.image_id.clone(),
                frame_sku_id: frozen.frame.frame_sku_id.clone(),
                cx: frozen.crop.cx,
                cy: frozen.crop.cy,
                cw: frozen.crop.cw,
                ch: frozen.crop.ch,
                width: frozen.frame.width,
                height: frozen.frame.height,
                unit: frozen.frame.unit.clone(),
                quantity: item.quantity,
            });
        }
    }

    Plan {
        snapshots,
        request: DraftOrderRequest {
            draft_order: DraftOrderBody {
                reference: order.uid.clone(),
                draft_order_items: entries,
            },
        },
        items: seen.len(),
    }
}

#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn OrderStore>,
    production: Arc<dyn ProductionApi>,
    calls_production: bool,
}

impl SubmissionService {
    /// With `calls_production` off, `submit` only performs the state
    /// transition and production is started out of band.
    pub fn new(
        store: Arc<dyn OrderStore>,
        production: Arc<dyn ProductionApi>,
        calls_production: bool,
    ) -> Self {
        Self {
            store,
            production,
            calls_production,
        }
    }

    /// `draft → in_production`. The transition commits only when the
    /// production API accepts the order; the order row stays locked for the
    /// duration of the call so concurrent submits serialize.
    pub fn submit(&self, actor: Actor, uid: &str) -> Result<SubmissionResult, DomainError> {
        self.store.transaction(|tx| {
            let mut order = lock_by_uid(tx, uid)?;
            if !order.may(OrderEvent::BeginProduction) {
                return Err(DomainError::StateTransition {
                    action: OrderEvent::BeginProduction.action(),
                    state: order.status.to_string(),
                });
            }

            let resolved = resolve_order(tx, &order)?;
            if resolved.is_empty() {
                return record_failure(tx, &order, actor, SubmissionFailure::NoEligibleItems);
            }
            let plan = build_plan(&order, resolved);

            let ack = if self.calls_production {
                match self.production.create_draft_order(&plan.request) {
                    Ok(ack) => Some(ack),
                    Err(e) => return record_failure(tx, &order, actor, e.into()),
                }
            } else {
                None
            };

            for snapshot in &plan.snapshots {
                tx.insert_mapping(snapshot)?;
            }
            if let Some(ack) = &ack {
                order.production_order_id = Some(ack.production_order_id.clone());
                order.promised_dispatch_date = ack.promised_dispatch_date;
            }
            transition(tx, &mut order, OrderEvent::BeginProduction, actor)?;
            tx.record_activity(
                &OrderActivity::new(order.id, actor, "submitted", "order sent to production")
                    .with_details(json!({
                        "production_order_id": order.production_order_id,
                        "promised_dispatch_date": order.promised_dispatch_date,
                        "items": plan.items,
                    })),
            )?;
            info!(
                "order {} submitted ({} items, production id {:?})",
                order.uid, plan.items, order.production_order_id
            );

            Ok(SubmissionResult::Submitted {
                production_order_id: order.production_order_id.clone(),
                promised_dispatch_date: order.promised_dispatch_date,
                submitted_items: plan.items,
                order,
            })
        })
    }
}

fn resolve_order(tx: &mut dyn OrderTx, order: &Order) -> Result<Vec<ResolvedItem>, DomainError> {
    let mut resolved = Vec::new();
    for item in active_items(tx, order.id)? {
        match resolve_item(tx, &item, order.country_code.as_deref())? {
            Some(r) => resolved.push(r),
            None => warn!("order {} item {} has no variant mapping, skipped", order.uid, item.id),
        }
    }
    Ok(resolved)
}

fn record_failure(
    tx: &mut dyn OrderTx,
    order: &Order,
    actor: Actor,
    failure: SubmissionFailure,
) -> Result<SubmissionResult, DomainError> {
    warn!("order {} submission failed: {}", order.uid, failure.message());
    tx.record_activity(&OrderActivity::new(
        order.id,
        actor,
        "submission_failed",
        failure.message(),
    ))?;
    Ok(SubmissionResult::Failed(failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Fixture;
    use crate::domain::order::OrderStatus;
    use crate::domain::production::ProductionAck;

    #[test]
    fn successful_submission_moves_to_production_and_freezes_mappings() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1, 2]);
        fx.map_all_items(&order);
        fx.production.respond(Ok(ProductionAck {
            production_order_id: "P-77".into(),
            promised_dispatch_date: NaiveDate::from_ymd_opt(2026, 11, 2),
        }));

        let result = fx.services.submissions.submit(Actor::System, &order.uid).unwrap();
        let SubmissionResult::Submitted { order: submitted, submitted_items, .. } = result else {
            panic!("expected success, got {result:?}");
        };
        assert_eq!(submitted.status, OrderStatus::InProduction);
        assert_eq!(submitted.production_order_id.as_deref(), Some("P-77"));
        assert_eq!(submitted_items, 2);

        let request = fx.production.last_request().unwrap();
        assert_eq!(request.draft_order.draft_order_items.len(), 2);
        assert_eq!(request.draft_order.reference, order.uid);

        fx.memory.read(|s| {
            let frozen: Vec<_> = s.mappings.values().filter(|m| m.is_frozen()).collect();
            assert_eq!(frozen.len(), 2);
            assert!(request
                .draft_order
                .draft_order_items
                .iter()
                .all(|e| frozen.iter().any(|m| m.id == e.variant_mapping_id)));
        });
    }

    #[test]
    fn client_error_keeps_order_draft() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);
        fx.production.respond(Err(ExternalApiError::from_status(422, "crop outside image")));

        let result = fx.services.submissions.submit(Actor::System, &order.uid).unwrap();
        assert_eq!(
            result,
            SubmissionResult::Failed(SubmissionFailure::Rejected {
                status: 422,
                message: "crop outside image".into()
            })
        );
        fx.memory.read(|s| {
            assert_eq!(s.orders[&order.id].status, OrderStatus::Draft);
            assert!(s.mappings.values().all(|m| !m.is_frozen()));
            assert!(s.activities_for(order.id).iter().any(|a| a.kind == "submission_failed"));
            assert!(s.outbox.is_empty());
        });
    }

    #[test]
    fn server_error_and_timeout_are_reported_distinctly() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);

        fx.production.respond(Err(ExternalApiError::from_status(503, "maintenance")));
        let result = fx.services.submissions.submit(Actor::System, &order.uid).unwrap();
        assert!(matches!(
            result,
            SubmissionResult::Failed(SubmissionFailure::ServerError { status: 503, .. })
        ));

        fx.production.respond(Err(ExternalApiError::Timeout));
        let result = fx.services.submissions.submit(Actor::System, &order.uid).unwrap();
        assert_eq!(result, SubmissionResult::Failed(SubmissionFailure::Timeout));
        assert_eq!(fx.production.calls(), 2);
    }

    #[test]
    fn unmapped_order_is_not_sent() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);

        let result = fx.services.submissions.submit(Actor::System, &order.uid).unwrap();
        assert_eq!(result, SubmissionResult::Failed(SubmissionFailure::NoEligibleItems));
        assert_eq!(fx.production.calls(), 0);
    }

    #[test]
    fn submit_only_from_draft() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);
        fx.services.orders.cancel(Actor::System, &order.uid).unwrap();

        let err = fx.services.submissions.submit(Actor::System, &order.uid).unwrap_err();
        assert!(matches!(err, DomainError::StateTransition { action: "submit", .. }));
        assert_eq!(fx.production.calls(), 0);
    }

    #[test]
    fn resubmission_after_reopen_reuses_snapshots() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);

        assert!(fx.services.submissions.submit(Actor::System, &order.uid).unwrap().is_success());
        let first = fx.production.last_request().unwrap();
        fx.services.orders.cancel(Actor::System, &order.uid).unwrap();
        fx.services.orders.reopen(Actor::System, &order.uid).unwrap();

        // Catalog edits after the first submission must not leak into the order.
        fx.memory.seed(|s| {
            for m in s.mappings.values_mut().filter(|m| m.is_default) {
                m.frame.frame_sku_id = "FR-CHANGED".into();
            }
        });
        assert!(fx.services.submissions.submit(Actor::System, &order.uid).unwrap().is_success());
        let second = fx.production.last_request().unwrap();

        assert_eq!(first.draft_order.draft_order_items, second.draft_order.draft_order_items);
        fx.memory.read(|s| assert_eq!(s.mappings.values().filter(|m| m.is_frozen()).count(), 1));
    }

    #[test]
    fn start_only_mode_skips_production_call() {
        let fx = Fixture::with_production_calls(false);
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);

        let result = fx.services.submissions.submit(Actor::System, &order.uid).unwrap();
        assert!(result.is_success());
        assert_eq!(fx.production.calls(), 0);
    }
}
