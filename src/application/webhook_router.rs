//! Turns verified webhook payloads into service calls.

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::fulfillment_requests::FulfillmentRequestHandler;
use super::fulfillment_sync::{FulfillmentSync, InboundShipment, LineRef, OrderRef, ShippedLine};
use super::import_service::ImportService;
use super::store_service::StoreService;
use crate::domain::activity::Actor;
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::{FulfillmentSource, FulfillmentStatus, Tracking};
use crate::domain::order::OrderOwner;
use crate::domain::store::Platform;
use crate::domain::webhook::{WebhookEnvelope, WebhookTopic};

/// Numeric or string ids; storefronts use both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ExternalId {
    Number(u64),
    Text(String),
}

impl ExternalId {
    fn into_string(self) -> String {
        match self {
            ExternalId::Number(n) => n.to_string(),
            ExternalId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderPayload {
    id: ExternalId,
}

#[derive(Debug, Deserialize)]
struct FulfillmentLinePayload {
    id: ExternalId,
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct FulfillmentPayload {
    id: ExternalId,
    order_id: Option<ExternalId>,
    status: Option<String>,
    shipment_status: Option<String>,
    tracking_company: Option<String>,
    tracking_number: Option<String>,
    tracking_url: Option<String>,
    #[serde(default)]
    notify_customer: bool,
    #[serde(default)]
    line_items: Vec<FulfillmentLinePayload>,
}

#[derive(Debug, Deserialize)]
struct CustomerRedactPayload {
    #[serde(default)]
    orders_to_redact: Vec<ExternalId>,
}

#[derive(Debug, Deserialize)]
struct FulfillmentOrderNotificationPayload {
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ProductionItemPayload {
    variant_mapping_id: Uuid,
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct ProductionShipmentPayload {
    id: String,
    order_reference: String,
    status: String,
    carrier: Option<String>,
    tracking_number: Option<String>,
    tracking_url: Option<String>,
    #[serde(default = "notify_by_default")]
    notify_customer: bool,
    #[serde(default)]
    items: Vec<ProductionItemPayload>,
}

fn notify_by_default() -> bool {
    true
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, DomainError> {
    serde_json::from_slice(body)
        .map_err(|e| DomainError::validation(format!("malformed webhook payload: {e}")))
}

/// Shopify fulfillment vocabulary to local status.
pub fn shopify_fulfillment_status(
    status: Option<&str>,
    shipment_status: Option<&str>,
) -> FulfillmentStatus {
    match shipment_status {
        Some("delivered") => return FulfillmentStatus::Delivered,
        Some("in_transit" | "out_for_delivery" | "attempted_delivery") => {
            return FulfillmentStatus::InTransit
        }
        Some("failure") => return FulfillmentStatus::Failed,
        _ => {}
    }
    match status {
        Some("cancelled") => FulfillmentStatus::Cancelled,
        Some("error" | "failure") => FulfillmentStatus::Failed,
        Some("pending" | "open") => FulfillmentStatus::Pending,
        _ => FulfillmentStatus::Shipped,
    }
}

fn production_status(raw: &str) -> Result<FulfillmentStatus, DomainError> {
    match raw {
        "shipped" | "dispatched" => Ok(FulfillmentStatus::Shipped),
        other => other.parse(),
    }
}

#[derive(Clone)]
pub struct WebhookRouter {
    imports: ImportService,
    fulfillments: FulfillmentSync,
    requests: FulfillmentRequestHandler,
    stores: StoreService,
}

impl WebhookRouter {
    pub fn new(
        imports: ImportService,
        fulfillments: FulfillmentSync,
        requests: FulfillmentRequestHandler,
        stores: StoreService,
    ) -> Self {
        Self {
            imports,
            fulfillments,
            requests,
            stores,
        }
    }

    pub fn handle_shopify(
        &self,
        envelope: &WebhookEnvelope,
        body: &[u8],
    ) -> Result<(), DomainError> {
        let domain = envelope
            .shop_domain
            .as_deref()
            .ok_or_else(|| DomainError::validation("missing shop domain"))?;
        let store = self.stores.find_by_domain(Platform::Shopify, domain)?;
        let actor = Actor::System;

        match &envelope.topic {
            WebhookTopic::OrdersCreate | WebhookTopic::OrdersPaid => {
                let payload: OrderPayload = parse(body)?;
                let external_id = payload.id.into_string();
                self.imports
                    .import_or_resync(actor, OrderOwner::Store(store.id), &external_id)?;
            }
            WebhookTopic::FulfillmentsCreate => {
                let payload: FulfillmentPayload = parse(body)?;
                let order_id = payload
                    .order_id
                    .ok_or_else(|| DomainError::validation("fulfillment without order_id"))?
                    .into_string();
                let platform_id = payload.id.into_string();
                let status = shopify_fulfillment_status(
                    payload.status.as_deref(),
                    payload.shipment_status.as_deref(),
                );
                let shipment = InboundShipment {
                    order_ref: OrderRef::External {
                        store_id: store.id,
                        external_order_id: order_id,
                    },
                    external_id: format!("shopify-{platform_id}"),
                    source: FulfillmentSource::Storefront,
                    status,
                    tracking: Tracking {
                        carrier: payload.tracking_company,
                        number: payload.tracking_number,
                        url: payload.tracking_url,
                    },
                    lines: payload
                        .line_items
                        .into_iter()
                        .map(|l| ShippedLine {
                            line_ref: LineRef::ExternalLine(l.id.into_string()),
                            quantity: l.quantity,
                        })
                        .collect(),
                    notify_customer: payload.notify_customer,
                    platform_fulfillment_id: Some(platform_id),
                };
                self.fulfillments.record_shipment(actor, shipment)?;
            }
            WebhookTopic::FulfillmentsUpdate => {
                let payload: FulfillmentPayload = parse(body)?;
                let status = shopify_fulfillment_status(
                    payload.status.as_deref(),
                    payload.shipment_status.as_deref(),
                );
                let tracking = Tracking {
                    carrier: payload.tracking_company,
                    number: payload.tracking_number,
                    url: payload.tracking_url,
                };
                let external_id = format!("shopify-{}", payload.id.into_string());
                self.fulfillments
                    .update_shipment(actor, &external_id, status, Some(tracking))?;
            }
            WebhookTopic::AppUninstalled | WebhookTopic::ShopRedact => {
                self.stores.mark_uninstalled(store.id)?;
            }
            WebhookTopic::CustomersRedact => {
                let payload: CustomerRedactPayload = parse(body)?;
                let ids: Vec<String> = payload
                    .orders_to_redact
                    .into_iter()
                    .map(ExternalId::into_string)
                    .collect();
                self.stores.redact_customer(store.id, &ids)?;
            }
            WebhookTopic::CustomersDataRequest => {
                let payload: Value = parse(body)?;
                info!(
                    "customer data request for {}: {}",
                    store.shop_domain,
                    payload.get("data_request").unwrap_or(&Value::Null)
                );
            }
            WebhookTopic::FulfillmentOrderNotification => {
                let payload: FulfillmentOrderNotificationPayload = parse(body)?;
                match payload.kind.to_ascii_uppercase().as_str() {
                    "FULFILLMENT_REQUEST" => {
                        self.requests.handle_fulfillment_requests(actor, store.id)?;
                    }
                    "CANCELLATION_REQUEST" => {
                        self.requests.handle_cancellation_requests(actor, store.id)?;
                    }
                    other => debug!("ignoring fulfillment order notification kind {other}"),
                }
            }
            WebhookTopic::ProductsCreate | WebhookTopic::ProductsUpdate => {
                let topic = envelope.topic.as_str();
                debug!("{topic} for {} left to catalog sync", store.shop_domain);
            }
            topic => debug!("unhandled shopify topic {}", topic.as_str()),
        }
        Ok(())
    }

    pub fn handle_production(
        &self,
        envelope: &WebhookEnvelope,
        body: &[u8],
    ) -> Result<(), DomainError> {
        let payload: ProductionShipmentPayload = parse(body)?;
        let status = production_status(&payload.status)?;
        let tracking = Tracking {
            carrier: payload.carrier,
            number: payload.tracking_number,
            url: payload.tracking_url,
        };

        match &envelope.topic {
            WebhookTopic::ShipmentCreated => {
                let shipment = InboundShipment {
                    order_ref: OrderRef::Uid(payload.order_reference),
                    external_id: payload.id,
                    source: FulfillmentSource::Production,
                    status,
                    tracking,
                    lines: payload
                        .items
                        .into_iter()
                        .map(|i| ShippedLine {
                            line_ref: LineRef::VariantMapping(i.variant_mapping_id),
                            quantity: i.quantity,
                        })
                        .collect(),
                    notify_customer: payload.notify_customer,
                    platform_fulfillment_id: None,
                };
                self.fulfillments.record_shipment(Actor::System, shipment)?;
            }
            WebhookTopic::ShipmentUpdated => {
                self.fulfillments
                    .update_shipment(Actor::System, &payload.id, status, Some(tracking))?;
            }
            topic => debug!("unhandled production topic {}", topic.as_str()),
        }
        Ok(())
    }
}
