//! Shopify Admin GraphQL adapter.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{legacy_id, shopify_gid};
use crate::domain::errors::{DomainError, ExternalApiError};
use crate::domain::money::{opt_minor_units, to_minor_units};
use crate::domain::order::{OrderTotals, ShippingAddress};
use crate::domain::platform::{
    FulfillmentOrder, FulfillmentOrderLine, MerchantRequest, PlatformAdapter, PlatformShipment,
    RegisteredService, RemoteLineItem, RemoteOrder,
};
use crate::domain::store::Platform;
use crate::infrastructure::http::{platform_error, send_json, ApiClient};

const ORDER_QUERY: &str = r#"
query Order($id: ID!) {
  order(id: $id) {
    id
    legacyResourceId
    name
    email
    createdAt
    cancelledAt
    currencyCode
    subtotalPriceSet { shopMoney { amount } }
    totalShippingPriceSet { shopMoney { amount } }
    totalTaxSet { shopMoney { amount } }
    totalDiscountsSet { shopMoney { amount } }
    totalPriceSet { shopMoney { amount } }
    shippingAddress { name company address1 address2 city provinceCode zip countryCodeV2 phone }
    lineItems(first: 250) {
      nodes {
        id
        title
        sku
        quantity
        originalUnitPriceSet { shopMoney { amount } }
        totalDiscountSet { shopMoney { amount } }
        taxLines { priceSet { shopMoney { amount } } }
        variant { legacyResourceId }
      }
    }
  }
}"#;

const FULFILLMENT_ORDERS_QUERY: &str = r#"
query FulfillmentOrders($id: ID!) {
  order(id: $id) {
    fulfillmentOrders(first: 50) {
      nodes {
        id
        status
        lineItems(first: 250) {
          nodes { id remainingQuantity lineItem { id } }
        }
      }
    }
  }
}"#;

const ASSIGNED_QUERY: &str = r#"
query Assigned(
  $status: FulfillmentOrderAssignmentStatus!
  $kind: FulfillmentOrderMerchantRequestKind!
) {
  assignedFulfillmentOrders(first: 50, assignmentStatus: $status) {
    nodes {
      id
      order { legacyResourceId }
      merchantRequests(first: 1, kind: $kind) { nodes { message } }
    }
  }
}"#;

const FULFILLMENT_CREATE: &str = r#"
mutation FulfillmentCreate($fulfillment: FulfillmentInput!) {
  fulfillmentCreate(fulfillment: $fulfillment) {
    fulfillment { id }
    userErrors { field message }
  }
}"#;

const ACCEPT_FULFILLMENT: &str = r#"
mutation Accept($id: ID!, $message: String) {
  fulfillmentOrderAcceptFulfillmentRequest(id: $id, message: $message) {
    fulfillmentOrder { id }
    userErrors { field message }
  }
}"#;

const ACCEPT_CANCELLATION: &str = r#"
mutation AcceptCancellation($id: ID!, $message: String) {
  fulfillmentOrderAcceptCancellationRequest(id: $id, message: $message) {
    fulfillmentOrder { id }
    userErrors { field message }
  }
}"#;

const REJECT_CANCELLATION: &str = r#"
mutation RejectCancellation($id: ID!, $message: String) {
  fulfillmentOrderRejectCancellationRequest(id: $id, message: $message) {
    fulfillmentOrder { id }
    userErrors { field message }
  }
}"#;

const SERVICE_CREATE: &str = r#"
mutation ServiceCreate($name: String!, $callbackUrl: URL) {
  fulfillmentServiceCreate(name: $name, callbackUrl: $callbackUrl, inventoryManagement: false) {
    fulfillmentService { id location { id } }
    userErrors { field message }
  }
}"#;

const SERVICE_DELETE: &str = r#"
mutation ServiceDelete($id: ID!) {
  fulfillmentServiceDelete(id: $id) {
    deletedId
    userErrors { field message }
  }
}"#;

const INVENTORY_ACTIVATE: &str = r#"
mutation Activate($inventoryItemId: ID!, $locationId: ID!) {
  inventoryActivate(inventoryItemId: $inventoryItemId, locationId: $locationId) {
    inventoryLevel { id }
    userErrors { field message }
  }
}"#;

const INVENTORY_DEACTIVATE: &str = r#"
mutation Deactivate($inventoryLevelId: ID!) {
  inventoryDeactivate(inventoryLevelId: $inventoryLevelId) {
    userErrors { field message }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphQlError {
    fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
}

fn check_user_errors(payload: &Value) -> Result<(), DomainError> {
    let errors: Vec<UserError> = payload
        .get("userErrors")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| DomainError::Internal(format!("shopify userErrors: {e}")))?
        .unwrap_or_default();
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; ");
    Err(DomainError::ExternalApi(ExternalApiError::Client { status: 422, message }))
}

pub struct ShopifyAdapter {
    http: ApiClient,
    access_token: String,
}

impl ShopifyAdapter {
    /// `http` must already point at `https://{shop}/admin/api/{version}`.
    pub fn new(http: ApiClient, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, DomainError> {
        let response: GraphQlResponse<T> = send_json(
            self.http
                .post("graphql.json")
                .header("X-Shopify-Access-Token", &self.access_token)
                .json(&json!({ "query": query, "variables": variables })),
        )
        .map_err(platform_error)?;

        if let Some(first) = response.errors.first() {
            let message = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(match first.code() {
                Some("ACCESS_DENIED" | "UNAUTHORIZED") => DomainError::Authentication(message),
                Some("THROTTLED") => {
                    DomainError::ExternalApi(ExternalApiError::Server { status: 429, message })
                }
                _ => DomainError::ExternalApi(ExternalApiError::Client { status: 400, message }),
            });
        }
        response
            .data
            .ok_or_else(|| DomainError::ExternalApi(ExternalApiError::Server {
                status: 200,
                message: "shopify returned no data".into(),
            }))
    }

    /// Run a mutation and return its payload object after checking `userErrors`.
    fn mutate(&self, query: &str, field: &str, variables: Value) -> Result<Value, DomainError> {
        let data: Value = self.graphql(query, variables)?;
        let payload = data
            .get(field)
            .cloned()
            .ok_or_else(|| DomainError::Internal(format!("shopify response lacks {field}")))?;
        check_user_errors(&payload)?;
        Ok(payload)
    }

    fn assigned(&self, status: &str, kind: &str) -> Result<Vec<MerchantRequest>, DomainError> {
        let data: Value = self.graphql(ASSIGNED_QUERY, json!({ "status": status, "kind": kind }))?;
        Ok(parse_assigned(&data))
    }
}

impl PlatformAdapter for ShopifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    fn fetch_order(&self, external_order_id: &str) -> Result<RemoteOrder, DomainError> {
        let variables = json!({ "id": shopify_gid("Order", external_order_id) });
        let data: Value = self.graphql(ORDER_QUERY, variables)?;
        match data.get("order") {
            Some(order) if !order.is_null() => parse_order(order),
            _ => Err(DomainError::not_found(format!("shopify order {external_order_id}"))),
        }
    }

    fn open_fulfillment_orders(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<FulfillmentOrder>, DomainError> {
        let data: Value = self.graphql(
            FULFILLMENT_ORDERS_QUERY,
            json!({ "id": shopify_gid("Order", external_order_id) }),
        )?;
        Ok(parse_fulfillment_orders(&data))
    }

    fn create_fulfillment(&self, shipment: &PlatformShipment) -> Result<String, DomainError> {
        let line_items: Vec<Value> = shipment
            .groups
            .iter()
            .map(|g| {
                json!({
                    "fulfillmentOrderId": g.fulfillment_order_id,
                    "fulfillmentOrderLineItems": g.lines.iter().map(|l| json!({
                        "id": l.fulfillment_order_line_id,
                        "quantity": l.quantity,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        let payload = self.mutate(
            FULFILLMENT_CREATE,
            "fulfillmentCreate",
            json!({
                "fulfillment": {
                    "lineItemsByFulfillmentOrder": line_items,
                    "notifyCustomer": shipment.notify_customer,
                    "trackingInfo": {
                        "company": shipment.tracking.carrier,
                        "number": shipment.tracking.number,
                        "url": shipment.tracking.url,
                    },
                }
            }),
        )?;
        payload
            .pointer("/fulfillment/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DomainError::Internal("fulfillmentCreate returned no id".into()))
    }

    fn pending_fulfillment_requests(&self) -> Result<Vec<MerchantRequest>, DomainError> {
        self.assigned("FULFILLMENT_REQUESTED", "FULFILLMENT_REQUEST")
    }

    fn pending_cancellation_requests(&self) -> Result<Vec<MerchantRequest>, DomainError> {
        self.assigned("CANCELLATION_REQUESTED", "CANCELLATION_REQUEST")
    }

    fn accept_fulfillment_request(
        &self,
        fulfillment_order_id: &str,
        message: &str,
    ) -> Result<(), DomainError> {
        self.mutate(
            ACCEPT_FULFILLMENT,
            "fulfillmentOrderAcceptFulfillmentRequest",
            json!({ "id": fulfillment_order_id, "message": message }),
        )
        .map(|_| ())
    }

    fn accept_cancellation_request(
        &self,
        fulfillment_order_id: &str,
        message: &str,
    ) -> Result<(), DomainError> {
        self.mutate(
            ACCEPT_CANCELLATION,
            "fulfillmentOrderAcceptCancellationRequest",
            json!({ "id": fulfillment_order_id, "message": message }),
        )
        .map(|_| ())
    }

    fn reject_cancellation_request(
        &self,
        fulfillment_order_id: &str,
        message: &str,
    ) -> Result<(), DomainError> {
        self.mutate(
            REJECT_CANCELLATION,
            "fulfillmentOrderRejectCancellationRequest",
            json!({ "id": fulfillment_order_id, "message": message }),
        )
        .map(|_| ())
    }

    fn register_fulfillment_service(
        &self,
        name: &str,
        callback_url: Option<&str>,
    ) -> Result<RegisteredService, DomainError> {
        let payload = self.mutate(
            SERVICE_CREATE,
            "fulfillmentServiceCreate",
            json!({ "name": name, "callbackUrl": callback_url }),
        )?;
        let service_id = payload.pointer("/fulfillmentService/id").and_then(Value::as_str);
        let location_id = payload
            .pointer("/fulfillmentService/location/id")
            .and_then(Value::as_str);
        match (service_id, location_id) {
            (Some(service_id), Some(location_id)) => Ok(RegisteredService {
                service_id: service_id.to_string(),
                location_id: location_id.to_string(),
            }),
            _ => Err(DomainError::Internal("fulfillmentServiceCreate returned no service".into())),
        }
    }

    fn unregister_fulfillment_service(&self, service_id: &str) -> Result<(), DomainError> {
        self.mutate(SERVICE_DELETE, "fulfillmentServiceDelete", json!({ "id": service_id }))
            .map(|_| ())
    }

    fn activate_inventory(
        &self,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<(), DomainError> {
        self.mutate(
            INVENTORY_ACTIVATE,
            "inventoryActivate",
            json!({
                "inventoryItemId": shopify_gid("InventoryItem", inventory_item_id),
                "locationId": shopify_gid("Location", location_id),
            }),
        )
        .map(|_| ())
    }

    fn deactivate_inventory(
        &self,
        inventory_item_id: &str,
        location_id: &str,
    ) -> Result<(), DomainError> {
        let level = inventory_level_gid(inventory_item_id, location_id);
        debug!("deactivating inventory level {level}");
        self.mutate(
            INVENTORY_DEACTIVATE,
            "inventoryDeactivate",
            json!({ "inventoryLevelId": level }),
        )
        .map(|_| ())
    }
}

fn inventory_level_gid(inventory_item_id: &str, location_id: &str) -> String {
    format!(
        "gid://shopify/InventoryLevel/{}?inventory_item_id={}",
        legacy_id(location_id),
        legacy_id(inventory_item_id)
    )
}

fn shop_money<'a>(node: &'a Value, field: &str) -> Option<&'a str> {
    node.get(field)?.pointer("/shopMoney/amount")?.as_str()
}

fn text(node: &Value, field: &str) -> Option<String> {
    node.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_address(node: &Value) -> ShippingAddress {
    ShippingAddress {
        name: text(node, "name"),
        company: text(node, "company"),
        address1: text(node, "address1"),
        address2: text(node, "address2"),
        city: text(node, "city"),
        province_code: text(node, "provinceCode"),
        zip: text(node, "zip"),
        country_code: text(node, "countryCodeV2"),
        phone: text(node, "phone"),
    }
}

fn parse_order(order: &Value) -> Result<RemoteOrder, DomainError> {
    let currency = text(order, "currencyCode").unwrap_or_else(|| "USD".to_string());
    let external_id = text(order, "legacyResourceId")
        .or_else(|| text(order, "id").map(|gid| legacy_id(&gid).to_string()))
        .ok_or_else(|| DomainError::validation("shopify order without id"))?;

    let mut line_items = Vec::new();
    let nodes = order
        .pointer("/lineItems/nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for node in nodes {
        let Some(line_gid) = text(node, "id") else {
            warn!("shopify order {external_id}: line item without id skipped");
            continue;
        };
        let tax = node
            .get("taxLines")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|t| shop_money(t, "priceSet"))
            .map(|amount| to_minor_units(amount, &currency))
            .sum::<Result<i64, _>>()?;
        line_items.push(RemoteLineItem {
            external_line_id: legacy_id(&line_gid).to_string(),
            title: text(node, "title").unwrap_or_default(),
            sku: text(node, "sku"),
            quantity: node
                .get("quantity")
                .and_then(Value::as_i64)
                .and_then(|q| i32::try_from(q).ok())
                .unwrap_or(0),
            unit_price: opt_minor_units(shop_money(node, "originalUnitPriceSet"), &currency)?,
            tax,
            discount: opt_minor_units(shop_money(node, "totalDiscountSet"), &currency)?,
            variant_external_id: node
                .pointer("/variant/legacyResourceId")
                .and_then(Value::as_str)
                .map(str::to_string),
            raw: node.clone(),
        });
    }

    Ok(RemoteOrder {
        external_id,
        name: text(order, "name").unwrap_or_default(),
        email: text(order, "email"),
        totals: OrderTotals {
            subtotal: opt_minor_units(shop_money(order, "subtotalPriceSet"), &currency)?,
            shipping: opt_minor_units(shop_money(order, "totalShippingPriceSet"), &currency)?,
            tax: opt_minor_units(shop_money(order, "totalTaxSet"), &currency)?,
            discount: opt_minor_units(shop_money(order, "totalDiscountsSet"), &currency)?,
            total: opt_minor_units(shop_money(order, "totalPriceSet"), &currency)?,
        },
        cancelled: order.get("cancelledAt").is_some_and(|v| !v.is_null()),
        placed_at: text(order, "createdAt")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|d| d.with_timezone(&Utc)),
        shipping_address: order
            .get("shippingAddress")
            .filter(|v| !v.is_null())
            .map(parse_address),
        currency,
        line_items,
        raw: order.clone(),
    })
}

fn parse_fulfillment_orders(data: &Value) -> Vec<FulfillmentOrder> {
    let nodes = data
        .pointer("/order/fulfillmentOrders/nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    nodes
        .iter()
        .filter(|fo| {
            matches!(
                fo.get("status").and_then(Value::as_str),
                Some("OPEN" | "IN_PROGRESS")
            )
        })
        .filter_map(|fo| {
            let id = text(fo, "id")?;
            let lines = fo
                .pointer("/lineItems/nodes")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter_map(|line| {
                    Some(FulfillmentOrderLine {
                        id: text(line, "id")?,
                        line_item_id: legacy_id(line.pointer("/lineItem/id")?.as_str()?)
                            .to_string(),
                        remaining_quantity: line
                            .get("remainingQuantity")
                            .and_then(Value::as_i64)
                            .and_then(|q| i32::try_from(q).ok())
                            .unwrap_or(0),
                    })
                })
                .collect();
            Some(FulfillmentOrder { id, lines })
        })
        .collect()
}

fn parse_assigned(data: &Value) -> Vec<MerchantRequest> {
    data.pointer("/assignedFulfillmentOrders/nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|node| {
            Some(MerchantRequest {
                fulfillment_order_id: text(node, "id")?,
                order_external_id: node.pointer("/order/legacyResourceId")?.as_str()?.to_string(),
                message: node
                    .pointer("/merchantRequests/nodes/0/message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}
