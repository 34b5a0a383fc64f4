//! Wix eCommerce REST adapter.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::errors::DomainError;
use crate::domain::money::opt_minor_units;
use crate::domain::order::{OrderTotals, ShippingAddress};
use crate::domain::platform::{
    FulfillmentOrder, FulfillmentOrderLine, PlatformAdapter, PlatformShipment, RemoteLineItem,
    RemoteOrder,
};
use crate::domain::store::Platform;
use crate::infrastructure::http::{platform_error, send_json, ApiClient};

#[derive(Debug, Default, Deserialize)]
struct Price {
    amount: Option<String>,
}

fn amount(price: &Option<Price>) -> Option<&str> {
    price.as_ref()?.amount.as_deref()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceSummary {
    subtotal: Option<Price>,
    shipping: Option<Price>,
    tax: Option<Price>,
    discount: Option<Price>,
    total: Option<Price>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItem {
    id: String,
    product_name: Option<Value>,
    physical_properties: Option<Value>,
    quantity: i32,
    price: Option<Price>,
    tax_details: Option<Value>,
    total_discount: Option<Price>,
    catalog_reference: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixOrder {
    id: String,
    number: Option<Value>,
    buyer_info: Option<Value>,
    currency: Option<String>,
    created_date: Option<DateTime<Utc>>,
    status: Option<String>,
    price_summary: Option<PriceSummary>,
    #[serde(default)]
    line_items: Vec<LineItem>,
    shipping_info: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: Value,
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn convert(order: WixOrder, raw: Value) -> Result<RemoteOrder, DomainError> {
    let currency = order.currency.clone().unwrap_or_else(|| "USD".to_string());
    let summary = order.price_summary.unwrap_or_default();
    let raw_lines = raw.get("lineItems").and_then(Value::as_array);

    let mut line_items = Vec::with_capacity(order.line_items.len());
    for (n, line) in order.line_items.into_iter().enumerate() {
        let tax = line
            .tax_details
            .as_ref()
            .and_then(|t| t.pointer("/totalTax/amount"))
            .and_then(Value::as_str);
        let catalog = line.catalog_reference.unwrap_or(Value::Null);
        line_items.push(RemoteLineItem {
            title: line
                .product_name
                .as_ref()
                .and_then(|p| str_at(p, "/original"))
                .unwrap_or_default(),
            sku: line.physical_properties.as_ref().and_then(|p| str_at(p, "/sku")),
            quantity: line.quantity,
            unit_price: opt_minor_units(amount(&line.price), &currency)?,
            tax: opt_minor_units(tax, &currency)?,
            discount: opt_minor_units(amount(&line.total_discount), &currency)?,
            variant_external_id: str_at(&catalog, "/options/variantId")
                .or_else(|| str_at(&catalog, "/catalogItemId")),
            external_line_id: line.id,
            raw: raw_lines.and_then(|l| l.get(n)).cloned().unwrap_or(Value::Null),
        });
    }

    let shipping = order.shipping_info.unwrap_or(Value::Null);
    let destination = shipping
        .pointer("/logistics/shippingDestination")
        .cloned()
        .unwrap_or(Value::Null);
    let shipping_address = destination.get("address").map(|address| {
        let first = str_at(&destination, "/contactDetails/firstName");
        let last = str_at(&destination, "/contactDetails/lastName");
        let name = [first, last].into_iter().flatten().collect::<Vec<_>>().join(" ");
        ShippingAddress {
            name: (!name.is_empty()).then_some(name),
            company: str_at(&destination, "/contactDetails/company"),
            address1: str_at(address, "/addressLine").or_else(|| str_at(address, "/addressLine1")),
            address2: str_at(address, "/addressLine2"),
            city: str_at(address, "/city"),
            province_code: str_at(address, "/subdivision")
                .map(|s| s.rsplit('-').next().unwrap_or(&s).to_string()),
            zip: str_at(address, "/postalCode"),
            country_code: str_at(address, "/country"),
            phone: str_at(&destination, "/contactDetails/phone"),
        }
    });

    let name = match order.number {
        Some(Value::String(n)) => format!("#{n}"),
        Some(Value::Number(n)) => format!("#{n}"),
        _ => String::new(),
    };

    Ok(RemoteOrder {
        external_id: order.id,
        name,
        email: order.buyer_info.as_ref().and_then(|b| str_at(b, "/email")),
        totals: OrderTotals {
            subtotal: opt_minor_units(amount(&summary.subtotal), &currency)?,
            shipping: opt_minor_units(amount(&summary.shipping), &currency)?,
            tax: opt_minor_units(amount(&summary.tax), &currency)?,
            discount: opt_minor_units(amount(&summary.discount), &currency)?,
            total: opt_minor_units(amount(&summary.total), &currency)?,
        },
        cancelled: order.status.as_deref() == Some("CANCELED"),
        placed_at: order.created_date,
        currency,
        line_items,
        shipping_address,
        raw,
    })
}

/// Remaining quantity per line: ordered minus what earlier fulfillments shipped.
fn remaining_lines(order: &RemoteOrder, fulfillments: &Value) -> Vec<FulfillmentOrderLine> {
    let mut shipped: HashMap<String, i32> = HashMap::new();
    let entries = fulfillments
        .pointer("/orderWithFulfillments/fulfillments")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for fulfillment in entries {
        let lines = fulfillment
            .get("lineItems")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for line in lines {
            let quantity = line.get("quantity").and_then(Value::as_i64);
            if let (Some(id), Some(qty)) = (str_at(line, "/id"), quantity) {
                *shipped.entry(id).or_default() += i32::try_from(qty).unwrap_or(0);
            }
        }
    }
    order
        .line_items
        .iter()
        .map(|l| FulfillmentOrderLine {
            id: l.external_line_id.clone(),
            line_item_id: l.external_line_id.clone(),
            remaining_quantity: l.quantity - shipped.get(&l.external_line_id).copied().unwrap_or(0),
        })
        .filter(|l| l.remaining_quantity > 0)
        .collect()
}

pub struct WixAdapter {
    http: ApiClient,
    access_token: String,
}

impl WixAdapter {
    pub fn new(http: ApiClient, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    fn authorized(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, &self.access_token)
    }
}

impl PlatformAdapter for WixAdapter {
    fn platform(&self) -> Platform {
        Platform::Wix
    }

    fn fetch_order(&self, external_order_id: &str) -> Result<RemoteOrder, DomainError> {
        let path = format!("ecom/v1/orders/{external_order_id}");
        let envelope: OrderEnvelope =
            send_json(self.authorized(self.http.get(&path))).map_err(platform_error)?;
        let order: WixOrder = serde_json::from_value(envelope.order.clone())
            .map_err(|e| DomainError::Internal(format!("wix order {external_order_id}: {e}")))?;
        convert(order, envelope.order)
    }

    fn open_fulfillment_orders(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<FulfillmentOrder>, DomainError> {
        let order = self.fetch_order(external_order_id)?;
        if order.cancelled {
            return Ok(Vec::new());
        }
        let path = format!("ecom/v1/fulfillments/orders/{external_order_id}");
        let fulfillments: Value =
            send_json(self.authorized(self.http.get(&path))).map_err(platform_error)?;
        let lines = remaining_lines(&order, &fulfillments);
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![FulfillmentOrder {
            id: order.external_id,
            lines,
        }])
    }

    fn create_fulfillment(&self, shipment: &PlatformShipment) -> Result<String, DomainError> {
        let line_items: Vec<Value> = shipment
            .groups
            .iter()
            .flat_map(|g| &g.lines)
            .map(|l| json!({ "id": l.fulfillment_order_line_id, "quantity": l.quantity }))
            .collect();
        let body = json!({
            "fulfillment": {
                "lineItems": line_items,
                "trackingInfo": {
                    "trackingNumber": shipment.tracking.number,
                    "shippingProvider": shipment.tracking.carrier,
                    "trackingLink": shipment.tracking.url,
                }
            }
        });
        let response: Value = send_json(
            self.authorized(
                self.http
                    .post(&format!(
                        "ecom/v1/fulfillments/orders/{}/create-fulfillment",
                        shipment.order_external_id
                    ))
                    .json(&body),
            ),
        )
        .map_err(platform_error)?;
        response
            .pointer("/orderWithFulfillments/fulfillments")
            .and_then(Value::as_array)
            .and_then(|f| f.last())
            .and_then(|f| str_at(f, "/id"))
            .ok_or_else(|| DomainError::Internal("wix create-fulfillment returned no id".into()))
    }
}
