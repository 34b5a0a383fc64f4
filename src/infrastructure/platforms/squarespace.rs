//! Squarespace Commerce REST adapter.
//!
//! Squarespace has no fulfillment sub-orders: a pending order is exposed as a
//! single open fulfillment order covering every line, and a fulfillment
//! always closes the whole order.

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
use crate::infrastructure::http::{platform_error, send_empty, send_json, ApiClient};

const USER_AGENT: &str = "pod-order-service";

#[derive(Debug, Default, Deserialize)]
struct Money {
    value: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Address {
    first_name: Option<String>,
    last_name: Option<String>,
    address1: Option<String>,
    address2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country_code: Option<String>,
    postal_code: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItem {
    id: String,
    variant_id: Option<String>,
    sku: Option<String>,
    product_name: Option<String>,
    quantity: i32,
    unit_price_paid: Option<Money>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquarespaceOrder {
    id: String,
    order_number: Option<String>,
    customer_email: Option<String>,
    created_on: Option<DateTime<Utc>>,
    fulfillment_status: Option<String>,
    shipping_address: Option<Address>,
    #[serde(default)]
    line_items: Vec<LineItem>,
    subtotal: Option<Money>,
    shipping_total: Option<Money>,
    discount_total: Option<Money>,
    tax_total: Option<Money>,
    grand_total: Option<Money>,
}

fn amount(money: &Option<Money>) -> Option<&str> {
    money.as_ref()?.value.as_deref()
}

fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let name = [first, last].into_iter().flatten().collect::<Vec<_>>().join(" ");
    (!name.trim().is_empty()).then(|| name.trim().to_string())
}

fn convert(order: SquarespaceOrder, raw: Value) -> Result<RemoteOrder, DomainError> {
    let currency = order
        .grand_total
        .as_ref()
        .and_then(|m| m.currency.clone())
        .unwrap_or_else(|| "USD".to_string());

    let mut line_items = Vec::with_capacity(order.line_items.len());
    let raw_lines = raw.get("lineItems").and_then(Value::as_array);
    for (n, line) in order.line_items.into_iter().enumerate() {
        line_items.push(RemoteLineItem {
            unit_price: opt_minor_units(amount(&line.unit_price_paid), &currency)?,
            external_line_id: line.id,
            title: line.product_name.unwrap_or_default(),
            sku: line.sku,
            quantity: line.quantity,
            tax: 0,
            discount: 0,
            variant_external_id: line.variant_id,
            raw: raw_lines.and_then(|l| l.get(n)).cloned().unwrap_or(Value::Null),
        });
    }

    let shipping_address = order.shipping_address.map(|a| ShippingAddress {
        name: full_name(a.first_name.as_deref(), a.last_name.as_deref()),
        company: None,
        address1: a.address1,
        address2: a.address2,
        city: a.city,
        province_code: a.state,
        zip: a.postal_code,
        country_code: a.country_code,
        phone: a.phone,
    });

    Ok(RemoteOrder {
        name: order.order_number.map(|n| format!("#{n}")).unwrap_or_default(),
        external_id: order.id,
        email: order.customer_email,
        totals: OrderTotals {
            subtotal: opt_minor_units(amount(&order.subtotal), &currency)?,
            shipping: opt_minor_units(amount(&order.shipping_total), &currency)?,
            tax: opt_minor_units(amount(&order.tax_total), &currency)?,
            discount: opt_minor_units(amount(&order.discount_total), &currency)?,
            total: opt_minor_units(amount(&order.grand_total), &currency)?,
        },
        cancelled: order.fulfillment_status.as_deref() == Some("CANCELED"),
        placed_at: order.created_on,
        currency,
        line_items,
        shipping_address,
        raw,
    })
}

pub struct SquarespaceAdapter {
    http: ApiClient,
    access_token: String,
}

impl SquarespaceAdapter {
    pub fn new(http: ApiClient, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    fn order_json(&self, external_order_id: &str) -> Result<Value, DomainError> {
        send_json(
            self.http
                .get(&format!("commerce/orders/{external_order_id}"))
                .bearer_auth(&self.access_token)
                .header(reqwest::header::USER_AGENT, USER_AGENT),
        )
        .map_err(platform_error)
    }
}

impl PlatformAdapter for SquarespaceAdapter {
    fn platform(&self) -> Platform {
        Platform::Squarespace
    }

    fn fetch_order(&self, external_order_id: &str) -> Result<RemoteOrder, DomainError> {
        let raw = self.order_json(external_order_id)?;
        let order: SquarespaceOrder = serde_json::from_value(raw.clone())
            .map_err(|e| {
                DomainError::Internal(format!("squarespace order {external_order_id}: {e}"))
            })?;
        convert(order, raw)
    }

    fn open_fulfillment_orders(
        &self,
        external_order_id: &str,
    ) -> Result<Vec<FulfillmentOrder>, DomainError> {
        let order = self.fetch_order(external_order_id)?;
        Ok(open_fulfillment(&order).into_iter().collect())
    }

    fn create_fulfillment(&self, shipment: &PlatformShipment) -> Result<String, DomainError> {
        let body = json!({
            "shouldSendNotification": shipment.notify_customer,
            "shipments": [{
                "shipDate": Utc::now().to_rfc3339(),
                "carrierName": shipment.tracking.carrier,
                "service": "standard",
                "trackingNumber": shipment.tracking.number,
                "trackingUrl": shipment.tracking.url,
            }],
        });
        send_empty(
            self.http
                .post(&format!("commerce/orders/{}/fulfillments", shipment.order_external_id))
                .bearer_auth(&self.access_token)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .json(&body),
        )
        .map_err(platform_error)?;
        Ok(shipment.order_external_id.clone())
    }
}

fn open_fulfillment(order: &RemoteOrder) -> Option<FulfillmentOrder> {
    let pending = order.raw.get("fulfillmentStatus").and_then(Value::as_str) == Some("PENDING");
    if !pending {
        return None;
    }
    Some(FulfillmentOrder {
        id: order.external_id.clone(),
        lines: order
            .line_items
            .iter()
            .map(|l| FulfillmentOrderLine {
                id: l.external_line_id.clone(),
                line_item_id: l.external_line_id.clone(),
                remaining_quantity: l.quantity,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "id": "585d498fdee9f31a60284a37",
            "orderNumber": "1010",
            "customerEmail": "ada@example.com",
            "createdOn": "2024-03-01T10:00:00.000Z",
            "fulfillmentStatus": "PENDING",
            "shippingAddress": {
                "firstName": "Ada", "lastName": "Lovelace", "address1": "12 St James Sq",
                "city": "London", "state": null, "countryCode": "GB", "postalCode": "SW1Y 4JH"
            },
            "lineItems": [{
                "id": "585d498fdee9f31a60284a39",
                "variantId": "b3bbd0b6-8b3d-4a0b-9c1c-b4d9f6a7b0b1",
                "sku": "SQ-001",
                "productName": "Framed print",
                "quantity": 1,
                "unitPricePaid": { "currency": "GBP", "value": "45.00" }
            }],
            "subtotal": { "currency": "GBP", "value": "45.00" },
            "shippingTotal": { "currency": "GBP", "value": "4.50" },
            "discountTotal": { "currency": "GBP", "value": "0.00" },
            "taxTotal": { "currency": "GBP", "value": "0.00" },
            "grandTotal": { "currency": "GBP", "value": "49.50" }
        })
    }

    #[test]
    fn order_is_converted() {
        let raw = sample();
        let order = convert(serde_json::from_value(raw.clone()).unwrap(), raw).unwrap();
        assert_eq!(order.name, "#1010");
        assert_eq!(order.currency, "GBP");
        assert_eq!(order.totals.total, 4950);
        assert_eq!(order.line_items[0].unit_price, 4500);
        assert_eq!(
            order.shipping_address.as_ref().and_then(|a| a.name.as_deref()),
            Some("Ada Lovelace")
        );
        assert!(!order.cancelled);
    }

    #[test]
    fn pending_order_is_one_open_fulfillment() {
        let raw = sample();
        let order = convert(serde_json::from_value(raw.clone()).unwrap(), raw).unwrap();
        let open = open_fulfillment(&order).unwrap();
        assert_eq!(open.lines.len(), 1);
        assert_eq!(open.lines[0].remaining_quantity, 1);

        let mut shipped = sample();
        shipped["fulfillmentStatus"] = json!("FULFILLED");
        let order = convert(serde_json::from_value(shipped.clone()).unwrap(), shipped).unwrap();
        assert!(open_fulfillment(&order).is_none());
    }
}
