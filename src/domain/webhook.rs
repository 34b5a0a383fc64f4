use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookTopic {
    OrdersCreate,
    OrdersPaid,
    FulfillmentsCreate,
    FulfillmentsUpdate,
    ProductsCreate,
    ProductsUpdate,
    AppUninstalled,
    CustomersDataRequest,
    CustomersRedact,
    ShopRedact,
    FulfillmentOrderNotification,
    ShipmentCreated,
    ShipmentUpdated,
    Other(String),
}

impl WebhookTopic {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "orders/create" => WebhookTopic::OrdersCreate,
            "orders/paid" => WebhookTopic::OrdersPaid,
            "fulfillments/create" => WebhookTopic::FulfillmentsCreate,
            "fulfillments/update" => WebhookTopic::FulfillmentsUpdate,
            "products/create" => WebhookTopic::ProductsCreate,
            "products/update" => WebhookTopic::ProductsUpdate,
            "app/uninstalled" => WebhookTopic::AppUninstalled,
            "customers/data_request" => WebhookTopic::CustomersDataRequest,
            "customers/redact" => WebhookTopic::CustomersRedact,
            "shop/redact" => WebhookTopic::ShopRedact,
            "fulfillment_orders/notification" => WebhookTopic::FulfillmentOrderNotification,
            "shipments/create" => WebhookTopic::ShipmentCreated,
            "shipments/update" => WebhookTopic::ShipmentUpdated,
            other => WebhookTopic::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookTopic::OrdersCreate => "orders/create",
            WebhookTopic::OrdersPaid => "orders/paid",
            WebhookTopic::FulfillmentsCreate => "fulfillments/create",
            WebhookTopic::FulfillmentsUpdate => "fulfillments/update",
            WebhookTopic::ProductsCreate => "products/create",
            WebhookTopic::ProductsUpdate => "products/update",
            WebhookTopic::AppUninstalled => "app/uninstalled",
            WebhookTopic::CustomersDataRequest => "customers/data_request",
            WebhookTopic::CustomersRedact => "customers/redact",
            WebhookTopic::ShopRedact => "shop/redact",
            WebhookTopic::FulfillmentOrderNotification => "fulfillment_orders/notification",
            WebhookTopic::ShipmentCreated => "shipments/create",
            WebhookTopic::ShipmentUpdated => "shipments/update",
            WebhookTopic::Other(raw) => raw,
        }
    }
}

/// Platform headers describing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEnvelope {
    pub topic: WebhookTopic,
    pub shop_domain: Option<String>,
    pub webhook_id: Option<String>,
    pub api_version: Option<String>,
}

/// One row per delivered event; `status_code` is 0 while the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookLog {
    pub id: Uuid,
    pub webhook_id: Option<String>,
    pub topic: String,
    pub shop_domain: Option<String>,
    pub api_version: Option<String>,
    pub status_code: i32,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookLog {
    pub const IN_FLIGHT: i32 = 0;

    pub fn start(envelope: &WebhookEnvelope) -> Self {
        let now = Utc::now();
        WebhookLog {
            id: Uuid::new_v4(),
            webhook_id: envelope.webhook_id.clone(),
            topic: envelope.topic.as_str().to_string(),
            shop_domain: envelope.shop_domain.clone(),
            api_version: envelope.api_version.clone(),
            status_code: Self::IN_FLIGHT,
            duration_ms: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A previous run finished with an error status; a redelivery may retry it.
    pub fn is_reclaimable(&self) -> bool {
        self.status_code >= 400
    }
}

/// Result of trying to take ownership of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Started(Uuid),
    Duplicate,
}
