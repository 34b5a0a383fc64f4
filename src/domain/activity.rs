use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

/// Who triggered an operation. Passed explicitly into every service entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    System,
    User(Uuid),
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::System => None,
            Actor::User(id) => Some(*id),
        }
    }
}

/// Append-only audit entry on an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderActivity {
    pub id: Uuid,
    pub order_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl OrderActivity {
    pub fn new(order_id: Uuid, actor: Actor, kind: &str, message: impl Into<String>) -> Self {
        OrderActivity {
            id: Uuid::new_v4(),
            order_id,
            actor_id: actor.user_id(),
            kind: kind.to_string(),
            message: message.into(),
            details: Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Event written to the outbox in the same transaction as the change it describes.
/// An external relay delivers these at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

impl OutboxEvent {
    pub fn new(
        aggregate_type: &str,
        aggregate_id: impl Into<String>,
        event_type: &str,
        payload: Value,
    ) -> Self {
        OutboxEvent {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.to_string(),
            payload,
        }
    }

    pub fn order_status_changed(order_uid: &str, from: &str, to: &str) -> Self {
        OutboxEvent::new(
            "Order",
            order_uid,
            "OrderStatusChanged",
            json!({ "order_uid": order_uid, "from": from, "to": to }),
        )
    }

    /// Picked up by the notification relay, which emails the customer.
    pub fn customer_shipment_notification(order_uid: &str, email: &str, payload: Value) -> Self {
        let mut body = json!({ "order_uid": order_uid, "email": email });
        if let (Value::Object(body), Value::Object(extra)) = (&mut body, payload) {
            body.extend(extra);
        }
        OutboxEvent::new("Order", order_uid, "CustomerShipmentNotification", body)
    }

    pub fn store_reauthentication_required(
        store_id: Uuid,
        owner_user_id: Uuid,
        platform: &str,
        reason: &str,
    ) -> Self {
        OutboxEvent::new(
            "Store",
            store_id.to_string(),
            "StoreReauthenticationRequired",
            json!({
                "store_id": store_id,
                "owner_user_id": owner_user_id,
                "platform": platform,
                "reason": reason,
            }),
        )
    }
}
