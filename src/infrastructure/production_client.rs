use chrono::NaiveDate;
use log::{info, warn};
use serde::Deserialize;

use super::http::{send_json, ApiClient};
use crate::domain::errors::ExternalApiError;
use crate::domain::production::{DraftOrderRequest, ProductionAck, ProductionApi};

#[derive(Debug, Deserialize)]
struct DraftOrderResponse {
    #[serde(alias = "draft_order")]
    order: Option<DraftOrderPayload>,
    #[serde(flatten)]
    top: DraftOrderPayload,
}

#[derive(Debug, Default, Deserialize)]
struct DraftOrderPayload {
    #[serde(alias = "id", alias = "order_id")]
    production_order_id: Option<serde_json::Value>,
    #[serde(alias = "dispatch_date")]
    promised_dispatch_date: Option<String>,
}

/// HTTP client of the print production API.
pub struct HttpProductionClient {
    http: ApiClient,
    api_key: String,
}

impl HttpProductionClient {
    pub fn new(http: ApiClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }
}

impl ProductionApi for HttpProductionClient {
    fn create_draft_order(
        &self,
        request: &DraftOrderRequest,
    ) -> Result<ProductionAck, ExternalApiError> {
        let reference = &request.draft_order.reference;
        let response: DraftOrderResponse = send_json(
            self.http
                .post("draft_orders")
                .bearer_auth(&self.api_key)
                .json(request),
        )
        .inspect_err(|e| warn!("production draft order for {reference} failed: {e}"))?;

        let ack = parse_ack(response)?;
        info!(
            "production accepted {reference} as {} (dispatch {:?})",
            ack.production_order_id, ack.promised_dispatch_date
        );
        Ok(ack)
    }
}

fn parse_ack(response: DraftOrderResponse) -> Result<ProductionAck, ExternalApiError> {
    let payload = match response.order {
        Some(nested) if nested.production_order_id.is_some() => nested,
        _ => response.top,
    };
    let production_order_id = match payload.production_order_id {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => {
            return Err(ExternalApiError::Server {
                status: 200,
                message: "production response has no order id".into(),
            })
        }
    };
    // An unparseable date is not worth failing an accepted order over.
    let promised_dispatch_date = payload.promised_dispatch_date.as_deref().and_then(|raw| {
        let date = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .inspect_err(|e| warn!("ignoring dispatch date '{raw}': {e}"))
            .ok()
    });
    Ok(ProductionAck {
        production_order_id,
        promised_dispatch_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<ProductionAck, ExternalApiError> {
        parse_ack(serde_json::from_str(body).unwrap())
    }

    #[test]
    fn flat_response_with_string_id() {
        let ack = parse(r#"{"production_order_id":"PRD-77","promised_dispatch_date":"2024-05-02"}"#)
            .unwrap();
        assert_eq!(ack.production_order_id, "PRD-77");
        assert_eq!(ack.promised_dispatch_date, NaiveDate::from_ymd_opt(2024, 5, 2));
    }

    #[test]
    fn nested_draft_order_with_numeric_id_and_timestamp() {
        let ack =
            parse(r#"{"draft_order":{"id":981,"dispatch_date":"2024-05-02T12:00:00Z"}}"#).unwrap();
        assert_eq!(ack.production_order_id, "981");
        assert_eq!(ack.promised_dispatch_date, NaiveDate::from_ymd_opt(2024, 5, 2));
    }

    #[test]
    fn bad_date_is_dropped_missing_id_is_an_error() {
        let ack = parse(r#"{"id":"A1","promised_dispatch_date":"soon"}"#).unwrap();
        assert_eq!(ack.promised_dispatch_date, None);
        assert!(parse(r#"{"status":"ok"}"#).is_err());
    }
}
