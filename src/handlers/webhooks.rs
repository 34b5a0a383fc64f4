use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use super::AppState;
use crate::application::webhook_gateway::{Delivery, WebhookError};
use crate::domain::webhook::{WebhookEnvelope, WebhookTopic};
use crate::errors::AppError;

pub const SHOPIFY_HMAC_HEADER: &str = "X-Shopify-Hmac-Sha256";
pub const PRODUCTION_HMAC_HEADER: &str = "X-Production-Hmac-Sha256";

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn delivered(delivery: Delivery) -> HttpResponse {
    let body = match delivery {
        Delivery::Processed => json!({ "status": "processed" }),
        Delivery::Duplicate => json!({ "status": "duplicate" }),
        Delivery::Declined(reason) => json!({ "status": "declined", "reason": reason }),
    };
    HttpResponse::Ok().json(body)
}

/// POST /webhooks/shopify
///
/// Verified against the raw body; every accepted delivery is logged and
/// processed at most once per `X-Shopify-Webhook-Id`.
#[utoipa::path(
    post,
    path = "/webhooks/shopify",
    request_body(
        content = String,
        description = "Raw Shopify webhook payload",
        content_type = "application/json"
    ),
    params(
        ("X-Shopify-Hmac-Sha256" = String, Header, description = "Base64 HMAC-SHA256 of the body"),
        ("X-Shopify-Topic" = String, Header, description = "e.g. orders/create"),
        ("X-Shopify-Shop-Domain" = String, Header, description = "Sending shop"),
        ("X-Shopify-Webhook-Id" = String, Header, description = "Delivery id used for dedup"),
    ),
    responses(
        (status = 200, description = "Processed, duplicate or declined"),
        (status = 401, description = "Bad signature or revoked store credentials"),
        (status = 500, description = "Processing failed; the platform should retry"),
    ),
    tag = "webhooks"
)]
pub async fn shopify_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let envelope = WebhookEnvelope {
        topic: WebhookTopic::parse(&header(&req, "X-Shopify-Topic").unwrap_or_default()),
        shop_domain: header(&req, "X-Shopify-Shop-Domain"),
        webhook_id: header(&req, "X-Shopify-Webhook-Id"),
        api_version: header(&req, "X-Shopify-API-Version"),
    };
    let signature = header(&req, SHOPIFY_HMAC_HEADER);

    let delivery = web::block(move || -> Result<Delivery, WebhookError> {
        let services = &state.services;
        services.webhooks.receive(
            &state.storefront_webhook_secret,
            signature.as_deref(),
            &body,
            &envelope,
            || services.router.handle_shopify(&envelope, &body),
        )
    })
    .await??;
    Ok(delivered(delivery))
}

/// POST /webhooks/production
///
/// Shipment events from the production backend.
#[utoipa::path(
    post,
    path = "/webhooks/production",
    request_body(
        content = String,
        description = "Raw shipment event",
        content_type = "application/json"
    ),
    params(
        (
            "X-Production-Hmac-Sha256" = String,
            Header,
            description = "Base64 HMAC-SHA256 of the body"
        ),
        (
            "X-Production-Topic" = String,
            Header,
            description = "shipments/create or shipments/update"
        ),
        ("X-Production-Event-Id" = String, Header, description = "Event id used for dedup"),
    ),
    responses(
        (status = 200, description = "Processed, duplicate or declined"),
        (status = 401, description = "Bad signature"),
        (status = 500, description = "Processing failed; the sender should retry"),
    ),
    tag = "webhooks"
)]
pub async fn production_webhook(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let envelope = WebhookEnvelope {
        topic: WebhookTopic::parse(&header(&req, "X-Production-Topic").unwrap_or_default()),
        shop_domain: None,
        webhook_id: header(&req, "X-Production-Event-Id"),
        api_version: None,
    };
    let signature = header(&req, PRODUCTION_HMAC_HEADER);

    let delivery = web::block(move || -> Result<Delivery, WebhookError> {
        let services = &state.services;
        services.webhooks.receive(
            &state.production_webhook_secret,
            signature.as_deref(),
            &body,
            &envelope,
            || services.router.handle_production(&envelope, &body),
        )
    })
    .await??;
    Ok(delivered(delivery))
}
