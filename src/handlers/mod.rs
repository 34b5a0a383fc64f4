pub mod mappings;
pub mod orders;
pub mod stores;
pub mod webhooks;

use actix_web::{web, HttpRequest};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::application::Services;
use crate::domain::activity::Actor;
use crate::domain::errors::DomainError;
use crate::errors::AppError;

/// Set by the authentication layer in front of this service.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Shared by every worker.
pub struct AppState {
    pub services: Services,
    pub storefront_webhook_secret: String,
    pub production_webhook_secret: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        orders::create_manual_order,
        orders::import_order,
        orders::get_order,
        orders::submit_order,
        orders::cancel_order,
        orders::reopen_order,
        orders::complete_order,
        webhooks::shopify_webhook,
        webhooks::production_webhook,
        mappings::upsert_default_mapping,
        mappings::set_bundle_slots,
        stores::enable_fulfillment_service,
        stores::disable_fulfillment_service,
        stores::activate_inventory,
        stores::deactivate_inventory,
    ),
    components(schemas(
        orders::AddressDto,
        orders::ManualItemRequest,
        orders::CreateManualOrderRequest,
        orders::ImportOrderRequest,
        orders::TotalsResponse,
        orders::ItemResponse,
        orders::FulfillmentResponse,
        orders::FulfillmentLineResponse,
        orders::OrderResponse,
        orders::SubmitResponse,
        mappings::FrameDto,
        mappings::CropDto,
        mappings::DefaultMappingRequest,
        mappings::MappingResponse,
        mappings::BundleSlotsRequest,
        mappings::BundleResponse,
        stores::StoreResponse,
    )),
    tags(
        (name = "orders", description = "Order lifecycle"),
        (name = "webhooks", description = "Storefront and production webhooks"),
        (name = "mappings", description = "Variant to frame mappings"),
        (name = "stores", description = "Storefront fulfillment service and inventory"),
    )
)]
pub struct ApiDoc;

/// Route table, shared by the server and handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(orders::create_manual_order))
            .route("/import", web::post().to(orders::import_order))
            .route("/{uid}", web::get().to(orders::get_order))
            .route("/{uid}/submit", web::post().to(orders::submit_order))
            .route("/{uid}/cancel", web::post().to(orders::cancel_order))
            .route("/{uid}/reopen", web::post().to(orders::reopen_order))
            .route("/{uid}/complete", web::post().to(orders::complete_order)),
    )
    .service(
        web::scope("/webhooks")
            .route("/shopify", web::post().to(webhooks::shopify_webhook))
            .route("/production", web::post().to(webhooks::production_webhook)),
    )
    .route("/variant_mappings/default", web::put().to(mappings::upsert_default_mapping))
    .route("/bundles/{variant_id}/slots", web::put().to(mappings::set_bundle_slots))
    .service(
        web::scope("/stores/{store_id}")
            .route("/fulfillment_service", web::post().to(stores::enable_fulfillment_service))
            .route("/fulfillment_service", web::delete().to(stores::disable_fulfillment_service))
            .route("/inventory/{variant_id}", web::post().to(stores::activate_inventory))
            .route("/inventory/{variant_id}", web::delete().to(stores::deactivate_inventory)),
    );
}

/// Acting user from the request; no header means the system itself.
pub fn actor(req: &HttpRequest) -> Result<Actor, AppError> {
    let Some(raw) = req.headers().get(ACTOR_HEADER) else {
        return Ok(Actor::System);
    };
    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(Actor::User)
        .ok_or_else(|| AppError::BadRequest(format!("{ACTOR_HEADER} must be a UUID")))
}

/// Run blocking service code off the actix workers.
pub async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    Ok(web::block(f).await??)
}
