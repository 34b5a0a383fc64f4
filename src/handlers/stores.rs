use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{blocking, AppState};
use crate::domain::store::Store;
use crate::errors::AppError;

/// Storefront connection without its credentials.
#[derive(Debug, Serialize, ToSchema)]
pub struct StoreResponse {
    pub id: Uuid,
    pub platform: String,
    pub shop_domain: String,
    pub needs_reauth: bool,
    pub fulfillment_service_id: Option<String>,
    pub fulfillment_location_id: Option<String>,
}

impl From<Store> for StoreResponse {
    fn from(s: Store) -> Self {
        StoreResponse {
            id: s.id,
            platform: s.platform.as_str().to_string(),
            shop_domain: s.shop_domain,
            needs_reauth: s.needs_reauth,
            fulfillment_service_id: s.fulfillment_service_id,
            fulfillment_location_id: s.fulfillment_location_id,
        }
    }
}

/// POST /stores/{store_id}/fulfillment_service
#[utoipa::path(
    post,
    path = "/stores/{store_id}/fulfillment_service",
    params(("store_id" = Uuid, Path, description = "Store id")),
    responses(
        (status = 200, description = "Fulfillment service registered", body = StoreResponse),
        (status = 401, description = "Store credentials rejected"),
        (status = 404, description = "Unknown store"),
    ),
    tag = "stores"
)]
pub async fn enable_fulfillment_service(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let store_id = path.into_inner();
    let store = blocking(move || state.services.stores.enable_fulfillment_service(store_id)).await?;
    Ok(HttpResponse::Ok().json(StoreResponse::from(store)))
}

/// DELETE /stores/{store_id}/fulfillment_service
#[utoipa::path(
    delete,
    path = "/stores/{store_id}/fulfillment_service",
    params(("store_id" = Uuid, Path, description = "Store id")),
    responses(
        (status = 200, description = "Fulfillment service removed", body = StoreResponse),
        (status = 404, description = "Unknown store"),
    ),
    tag = "stores"
)]
pub async fn disable_fulfillment_service(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let store_id = path.into_inner();
    let store =
        blocking(move || state.services.stores.disable_fulfillment_service(store_id)).await?;
    Ok(HttpResponse::Ok().json(StoreResponse::from(store)))
}

/// POST /stores/{store_id}/inventory/{variant_id}
///
/// Stocks the variant at the fulfillment service location.
#[utoipa::path(
    post,
    path = "/stores/{store_id}/inventory/{variant_id}",
    params(
        ("store_id" = Uuid, Path, description = "Store id"),
        ("variant_id" = Uuid, Path, description = "Product variant id"),
    ),
    responses(
        (status = 204, description = "Inventory activated"),
        (status = 400, description = "Fulfillment service not enabled"),
        (status = 404, description = "Unknown store or variant"),
    ),
    tag = "stores"
)]
pub async fn activate_inventory(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (store_id, variant_id) = path.into_inner();
    blocking(move || state.services.stores.activate_inventory(store_id, variant_id)).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /stores/{store_id}/inventory/{variant_id}
#[utoipa::path(
    delete,
    path = "/stores/{store_id}/inventory/{variant_id}",
    params(
        ("store_id" = Uuid, Path, description = "Store id"),
        ("variant_id" = Uuid, Path, description = "Product variant id"),
    ),
    responses(
        (status = 204, description = "Inventory deactivated"),
        (status = 404, description = "Unknown store or variant"),
    ),
    tag = "stores"
)]
pub async fn deactivate_inventory(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (store_id, variant_id) = path.into_inner();
    blocking(move || state.services.stores.deactivate_inventory(store_id, variant_id)).await?;
    Ok(HttpResponse::NoContent().finish())
}
