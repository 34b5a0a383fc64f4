use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{actor, blocking, AppState};
use crate::application::order_service::{ManualItemInput, ManualOrderInput, OrderView};
use crate::application::submission::{SubmissionFailure, SubmissionResult};
use crate::domain::activity::Actor;
use crate::domain::errors::DomainError;
use crate::domain::fulfillment::Fulfillment;
use crate::domain::order::{
    DisplayStatus, Order, OrderItem, OrderOwner, OrderTotals, ShippingAddress,
};
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AddressDto {
    pub name: Option<String>,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province_code: Option<String>,
    pub zip: Option<String>,
    /// ISO 3166-1 alpha-2
    pub country_code: Option<String>,
    pub phone: Option<String>,
}

impl From<AddressDto> for ShippingAddress {
    fn from(a: AddressDto) -> Self {
        ShippingAddress {
            name: a.name,
            company: a.company,
            address1: a.address1,
            address2: a.address2,
            city: a.city,
            province_code: a.province_code,
            zip: a.zip,
            country_code: a.country_code,
            phone: a.phone,
        }
    }
}

impl From<ShippingAddress> for AddressDto {
    fn from(a: ShippingAddress) -> Self {
        AddressDto {
            name: a.name,
            company: a.company,
            address1: a.address1,
            address2: a.address2,
            city: a.city,
            province_code: a.province_code,
            zip: a.zip,
            country_code: a.country_code,
            phone: a.phone,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualItemRequest {
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    /// Minor units of the order currency.
    #[serde(default)]
    pub unit_price: i64,
    pub product_variant_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateManualOrderRequest {
    pub external_id: Option<String>,
    pub currency: String,
    pub email: Option<String>,
    pub items: Vec<ManualItemRequest>,
    pub shipping_address: AddressDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportOrderRequest {
    /// Storefront to pull from.
    pub store_id: Uuid,
    pub external_order_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TotalsResponse {
    pub subtotal: i64,
    pub shipping: i64,
    pub tax: i64,
    pub discount: i64,
    pub total: i64,
}

impl From<OrderTotals> for TotalsResponse {
    fn from(t: OrderTotals) -> Self {
        TotalsResponse {
            subtotal: t.subtotal,
            shipping: t.shipping,
            tax: t.tax,
            discount: t.discount,
            total: t.total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemResponse {
    pub id: Uuid,
    pub external_line_id: Option<String>,
    pub title: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: i64,
    pub product_variant_id: Option<Uuid>,
}

impl From<OrderItem> for ItemResponse {
    fn from(i: OrderItem) -> Self {
        ItemResponse {
            id: i.id,
            external_line_id: i.external_line_id,
            title: i.title,
            sku: i.sku,
            quantity: i.quantity,
            unit_price: i.unit_price,
            product_variant_id: i.product_variant_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FulfillmentResponse {
    pub id: Uuid,
    pub external_id: String,
    pub source: String,
    pub status: String,
    pub tracking_carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub platform_fulfillment_id: Option<String>,
    pub line_items: Vec<FulfillmentLineResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FulfillmentLineResponse {
    pub order_item_id: Uuid,
    pub quantity: i32,
}

impl From<Fulfillment> for FulfillmentResponse {
    fn from(f: Fulfillment) -> Self {
        FulfillmentResponse {
            id: f.id,
            external_id: f.external_id,
            source: f.source.as_str().to_string(),
            status: f.status.as_str().to_string(),
            tracking_carrier: f.tracking.carrier,
            tracking_number: f.tracking.number,
            tracking_url: f.tracking.url,
            shipped_at: f.shipped_at,
            platform_fulfillment_id: f.platform_fulfillment_id,
            line_items: f
                .line_items
                .iter()
                .map(|l| FulfillmentLineResponse {
                    order_item_id: l.order_item_id,
                    quantity: l.quantity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub uid: String,
    pub name: String,
    pub external_id: Option<String>,
    pub store_id: Option<Uuid>,
    /// Persisted lifecycle state.
    pub status: String,
    /// Lifecycle state as shown to people, including `partially_fulfilled`.
    #[schema(value_type = String)]
    pub display_status: DisplayStatus,
    pub email: Option<String>,
    pub currency: String,
    pub totals: TotalsResponse,
    pub country_code: Option<String>,
    pub production_order_id: Option<String>,
    pub promised_dispatch_date: Option<NaiveDate>,
    pub placed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemResponse>,
    pub shipping_address: Option<AddressDto>,
    pub fulfillments: Vec<FulfillmentResponse>,
}

impl From<OrderView> for OrderResponse {
    fn from(view: OrderView) -> Self {
        let order = view.order;
        OrderResponse {
            store_id: order.store_id(),
            status: order.status.as_str().to_string(),
            display_status: view.display_status,
            totals: order.totals.into(),
            uid: order.uid,
            name: order.name,
            external_id: order.external_id,
            email: order.email,
            currency: order.currency,
            country_code: order.country_code,
            production_order_id: order.production_order_id,
            promised_dispatch_date: order.promised_dispatch_date,
            placed_at: order.placed_at,
            submitted_at: order.submitted_at,
            fulfilled_at: order.fulfilled_at,
            completed_at: order.completed_at,
            cancelled_at: order.cancelled_at,
            items: view.items.into_iter().map(ItemResponse::from).collect(),
            shipping_address: view.shipping_address.map(AddressDto::from),
            fulfillments: view.fulfillments.into_iter().map(FulfillmentResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub success: bool,
    pub uid: String,
    pub status: Option<String>,
    pub production_order_id: Option<String>,
    pub promised_dispatch_date: Option<NaiveDate>,
    pub submitted_items: usize,
    pub error: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// Load the full order view after a command, so every command answers with
/// the same representation as `GET /orders/{uid}`.
fn view_of(state: &AppState, order: Order) -> Result<OrderResponse, DomainError> {
    state
        .services
        .orders
        .get_order(&order.uid)?
        .map(OrderResponse::from)
        .ok_or_else(|| DomainError::not_found(format!("order {}", order.uid)))
}

/// POST /orders
///
/// Creates a store-less draft order for the acting user.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateManualOrderRequest,
    params(("X-Actor-Id" = Uuid, Header, description = "Acting user")),
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Invalid order"),
    ),
    tag = "orders"
)]
pub async fn create_manual_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateManualOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let actor = actor(&req)?;
    let body = body.into_inner();
    let input = ManualOrderInput {
        external_id: body.external_id,
        currency: body.currency,
        email: body.email,
        items: body
            .items
            .into_iter()
            .map(|i| ManualItemInput {
                title: i.title,
                sku: i.sku,
                quantity: i.quantity,
                unit_price: i.unit_price,
                product_variant_id: i.product_variant_id,
            })
            .collect(),
        shipping_address: body.shipping_address.into(),
    };

    let response = blocking(move || {
        let order = state.services.orders.create_manual_order(actor, input)?;
        view_of(&state, order)
    })
    .await?;
    Ok(HttpResponse::Created().json(response))
}

/// POST /orders/import
///
/// Pulls an order from a connected storefront, creating or resyncing it.
#[utoipa::path(
    post,
    path = "/orders/import",
    request_body = ImportOrderRequest,
    responses(
        (status = 200, description = "Order imported or resynced", body = OrderResponse),
        (status = 401, description = "Storefront credentials rejected"),
        (status = 404, description = "Unknown store or remote order"),
        (status = 502, description = "Storefront unavailable"),
    ),
    tag = "orders"
)]
pub async fn import_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ImportOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let actor = actor(&req)?;
    let body = body.into_inner();
    let response = blocking(move || {
        let order = state
            .services
            .imports
            .import_or_resync(actor, OrderOwner::Store(body.store_id), &body.external_order_id)?;
        view_of(&state, order)
    })
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /orders/{uid}
#[utoipa::path(
    get,
    path = "/orders/{uid}",
    params(("uid" = String, Path, description = "Public order id")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let uid = path.into_inner();
    let found = blocking(move || state.services.orders.get_order(&uid).map(|v| (uid, v))).await?;
    match found {
        (_, Some(view)) => Ok(HttpResponse::Ok().json(OrderResponse::from(view))),
        (uid, None) => Err(AppError::NotFound(format!("order {uid} not found"))),
    }
}

/// POST /orders/{uid}/submit
///
/// Sends the order to production. A refused or failed submission leaves the
/// order in `draft`.
#[utoipa::path(
    post,
    path = "/orders/{uid}/submit",
    params(("uid" = String, Path, description = "Public order id")),
    responses(
        (status = 200, description = "Order in production", body = SubmitResponse),
        (status = 409, description = "Order cannot be submitted in its current state"),
        (status = 422, description = "Production refused the order", body = SubmitResponse),
        (status = 502, description = "Production unavailable", body = SubmitResponse),
    ),
    tag = "orders"
)]
pub async fn submit_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let actor = actor(&req)?;
    let uid = path.into_inner();
    let result = {
        let uid = uid.clone();
        blocking(move || state.services.submissions.submit(actor, &uid)).await?
    };
    Ok(submission_response(uid, result))
}

fn submission_response(uid: String, result: SubmissionResult) -> HttpResponse {
    match result {
        SubmissionResult::Submitted {
            order,
            production_order_id,
            promised_dispatch_date,
            submitted_items,
        } => HttpResponse::Ok().json(SubmitResponse {
            success: true,
            status: Some(order.status.as_str().to_string()),
            uid,
            production_order_id,
            promised_dispatch_date,
            submitted_items,
            error: None,
        }),
        SubmissionResult::Failed(failure) => {
            let body = SubmitResponse {
                success: false,
                uid,
                status: None,
                production_order_id: None,
                promised_dispatch_date: None,
                submitted_items: 0,
                error: Some(failure.message()),
            };
            match failure {
                SubmissionFailure::NoEligibleItems | SubmissionFailure::Rejected { .. } => {
                    HttpResponse::UnprocessableEntity().json(body)
                }
                _ => HttpResponse::BadGateway().json(body),
            }
        }
    }
}

async fn transition(
    req: HttpRequest,
    state: web::Data<AppState>,
    uid: String,
    apply: fn(&AppState, Actor, &str) -> Result<Order, DomainError>,
) -> Result<HttpResponse, AppError> {
    let actor = actor(&req)?;
    let response = blocking(move || {
        let order = apply(&state, actor, &uid)?;
        view_of(&state, order)
    })
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /orders/{uid}/cancel
#[utoipa::path(
    post,
    path = "/orders/{uid}/cancel",
    params(("uid" = String, Path, description = "Public order id")),
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 409, description = "Order cannot be cancelled in its current state"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    transition(req, state, path.into_inner(), |s, actor, uid| {
        s.services.orders.cancel(actor, uid)
    })
    .await
}

/// POST /orders/{uid}/reopen
#[utoipa::path(
    post,
    path = "/orders/{uid}/reopen",
    params(("uid" = String, Path, description = "Public order id")),
    responses(
        (status = 200, description = "Order back in draft", body = OrderResponse),
        (status = 409, description = "Only cancelled orders can be reopened"),
    ),
    tag = "orders"
)]
pub async fn reopen_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    transition(req, state, path.into_inner(), |s, actor, uid| {
        s.services.orders.reopen(actor, uid)
    })
    .await
}

/// POST /orders/{uid}/complete
#[utoipa::path(
    post,
    path = "/orders/{uid}/complete",
    params(("uid" = String, Path, description = "Public order id")),
    responses(
        (status = 200, description = "Order completed", body = OrderResponse),
        (status = 409, description = "Only fulfilled orders can be completed"),
    ),
    tag = "orders"
)]
pub async fn complete_order(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    transition(req, state, path.into_inner(), |s, actor, uid| {
        s.services.orders.complete(actor, uid)
    })
    .await
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    use super::*;
    use crate::application::testing::Fixture;
    use crate::domain::errors::ExternalApiError;
    use crate::domain::order::OrderStatus;
    use crate::handlers::test_support::state;
    use crate::handlers::{configure, ACTOR_HEADER};

    #[actix_web::test]
    async fn manual_order_is_created_for_the_acting_user() {
        let fx = Fixture::new();
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;
        let user = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((ACTOR_HEADER, user.to_string()))
            .set_json(json!({
                "currency": "USD",
                "email": "me@example.com",
                "items": [{ "title": "Poster", "quantity": 2, "unit_price": 1500 }],
                "shipping_address": { "name": "Me", "country_code": "us" }
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "draft");
        assert_eq!(body["display_status"], "draft");
        assert_eq!(body["totals"]["total"], 3000);
        assert_eq!(body["store_id"], Value::Null);
        assert_eq!(body["items"].as_array().map(Vec::len), Some(1));
    }

    #[actix_web::test]
    async fn manual_order_without_actor_is_rejected() {
        let fx = Fixture::new();
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/orders")
            .set_json(json!({
                "currency": "USD",
                "items": [{ "title": "Poster", "quantity": 1 }],
                "shipping_address": {}
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((ACTOR_HEADER, "not-a-uuid"))
            .set_json(json!({ "currency": "USD", "items": [], "shipping_address": {} }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn unknown_order_is_404() {
        let fx = Fixture::new();
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;
        let req = test::TestRequest::get().uri("/orders/PO-NOPE").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "order PO-NOPE not found");
    }

    #[actix_web::test]
    async fn submit_moves_a_mapped_order_into_production() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1, 2]);
        fx.map_all_items(&order);
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/orders/{}/submit", order.uid))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "in_production");
        assert_eq!(body["submitted_items"], 2);
        assert_eq!(fx.production.calls(), 1);

        let req = test::TestRequest::post()
            .uri(&format!("/orders/{}/submit", order.uid))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn production_failures_leave_the_order_in_draft() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        fx.map_all_items(&order);
        fx.production.respond(Err(ExternalApiError::Client {
            status: 422,
            message: "unknown frame".into(),
        }));
        fx.production.respond(Err(ExternalApiError::Timeout));
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;
        let uri = format!("/orders/{}/submit", order.uid);

        let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("unknown frame"));

        let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(fx.memory.read(|s| s.orders[&order.id].status), OrderStatus::Draft);
    }

    #[actix_web::test]
    async fn cancel_then_reopen() {
        let fx = Fixture::new();
        let order = fx.draft_order_with_items(&[1]);
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/orders/{}/reopen", order.uid))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/orders/{}/cancel", order.uid))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "cancelled");

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/orders/{}/reopen", order.uid))
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "draft");
    }

    #[actix_web::test]
    async fn import_pulls_the_remote_order() {
        let fx = Fixture::new();
        fx.platform.put_order(fx.remote_order("5001", &[("L1", 1)]));
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/orders/import")
            .set_json(json!({ "store_id": fx.store.id, "external_order_id": "5001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["external_id"], "5001");
        assert_eq!(body["status"], "draft");

        fx.platform.reject_credentials(true);
        let req = test::TestRequest::post()
            .uri("/orders/import")
            .set_json(json!({ "store_id": fx.store.id, "external_order_id": "5001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
