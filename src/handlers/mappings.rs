use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{blocking, AppState};
use crate::application::mapping_service::DefaultMappingInput;
use crate::domain::mapping::{Bundle, CropRegion, FrameSpec, VariantMapping};
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FrameDto {
    pub frame_sku_id: String,
    pub width: f64,
    pub height: f64,
    pub unit: String,
    /// Minor units.
    pub cost: i64,
}

impl From<FrameDto> for FrameSpec {
    fn from(f: FrameDto) -> Self {
        FrameSpec {
            frame_sku_id: f.frame_sku_id,
            width: f.width,
            height: f.height,
            unit: f.unit,
            cost: f.cost,
        }
    }
}

impl From<FrameSpec> for FrameDto {
    fn from(f: FrameSpec) -> Self {
        FrameDto {
            frame_sku_id: f.frame_sku_id,
            width: f.width,
            height: f.height,
            unit: f.unit,
            cost: f.cost,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct CropDto {
    pub cx: f64,
    pub cy: f64,
    pub cw: f64,
    pub ch: f64,
}

impl From<CropDto> for CropRegion {
    fn from(c: CropDto) -> Self {
        CropRegion {
            cx: c.cx,
            cy: c.cy,
            cw: c.cw,
            ch: c.ch,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DefaultMappingRequest {
    pub product_variant_id: Uuid,
    pub country_code: String,
    pub slot_position: Option<i32>,
    pub frame: FrameDto,
    pub image_id: Option<String>,
    pub crop: Option<CropDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MappingResponse {
    pub id: Uuid,
    pub product_variant_id: Uuid,
    pub country_code: String,
    pub is_default: bool,
    pub slot_position: Option<i32>,
    pub frame: FrameDto,
    pub image_id: Option<String>,
    pub crop: CropDto,
}

impl From<VariantMapping> for MappingResponse {
    fn from(m: VariantMapping) -> Self {
        MappingResponse {
            id: m.id,
            product_variant_id: m.product_variant_id,
            country_code: m.country_code,
            is_default: m.is_default,
            slot_position: m.slot_position,
            frame: m.frame.into(),
            image_id: m.image_id,
            crop: CropDto {
                cx: m.crop.cx,
                cy: m.crop.cy,
                cw: m.crop.cw,
                ch: m.crop.ch,
            },
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BundleSlotsRequest {
    pub slots: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BundleResponse {
    pub id: Uuid,
    pub product_variant_id: Uuid,
    pub slot_positions: Vec<i32>,
}

impl From<Bundle> for BundleResponse {
    fn from(b: Bundle) -> Self {
        BundleResponse {
            id: b.id,
            product_variant_id: b.product_variant_id,
            slot_positions: b.slots.iter().map(|s| s.slot_position).collect(),
        }
    }
}

/// PUT /variant_mappings/default
///
/// Creates or replaces the catalog default for a variant and country,
/// or for one slot of a bundle.
#[utoipa::path(
    put,
    path = "/variant_mappings/default",
    request_body = DefaultMappingRequest,
    responses(
        (status = 200, description = "Default mapping stored", body = MappingResponse),
        (status = 400, description = "Invalid country, crop or slot"),
        (status = 404, description = "Unknown variant or slot"),
    ),
    tag = "mappings"
)]
pub async fn upsert_default_mapping(
    state: web::Data<AppState>,
    body: web::Json<DefaultMappingRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let input = DefaultMappingInput {
        product_variant_id: body.product_variant_id,
        country_code: body.country_code,
        slot_position: body.slot_position,
        frame: body.frame.into(),
        image_id: body.image_id,
        crop: body.crop.map(CropRegion::from),
    };
    let mapping = blocking(move || state.services.mappings.upsert_default(input)).await?;
    Ok(HttpResponse::Ok().json(MappingResponse::from(mapping)))
}

/// PUT /bundles/{variant_id}/slots
#[utoipa::path(
    put,
    path = "/bundles/{variant_id}/slots",
    params(("variant_id" = Uuid, Path, description = "Bundle product variant")),
    request_body = BundleSlotsRequest,
    responses(
        (status = 200, description = "Bundle resized", body = BundleResponse),
        (status = 400, description = "Count below one, or a removed slot is used by orders"),
        (status = 404, description = "Unknown variant"),
    ),
    tag = "mappings"
)]
pub async fn set_bundle_slots(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<BundleSlotsRequest>,
) -> Result<HttpResponse, AppError> {
    let variant_id = path.into_inner();
    let count = body.slots;
    let bundle =
        blocking(move || state.services.mappings.set_bundle_slots(variant_id, count)).await?;
    Ok(HttpResponse::Ok().json(BundleResponse::from(bundle)))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    use crate::application::testing::Fixture;
    use crate::handlers::configure;
    use crate::handlers::test_support::state;

    fn frame() -> Value {
        json!({
            "frame_sku_id": "FR-30x40-BLK",
            "width": 30.0,
            "height": 40.0,
            "unit": "cm",
            "cost": 1250,
        })
    }

    #[actix_web::test]
    async fn default_mapping_is_upserted_per_country() {
        let fx = Fixture::new();
        let variant = fx.variant("var-poster");
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;

        let put = |country: &str| {
            test::TestRequest::put()
                .uri("/variant_mappings/default")
                .set_json(json!({
                    "product_variant_id": variant,
                    "country_code": country,
                    "frame": frame(),
                    "image_id": "img-1",
                    "crop": { "cx": 0.0, "cy": 0.0, "cw": 300.0, "ch": 400.0 }
                }))
                .to_request()
        };

        let first: Value = test::read_body_json(test::call_service(&app, put("us")).await).await;
        assert_eq!(first["country_code"], "US");
        assert_eq!(first["is_default"], true);
        let again: Value = test::read_body_json(test::call_service(&app, put("US")).await).await;
        assert_eq!(first["id"], again["id"]);

        let resp = test::call_service(&app, put("USA")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn bundle_slots_grow_and_shrink() {
        let fx = Fixture::new();
        let variant = fx.variant("var-triptych");
        let app = test::init_service(App::new().app_data(state(&fx)).configure(configure)).await;
        let uri = format!("/bundles/{variant}/slots");
        let slots = |n: i32| {
            test::TestRequest::put()
                .uri(&uri)
                .set_json(json!({ "slots": n }))
                .to_request()
        };

        let resp = test::call_service(&app, slots(3)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["slot_positions"], json!([1, 2, 3]));

        let resp = test::call_service(&app, slots(2)).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["slot_positions"], json!([1, 2]));

        let resp = test::call_service(&app, slots(0)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
