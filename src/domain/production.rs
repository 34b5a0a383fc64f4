use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ExternalApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrderItem {
    pub variant_mapping_id: Uuid,
    pub image_id: Option<String>,
    pub frame_sku_id: String,
    pub cx: f64,
    pub cy: f64,
    pub cw: f64,
    pub ch: f64,
    pub width: f64,
    pub height: f64,
    pub unit: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrderBody {
    pub reference: String,
    pub draft_order_items: Vec<DraftOrderItem>,
}

/// Body of `POST /draft_orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrderRequest {
    pub draft_order: DraftOrderBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionAck {
    pub production_order_id: String,
    pub promised_dispatch_date: Option<NaiveDate>,
}

/// The downstream system that manufactures the framed prints.
pub trait ProductionApi: Send + Sync {
    fn create_draft_order(
        &self,
        request: &DraftOrderRequest,
    ) -> Result<ProductionAck, ExternalApiError>;
}
