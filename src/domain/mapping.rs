use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Physical product the production system builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub frame_sku_id: String,
    pub width: f64,
    pub height: f64,
    pub unit: String,
    /// Production cost in minor units.
    pub cost: i64,
}

/// Crop rectangle on the source image, in image pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub cx: f64,
    pub cy: f64,
    pub cw: f64,
    pub ch: f64,
}

impl CropRegion {
    pub fn validate(&self) -> Result<(), DomainError> {
        let finite = [self.cx, self.cy, self.cw, self.ch].iter().all(|v| v.is_finite());
        if !finite || self.cx < 0.0 || self.cy < 0.0 || self.cw <= 0.0 || self.ch <= 0.0 {
            return Err(DomainError::validation(
                "crop region must be non-negative with positive size",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantMapping {
    pub id: Uuid,
    pub product_variant_id: Uuid,
    pub country_code: String,
    pub is_default: bool,
    pub bundle_slot_id: Option<Uuid>,
    /// Set on frozen snapshots: the order item this copy was produced for.
    pub order_item_id: Option<Uuid>,
    /// Catalog mapping a snapshot was copied from.
    pub source_mapping_id: Option<Uuid>,
    pub slot_position: Option<i32>,
    pub frame: FrameSpec,
    pub image_id: Option<String>,
    pub crop: CropRegion,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VariantMapping {
    pub fn new_default(product_variant_id: Uuid, country_code: String, frame: FrameSpec) -> Self {
        let now = Utc::now();
        VariantMapping {
            id: Uuid::new_v4(),
            product_variant_id,
            country_code,
            is_default: true,
            bundle_slot_id: None,
            order_item_id: None,
            source_mapping_id: None,
            slot_position: None,
            frame,
            image_id: None,
            crop: CropRegion::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshots referenced by an order item must never change.
    pub fn is_frozen(&self) -> bool {
        self.order_item_id.is_some()
    }

    /// Immutable copy attached to `order_item_id`.
    pub fn snapshot_for(&self, order_item_id: Uuid) -> Self {
        let now = Utc::now();
        VariantMapping {
            id: Uuid::new_v4(),
            is_default: false,
            bundle_slot_id: None,
            order_item_id: Some(order_item_id),
            source_mapping_id: Some(self.id),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Seed mapping for a newly added bundle slot: same frame, no artwork.
    pub fn blank_copy_for_slot(&self, slot_id: Uuid, slot_position: i32) -> Self {
        let now = Utc::now();
        VariantMapping {
            id: Uuid::new_v4(),
            is_default: true,
            bundle_slot_id: Some(slot_id),
            order_item_id: None,
            source_mapping_id: None,
            slot_position: Some(slot_position),
            image_id: None,
            crop: CropRegion::default(),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSlot {
    pub id: Uuid,
    pub bundle_id: Uuid,
    pub slot_position: i32,
}

/// Several framed items sold as one storefront variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub id: Uuid,
    pub product_variant_id: Uuid,
    /// Ordered by `slot_position`, starting at 1.
    pub slots: Vec<BundleSlot>,
}

impl Bundle {
    pub fn first_slot(&self) -> Option<&BundleSlot> {
        self.slots.iter().min_by_key(|s| s.slot_position)
    }
}

/// ISO 3166-1 alpha-2, upper case.
pub fn normalize_country(code: &str) -> Result<String, DomainError> {
    let code = code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::validation(format!("invalid country code '{code}'")));
    }
    Ok(code.to_ascii_uppercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    Snapshot,
    CatalogDefault,
}

/// Mappings an order item will be produced from, one per bundle slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub order_item_id: Uuid,
    pub quantity: i32,
    pub source: MappingSource,
    pub mappings: Vec<VariantMapping>,
}
