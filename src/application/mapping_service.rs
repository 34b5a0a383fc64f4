use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::mapping::{
    normalize_country, Bundle, BundleSlot, CropRegion, FrameSpec, MappingSource, ResolvedItem,
    VariantMapping,
};
use crate::domain::order::OrderItem;
use crate::domain::ports::{OrderStore, OrderTx};

/// Resolve the mappings an item is produced from.
///
/// Order: the item's frozen snapshots, then the catalog default for
/// `(variant, country)`, per slot for bundles. `None` means the item cannot
/// be produced. A bundle resolves only when every slot does.
pub fn resolve_item(
    tx: &mut dyn OrderTx,
    item: &OrderItem,
    country: Option<&str>,
) -> Result<Option<ResolvedItem>, DomainError> {
    let snapshots = tx.snapshot_mappings(item.id)?;
    if !snapshots.is_empty() {
        return Ok(Some(ResolvedItem {
            order_item_id: item.id,
            quantity: item.quantity,
            source: MappingSource::Snapshot,
            mappings: snapshots,
        }));
    }

    let (Some(variant_id), Some(country)) = (item.product_variant_id, country) else {
        return Ok(None);
    };

    let mappings = match tx.find_bundle(variant_id)? {
        Some(bundle) => {
            let mut per_slot = Vec::with_capacity(bundle.slots.len());
            for slot in &bundle.slots {
                match tx.slot_default_mapping(slot.id, country)? {
                    Some(mapping) => per_slot.push(mapping),
                    None => return Ok(None),
                }
            }
            per_slot
        }
        None => match tx.default_mapping(variant_id, country)? {
            Some(mapping) => vec![mapping],
            None => return Ok(None),
        },
    };

    if mappings.is_empty() {
        return Ok(None);
    }
    Ok(Some(ResolvedItem {
        order_item_id: item.id,
        quantity: item.quantity,
        source: MappingSource::CatalogDefault,
        mappings,
    }))
}

#[derive(Debug, Clone)]
pub struct DefaultMappingInput {
    pub product_variant_id: Uuid,
    pub country_code: String,
    /// Target a bundle slot instead of the plain variant default.
    pub slot_position: Option<i32>,
    pub frame: FrameSpec,
    pub image_id: Option<String>,
    pub crop: Option<CropRegion>,
}

#[derive(Clone)]
pub struct MappingService {
    store: Arc<dyn OrderStore>,
}

impl MappingService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Create or update the single catalog default for a variant/country
    /// (or bundle slot/country).
    pub fn upsert_default(
        &self,
        input: DefaultMappingInput,
    ) -> Result<VariantMapping, DomainError> {
        let country = normalize_country(&input.country_code)?;
        if let Some(crop) = &input.crop {
            crop.validate()?;
        }
        if input.image_id.is_some() && input.crop.is_none() {
            return Err(DomainError::validation("an image needs a crop region"));
        }

        self.store.transaction(|tx| {
            tx.find_product_variant(input.product_variant_id)?.ok_or_else(|| {
                DomainError::not_found(format!("product variant {}", input.product_variant_id))
            })?;

            let slot = match input.slot_position {
                Some(position) => {
                    let bundle = tx
                        .find_bundle(input.product_variant_id)?
                        .ok_or_else(|| DomainError::validation("variant is not a bundle"))?;
                    let slot = bundle
                        .slots
                        .iter()
                        .find(|s| s.slot_position == position)
                        .cloned()
                        .ok_or_else(|| DomainError::not_found(format!("bundle slot {position}")))?;
                    Some(slot)
                }
                None => None,
            };

            let existing = match &slot {
                Some(slot) => tx.slot_default_mapping(slot.id, &country)?,
                None => tx.default_mapping(input.product_variant_id, &country)?,
            };

            match existing {
                Some(mut mapping) => {
                    if mapping.is_frozen() {
                        return Err(DomainError::validation("mapping is a frozen order snapshot"));
                    }
                    mapping.frame = input.frame.clone();
                    mapping.image_id = input.image_id.clone();
                    mapping.crop = input.crop.unwrap_or_default();
                    mapping.updated_at = Utc::now();
                    tx.update_mapping(&mapping)?;
                    Ok(mapping)
                }
                None => {
                    let mut mapping = VariantMapping::new_default(
                        input.product_variant_id,
                        country.clone(),
                        input.frame.clone(),
                    );
                    mapping.bundle_slot_id = slot.as_ref().map(|s| s.id);
                    mapping.slot_position = slot.as_ref().map(|s| s.slot_position);
                    mapping.image_id = input.image_id.clone();
                    mapping.crop = input.crop.unwrap_or_default();
                    tx.insert_mapping(&mapping)?;
                    info!(
                        "default mapping created for variant {} ({country})",
                        input.product_variant_id
                    );
                    Ok(mapping)
                }
            }
        })
    }

    /// Change the number of slots of a variant's bundle, creating the bundle
    /// on first use. Re-running with the same count is a no-op.
    ///
    /// Slot 1 takes over the variant's plain defaults; new slots get copies
    /// of slot 1's frame without artwork. Removing a slot whose mappings
    /// were used by an order fails.
    pub fn set_bundle_slots(
        &self,
        product_variant_id: Uuid,
        count: i32,
    ) -> Result<Bundle, DomainError> {
        if count < 1 {
            return Err(DomainError::validation("a bundle needs at least one slot"));
        }
        self.store.transaction(|tx| {
            let variant = tx
                .find_product_variant(product_variant_id)?
                .ok_or_else(|| {
                    DomainError::not_found(format!("product variant {product_variant_id}"))
                })?;

            let bundle = match tx.find_bundle(variant.id)? {
                Some(bundle) => bundle,
                None => create_bundle(tx, variant.id)?,
            };

            for slot in bundle.slots.iter().filter(|s| s.slot_position > count) {
                for mapping in tx.slot_mappings(slot.id)? {
                    if tx.mapping_is_referenced(mapping.id)? {
                        return Err(DomainError::validation(format!(
                            "slot {} mapping {} is referenced by orders",
                            slot.slot_position, mapping.id
                        )));
                    }
                    tx.delete_mapping(mapping.id)?;
                }
                tx.delete_bundle_slot(slot.id)?;
            }

            let current = bundle.slots.iter().map(|s| s.slot_position).max().unwrap_or(0);
            if count > current {
                let template = match bundle.first_slot() {
                    Some(first) => tx.slot_mappings(first.id)?,
                    None => Vec::new(),
                };
                if template.is_empty() {
                    warn!("bundle for variant {product_variant_id} has no slot 1 mappings to copy");
                }
                for position in (current + 1)..=count {
                    let slot = BundleSlot {
                        id: Uuid::new_v4(),
                        bundle_id: bundle.id,
                        slot_position: position,
                    };
                    tx.insert_bundle_slot(&slot)?;
                    for mapping in &template {
                        tx.insert_mapping(&mapping.blank_copy_for_slot(slot.id, position))?;
                    }
                }
            }

            tx.find_bundle(variant.id)?
                .ok_or_else(|| DomainError::Internal("bundle vanished".into()))
        })
    }

    /// Edit a mapping by id. Snapshots attached to orders are immutable.
    pub fn update_mapping(
        &self,
        mapping_id: Uuid,
        frame: FrameSpec,
        image_id: Option<String>,
        crop: CropRegion,
    ) -> Result<VariantMapping, DomainError> {
        crop.validate()?;
        self.store.transaction(|tx| {
            let mut mapping = tx
                .find_mapping(mapping_id)?
                .ok_or_else(|| DomainError::not_found(format!("variant mapping {mapping_id}")))?;
            if mapping.is_frozen() {
                return Err(DomainError::validation("mapping is a frozen order snapshot"));
            }
            mapping.frame = frame;
            mapping.image_id = image_id;
            mapping.crop = crop;
            mapping.updated_at = Utc::now();
            tx.update_mapping(&mapping)?;
            Ok(mapping)
        })
    }
}

/// New bundle with slot 1 owning the variant's existing plain defaults.
fn create_bundle(tx: &mut dyn OrderTx, product_variant_id: Uuid) -> Result<Bundle, DomainError> {
    let bundle = Bundle {
        id: Uuid::new_v4(),
        product_variant_id,
        slots: Vec::new(),
    };
    tx.insert_bundle(&bundle)?;
    let first = BundleSlot {
        id: Uuid::new_v4(),
        bundle_id: bundle.id,
        slot_position: 1,
    };
    tx.insert_bundle_slot(&first)?;

    for mut mapping in tx.variant_defaults(product_variant_id)? {
        mapping.bundle_slot_id = Some(first.id);
        mapping.slot_position = Some(1);
        mapping.updated_at = Utc::now();
        tx.update_mapping(&mapping)?;
    }
    Ok(Bundle {
        slots: vec![first],
        ..bundle
    })
}
