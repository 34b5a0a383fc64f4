use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Shopify,
    Squarespace,
    Wix,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Shopify => "shopify",
            Platform::Squarespace => "squarespace",
            Platform::Wix => "wix",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shopify" => Ok(Platform::Shopify),
            "squarespace" => Ok(Platform::Squarespace),
            "wix" => Ok(Platform::Wix),
            other => Err(DomainError::validation(format!("unknown platform '{other}'"))),
        }
    }
}

/// A merchant's connection to one storefront. Managed elsewhere; this
/// subsystem reads it and flags re-authentication or uninstall.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub id: Uuid,
    pub platform: Platform,
    pub shop_domain: String,
    pub access_token: String,
    pub owner_user_id: Uuid,
    pub needs_reauth: bool,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub fulfillment_service_id: Option<String>,
    pub fulfillment_location_id: Option<String>,
}

impl Store {
    pub fn is_active(&self) -> bool {
        self.uninstalled_at.is_none()
    }
}

/// Storefront product variant as populated by catalog sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductVariant {
    pub id: Uuid,
    pub store_id: Uuid,
    pub external_id: String,
    pub inventory_item_id: Option<String>,
}
