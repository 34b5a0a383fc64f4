//! Storefront adapters and the gateway that binds them to a store.

mod shopify;
mod squarespace;
mod wix;

pub use shopify::ShopifyAdapter;
pub use squarespace::SquarespaceAdapter;
pub use wix::WixAdapter;

use crate::domain::errors::DomainError;
use crate::domain::platform::PlatformAdapter;
use crate::domain::ports::PlatformGateway;
use crate::domain::store::{Platform, Store};
use crate::infrastructure::http::ApiClient;

const SQUARESPACE_API: &str = "https://api.squarespace.com/1.0";
const WIX_API: &str = "https://www.wixapis.com";

/// Numeric tail of a Shopify global id (`gid://shopify/Order/42` -> `42`).
pub fn legacy_id(gid: &str) -> &str {
    gid.rsplit('/').next().unwrap_or(gid)
}

/// Global id for a REST or webhook id; already-global ids pass through.
pub fn shopify_gid(kind: &str, id: &str) -> String {
    if id.starts_with("gid://") {
        id.to_string()
    } else {
        format!("gid://shopify/{kind}/{id}")
    }
}

/// Builds adapters sharing one HTTP connection pool.
pub struct HttpPlatformGateway {
    http: ApiClient,
    shopify_api_version: String,
}

impl HttpPlatformGateway {
    pub fn new(http: ApiClient, shopify_api_version: impl Into<String>) -> Self {
        Self {
            http,
            shopify_api_version: shopify_api_version.into(),
        }
    }
}

impl PlatformGateway for HttpPlatformGateway {
    fn adapter_for(&self, store: &Store) -> Result<Box<dyn PlatformAdapter>, DomainError> {
        if store.access_token.is_empty() {
            return Err(DomainError::Authentication(format!(
                "store {} has no access token",
                store.shop_domain
            )));
        }
        let token = store.access_token.clone();
        Ok(match store.platform {
            Platform::Shopify => {
                let base = format!(
                    "https://{}/admin/api/{}",
                    store.shop_domain, self.shopify_api_version
                );
                Box::new(ShopifyAdapter::new(self.http.with_base_url(base), token))
            }
            Platform::Squarespace => Box::new(SquarespaceAdapter::new(
                self.http.with_base_url(SQUARESPACE_API),
                token,
            )),
            Platform::Wix => Box::new(WixAdapter::new(self.http.with_base_url(WIX_API), token)),
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::infrastructure::http::Timeouts;

    fn store(platform: Platform, token: &str) -> Store {
        Store {
            id: Uuid::new_v4(),
            platform,
            shop_domain: "demo.myshopify.com".into(),
            access_token: token.into(),
            owner_user_id: Uuid::new_v4(),
            needs_reauth: false,
            uninstalled_at: None,
            fulfillment_service_id: None,
            fulfillment_location_id: None,
        }
    }

    #[test]
    fn gids() {
        assert_eq!(legacy_id("gid://shopify/Order/450789469"), "450789469");
        assert_eq!(legacy_id("450789469"), "450789469");
        assert_eq!(shopify_gid("Order", "450789469"), "gid://shopify/Order/450789469");
        assert_eq!(shopify_gid("Order", "gid://shopify/Order/1"), "gid://shopify/Order/1");
    }

    #[test]
    fn adapters_follow_the_store_platform() {
        let gateway = HttpPlatformGateway::new(
            ApiClient::new("http://localhost", Timeouts::default()).unwrap(),
            "2024-07",
        );
        for platform in [Platform::Shopify, Platform::Squarespace, Platform::Wix] {
            let adapter = gateway.adapter_for(&store(platform, "token")).unwrap();
            assert_eq!(adapter.platform(), platform);
        }
        assert!(matches!(
            gateway.adapter_for(&store(Platform::Wix, "")),
            Err(DomainError::Authentication(_))
        ));
    }
}
