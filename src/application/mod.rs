pub mod fulfillment_requests;
pub mod fulfillment_sync;
pub mod import_service;
pub mod mapping_service;
pub mod order_service;
mod platform_calls;
pub mod store_service;
pub mod submission;
pub mod webhook_gateway;
pub mod webhook_router;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::domain::ports::{OrderStore, PlatformGateway, WebhookLogRepository};
use crate::domain::production::ProductionApi;

use fulfillment_requests::FulfillmentRequestHandler;
use fulfillment_sync::FulfillmentSync;
use import_service::ImportService;
use mapping_service::MappingService;
use order_service::OrderService;
use store_service::StoreService;
use submission::SubmissionService;
use webhook_gateway::WebhookGateway;
use webhook_router::WebhookRouter;

/// Name the production backend registers under on storefronts.
pub const FULFILLMENT_SERVICE_NAME: &str = "Print Production";

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// When false, `submit` starts production without calling the production API.
    pub submit_calls_production: bool,
    pub fulfillment_service_name: String,
    pub fulfillment_callback_url: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            submit_calls_production: true,
            fulfillment_service_name: FULFILLMENT_SERVICE_NAME.to_string(),
            fulfillment_callback_url: None,
        }
    }
}

/// Every application service, wired to the same ports. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub orders: OrderService,
    pub mappings: MappingService,
    pub submissions: SubmissionService,
    pub imports: ImportService,
    pub fulfillments: FulfillmentSync,
    pub requests: FulfillmentRequestHandler,
    pub stores: StoreService,
    pub webhooks: WebhookGateway,
    pub router: WebhookRouter,
}

impl Services {
    pub fn new(
        store: Arc<dyn OrderStore>,
        logs: Arc<dyn WebhookLogRepository>,
        gateway: Arc<dyn PlatformGateway>,
        production: Arc<dyn ProductionApi>,
        settings: &ServiceSettings,
    ) -> Self {
        let imports = ImportService::new(store.clone(), gateway.clone());
        let fulfillments = FulfillmentSync::new(store.clone(), gateway.clone());
        let requests =
            FulfillmentRequestHandler::new(store.clone(), gateway.clone(), imports.clone());
        let stores = StoreService::new(
            store.clone(),
            gateway,
            settings.fulfillment_service_name.clone(),
            settings.fulfillment_callback_url.clone(),
        );
        Self {
            orders: OrderService::new(store.clone()),
            mappings: MappingService::new(store.clone()),
            submissions: SubmissionService::new(
                store,
                production,
                settings.submit_calls_production,
            ),
            router: WebhookRouter::new(
                imports.clone(),
                fulfillments.clone(),
                requests.clone(),
                stores.clone(),
            ),
            imports,
            fulfillments,
            requests,
            stores,
            webhooks: WebhookGateway::new(logs),
        }
    }
}
