use std::io;
use std::sync::Arc;

use actix_web::web;
use dotenvy::dotenv;
use pod_order_service::application::Services;
use pod_order_service::config::Config;
use pod_order_service::handlers::AppState;
use pod_order_service::infrastructure::http::ApiClient;
use pod_order_service::infrastructure::order_repo::{DieselOrderStore, DieselWebhookLogRepository};
use pod_order_service::infrastructure::platforms::HttpPlatformGateway;
use pod_order_service::infrastructure::production_client::HttpProductionClient;
use pod_order_service::{build_server, create_pool, run_migrations};

fn startup<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> io::Error {
    move |e| io::Error::other(format!("{what}: {e}"))
}

// Not `#[actix_web::main]`: the blocking HTTP clients must be built outside
// of any async runtime.
fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(startup("configuration"))?;

    let pool = create_pool(&config.database_url).map_err(startup("database pool"))?;
    run_migrations(&pool).map_err(startup("database migrations"))?;

    let production_http =
        ApiClient::new(config.production_api_url.clone(), config.production_timeouts)
            .map_err(startup("production client"))?;
    let platform_http =
        ApiClient::new("", config.platform_timeouts).map_err(startup("platform client"))?;

    let services = Services::new(
        Arc::new(DieselOrderStore::new(pool.clone())),
        Arc::new(DieselWebhookLogRepository::new(pool)),
        Arc::new(HttpPlatformGateway::new(platform_http, config.shopify_api_version.clone())),
        Arc::new(HttpProductionClient::new(production_http, config.production_api_key.clone())),
        &config.service_settings(),
    );
    let state = web::Data::new(AppState {
        services,
        storefront_webhook_secret: config.storefront_webhook_secret.clone(),
        production_webhook_secret: config.production_webhook_secret.clone(),
    });

    log::info!("Starting server at http://{}:{}", config.host, config.port);
    if !config.submit_calls_production {
        log::warn!("SUBMIT_CALLS_PRODUCTION is off; submitted orders are not sent to production");
    }

    actix_web::rt::System::new().block_on(build_server(state, &config.host, config.port)?)
}
