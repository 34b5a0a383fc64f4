pub mod http;
pub mod memory;
pub mod models;
pub mod order_repo;
pub mod platforms;
pub mod production_client;
