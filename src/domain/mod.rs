pub mod activity;
pub mod errors;
pub mod fulfillment;
pub mod mapping;
pub mod money;
pub mod order;
pub mod platform;
pub mod ports;
pub mod production;
pub mod store;
pub mod webhook;
