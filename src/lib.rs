pub mod config;
pub mod constants;
pub mod documents;
pub mod engine;
pub mod entity;
pub mod notifications;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
