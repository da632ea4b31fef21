pub mod api;
pub mod config;
pub mod extractors;
pub mod handlers;
pub mod query;
pub mod router;
pub mod server;
