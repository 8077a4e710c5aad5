mod client;
mod config;
mod error;
mod models;

pub use client::HttpGateway;
pub use config::HttpGatewayConfig;
pub use error::{HttpGatewayError, HttpResult};
