//! # InfluxDB Token Broker Library
//!
//! Vends scoped InfluxDB tokens to components on the same host over a local
//! publish/subscribe bus. Tokens are listed once at startup through the
//! InfluxDB CLI; each request on the inbound topic is answered with the
//! matching token on the outbound topic.
//!
//! Modules:
//! - `config`: launch parameters, optional settings file, validation
//! - `cache`: immutable token records fetched at startup
//! - `sources`: token listing via `docker exec ... influx auth list`
//! - `resolver`: access level → token selection and response payloads
//! - `broker`: subscription lifecycle and per-message handling
//! - `transport`: pub/sub seam with in-process and Unix socket transports
//! - `secrets`: credentials lookup for the `retrieve-secret` helper

pub mod app;
pub mod broker;
pub mod cache;
pub mod config;
pub mod observability;
pub mod resolver;
pub mod secrets;
pub mod server;
pub mod sources;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub mod tests;
