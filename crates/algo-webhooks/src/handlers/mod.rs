//! HTTP handlers for webhook endpoints.

pub mod deliveries;
