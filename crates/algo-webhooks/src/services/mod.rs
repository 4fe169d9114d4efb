//! Delivery engine services.

pub mod dispatcher;
pub mod history;
pub mod matcher;
pub mod orchestrator;
pub mod sender;
