//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Offer an async façade for callers running on an event loop.
//! - Keep UI layers decoupled from storage details.

pub mod async_store;
pub mod map_node_service;
