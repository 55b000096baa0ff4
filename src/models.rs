//! Core data models. See [`insight_flow_core::models`].

pub use insight_flow_core::models::*;
