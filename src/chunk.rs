//! Text chunking. See [`insight_flow_core::chunk`].

pub use insight_flow_core::chunk::*;
