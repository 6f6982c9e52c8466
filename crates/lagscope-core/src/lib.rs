//! Core building blocks for the lagscope performance-diagnostics engine:
//! domain value objects, the canonical JSON encoder, shared constants,
//! error types, and tracing setup.

pub mod canonical;
pub mod constants;
pub mod errors;
pub mod model;
pub mod tracing;
