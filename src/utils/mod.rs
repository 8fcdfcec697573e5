//! Utils Module - Shared helpers: constants, caching, telemetry

pub mod cache;
pub mod constants;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use telemetry::*;
