//! HTTP adapter for the filemorph conversion engine.

pub mod api;
pub mod metrics;
pub mod state;
