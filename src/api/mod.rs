//! Web API module for vmrelay
//!
//! Provides the operational endpoints served next to the VNC proxy:
//! - Health checks
//! - Prometheus metrics

pub mod health;

pub use health::health_routes;
