//! GreenGrow - greenhouse telemetry alert engine and live-update fan-out
//!
//! This library exposes the core modules for testing and reuse.

pub mod alerts;
pub mod common;
pub mod config;
pub mod entity;
pub mod error;
pub mod live;
pub mod pipeline;
pub mod reading;
pub mod routes;
pub mod services;
