//! Demand forecast refresh service.
//!
//! Loads daily (category, region) sales history, walks each series forward
//! with a pre-trained predictor feeding predictions back in as lags, and
//! replaces the published forecast relation in a single transaction.

pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod ml;
pub mod repo;
pub mod telemetry;
