//! Vessel monitoring client
//!
//! Polls a fleet backend for vessels and their history, keeps the dashboard
//! selection in sync and aggregates history into hourly chart buckets.

pub mod aggregator;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod polling;
pub mod session;
pub mod simulation;
