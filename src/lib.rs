//! Library exports for the QR-gated classifieds service
//!
//! This module exposes internal components for testing and potential library usage.

pub mod config;
pub mod coordinator;
pub mod database;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod middleware;
pub mod model;
pub mod registry;
pub mod resolve;
pub mod route;
