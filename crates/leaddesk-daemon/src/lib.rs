//! LeadDesk daemon library
//!
//! This module provides the core components for the LeadDesk service:
//! - REST API handlers for leads, pipeline, quotes and reporting
//! - Public quote acceptance with per-client rate limiting
//! - Notification dispatch for accepted quotes
//! - Server lifecycle management

#![deny(unsafe_code)]
#![deny(unused_imports)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod notify;
pub mod rate_limit;
pub mod server;
pub mod service;
pub mod validation;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
