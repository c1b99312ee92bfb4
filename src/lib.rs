//! KISS Startpage - self-hosted startpage backend
//!
//! Serves the dashboard assets, persists the dashboard configuration and a
//! single admin account on disk, and proxies icon search/import from the
//! selfh.st catalog and the Iconify API.

pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod icons;
pub mod metrics;
pub mod persist;
pub mod session;
