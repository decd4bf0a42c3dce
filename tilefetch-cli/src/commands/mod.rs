//! CLI command implementations.
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`fetch`] - Fetch one resource and print or save it
//! - [`tile`] - Download one tile from a preset provider

pub mod common;
pub mod config;
pub mod fetch;
pub mod tile;
