//! Spendbook Backend Library
//!
//! Personal finance tracking API: authenticated users record income and
//! expense entries with optional receipt uploads. Every resource operation
//! is scoped to the identity resolved from the bearer token.

pub mod auth;
pub mod config;
pub mod middleware;
pub mod records;
pub mod uploads;
