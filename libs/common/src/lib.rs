//! Common library for the parcel delivery services
//!
//! This crate provides shared functionality used across the api and auth
//! services: database connectivity, the Redis cache, persistence errors,
//! identity types, server settings, and the generic list query builder.

pub mod cache;
pub mod database;
pub mod error;
pub mod identity;
pub mod query;
pub mod settings;
