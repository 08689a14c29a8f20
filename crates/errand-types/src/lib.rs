//! Shared domain and wire types for the errand marketplace.
//!
//! Kept free of storage and HTTP concerns so that `errand-db`,
//! `errand-token` and `errand-api` can all depend on it.

pub mod api;
pub mod models;
pub mod pricing;
pub mod week;
