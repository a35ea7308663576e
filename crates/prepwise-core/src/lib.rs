//! Core types, config, errors, and document storage for Prepwise.

pub mod config;
pub mod cover;
pub mod error;
pub mod firestore;
pub mod store;
pub mod types;
