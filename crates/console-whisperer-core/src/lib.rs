//! # Console Whisperer Core
//!
//! Shared, I/O-free logic for Console Whisperer: error report models,
//! enrichment (message cleaning, stack parsing, classification),
//! fingerprinting, similarity matching, link ranking, and the key-value
//! cache store abstraction.
//!
//! This crate contains no tokio, HTTP clients, or other runtime-specific
//! dependencies. The application crate wires these pieces to the external
//! explanation provider and search sources.

pub mod enrich;
pub mod fingerprint;
pub mod models;
pub mod rank;
pub mod similarity;
pub mod store;
