//! # Console Whisperer
//!
//! Backend for a browser extension that explains client-side JavaScript
//! errors in plain English and attaches ranked help links.
//!
//! Pure logic (models, enrichment, fingerprinting, similarity, ranking and
//! the cache store trait) lives in the `console-whisperer-core` crate. This
//! crate wires it to the outside world.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────────┐   ┌──────────────┐
//! │ Extension  │──▶│ Whisperer (single-flight)    │──▶│ ResponseCache │
//! │ POST /api  │   │ enrich → fingerprint → miss? │   │ KeyValueStore │
//! └────────────┘   └──────┬─────────────┬─────────┘   └──────────────┘
//!                         ▼             ▼
//!                  ┌────────────┐ ┌────────────────┐
//!                  │ Explainer  │ │ LinkAggregator │
//!                  │ (Gemini)   │ │ SO + GitHub    │
//!                  └────────────┘ └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! whisperer serve --config ./config/whisperer.toml
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Service-boundary error type |
//! | [`logging`] | Tracing subscriber setup |
//! | [`cache`] | Typed response cache over the key-value store |
//! | [`explain`] | Explanation providers |
//! | [`sources`] | StackOverflow and GitHub search sources |
//! | [`links`] | Link aggregation and manual link pool |
//! | [`singleflight`] | Deduplication of concurrent work |
//! | [`service`] | The submission pipeline and caller-facing operations |
//! | [`ratelimit`] | Token-bucket rate limiting |
//! | [`server`] | HTTP API |

pub mod cache;
pub mod config;
pub mod error;
pub mod explain;
pub mod links;
pub mod logging;
pub mod ratelimit;
pub mod server;
pub mod service;
pub mod singleflight;
pub mod sources;
