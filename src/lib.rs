//! # IHR Rust Backend
//!
//! Data-access and presentation layer for an Internet-health monitoring
//! platform. The crate stores time-series measurements (inter-domain
//! dependency scores, link-delay and forwarding anomalies, network
//! disconnection events) together with a minimal account model, and
//! exposes them through a read-mostly query API via Axum.
//!
//! ## Features
//!
//! - **Storage schema**: typed records with foreign keys and indexes,
//!   persisted through a swappable repository (in-memory or PostgreSQL)
//! - **Representation mapping**: every stored entity maps to a flat wire
//!   record with related names denormalized alongside their ids
//! - **Accounts**: registration, credential storage, per-ASN monitoring
//!   subscriptions and pending email changes
//! - **HTTP API**: REST endpoints for the query and account surfaces
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`api`]: identifier newtypes and wire records for API responses
//! - [`models`]: domain entities and the invariants enforced before writes
//! - [`db`]: repository pattern, service layer, and persistence backends
//! - [`http`]: Axum-based HTTP server and request handlers

pub mod api;
pub mod db;
pub mod models;

#[cfg(feature = "http-server")]
pub mod http;
