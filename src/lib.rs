//! Spectre: a Kubernetes observability server unifying a timeline/event
//! store, a relationship graph, and external log/metrics integrations
//! behind one HTTP surface serving both REST and MCP.
//!
//! This crate is the core described in the design: the integration
//! plugin runtime (config store, secret resolver, factory registry,
//! lifecycle manager), the backpressure-aware ingestion pipeline, the
//! shared service layer, and the structured query builder. The REST
//! router, the MCP dispatcher, and the CLI entry point are the thin
//! transport adapters over it.

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod health;
pub mod integrations;
pub mod query;
pub mod record;
pub mod registry;
pub mod secrets;
pub mod services;

pub use app::{App, AppError};
