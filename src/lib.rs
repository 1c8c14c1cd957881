//! # Docdex
//!
//! A storage and retrieval engine for indexed documentation.
//!
//! Docdex persists scraped documentation sources and their chunks in SQLite,
//! keeps an FTS5 full-text index in lockstep with the chunk rows, and layers
//! a pluggable vector backend on top for similarity search. Content that the
//! validation pipeline flags is held in quarantine until a reviewer clears
//! or blocks it.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌────────────────┐
//! │  Ingestion │──▶│ ContentStore  │──▶│ SQLite + FTS5  │
//! │ (external) │   │ + Quarantine  │   └────────┬───────┘
//! └────────────┘   └───────┬───────┘            │
//!                          │                    ▼
//!                  ┌───────▼────────┐   ┌────────────────┐
//!                  │ SearchService  │◀──│ BackendRegistry│
//!                  └────────────────┘   │ remote/embedded│
//!                                       │ /disabled      │
//!                                       └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use docdex::config;
//! use docdex::search::{SearchOptions, SearchService};
//! use docdex::store::ContentStore;
//! use docdex::vector::registry::BackendRegistry;
//!
//! # async fn run() -> docdex::error::Result<()> {
//! let config = config::load_config(std::path::Path::new("docdex.toml"))?;
//! let store = Arc::new(ContentStore::open(&config.db.path).await?);
//! let registry = Arc::new(BackendRegistry::from_config(&config)?);
//! registry.detect().await;
//!
//! let search = SearchService::new(store, registry, config.retrieval.clone());
//! let hits = search
//!     .search("bearer token", &SearchOptions { with_snippets: true, ..Default::default() })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | SQLite content store and FTS index |
//! | [`search`] | Ranked full-text and similarity search |
//! | [`vector`] | Vector backend contract, implementations, registry |
//! | [`quarantine`] | Review workflow and security alerts |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod quarantine;
pub mod search;
pub mod store;
pub mod vector;
