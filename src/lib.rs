//! # Asset Finder
//!
//! Extracts image and icon references from arbitrary uploaded JSON
//! documents, resolves their business context (tenant, environment,
//! project, site, geo, locale), and keeps a deduplicated, versioned,
//! searchable catalog of them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌─────────────────┐
//! │ Document │──▶│ Discover │──▶│ Resolve  │──▶│ Catalog +       │
//! │  (JSON)  │   │  nodes   │   │ + hashes │   │ Occurrences     │
//! └──────────┘   └──────────┘   └──────────┘   │ Region refs     │
//!                                              └───────┬─────────┘
//!                                     ┌────────────────┤
//!                                     ▼                ▼
//!                                ┌──────────┐    ┌──────────┐
//!                                │   CLI    │    │   HTTP   │
//!                                └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! asset-finder init
//! asset-finder ingest page.json --raw-data-id r1 --source-uri s1 --source-version 1
//! asset-finder search --geo JP
//! asset-finder serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Locale/geo/text canonicalization, region grouping |
//! | [`discover`] | Structural asset discovery |
//! | [`resolve`] | Candidate resolution and hashing |
//! | [`store`] | Catalog and occurrence persistence |
//! | [`regions`] | Region/locale reference tracking |
//! | [`ingest`] | Fail-open extraction entry point |
//! | [`options`], [`search`], [`get`], [`stats`] | Query operations |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and repair |

pub mod clock;
pub mod config;
pub mod db;
pub mod discover;
pub mod error;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod options;
pub mod regions;
pub mod resolve;
pub mod search;
pub mod server;
pub mod service;
pub mod stats;
pub mod store;
