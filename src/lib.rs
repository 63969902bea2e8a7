//! reclaim - extraction pipeline for historical slavery records.
//!
//! Turns a single source (census slave schedules, compensation petitions,
//! wills, estate inventories, archival PDFs and HTML pages) into person
//! records with per-row provenance and confidence.

// Model types use `from_str` methods that return Option<Self>,
// not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

#[cfg(feature = "browser")]
pub mod browser;
pub mod cli;
pub mod config;
pub mod emitter;
pub mod fetcher;
pub mod http_client;
pub mod job;
pub mod models;
pub mod narrative;
pub mod ocr;
pub mod parsing;
pub mod rate_limit;
pub mod repository;
pub mod rules;
pub mod schema;
