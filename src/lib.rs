//! conteggio: batch rollup pipeline for categorized forum activity.
//!
//! Layered like a small service: `domain` holds the calendar, identity, and
//! tally invariants; `application` orchestrates a run and owns the adapter
//! traits; `infra` provides the Postgres and object-store adapters plus
//! telemetry; `config` resolves layered settings.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
