//! Shared RSS/Atom aggregation engine.
//!
//! Feeds are cataloged once per canonical URL and shared across readers.
//! A timer-driven [`Scheduler`] keeps them current: one recurring job per
//! active feed plus a periodic sweep for overdue ones, with at most one
//! ingestion cycle per feed in flight at any instant. Each cycle fetches,
//! parses, deduplicates by (feed, GUID), and commits new articles together
//! with the feed's refresh timestamp as one transaction. Readers layer
//! their own read/favorite state over the shared articles through the
//! status overlay; ingestion never touches it.
//!
//! This crate is a library boundary: an API layer drives [`Engine`] and
//! [`Scheduler`] directly, and no wire format is defined here.

pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;

pub use config::Config;
pub use engine::{
    BulkStatusOutcome, Engine, RefreshOutcome, MAX_FREQUENCY_HOURS, MIN_FREQUENCY_HOURS,
    REFRESH_FLOOR_SECS,
};
pub use error::EngineError;
pub use scheduler::{JobState, Scheduler};
