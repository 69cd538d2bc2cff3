//! Review analytics store: SQLite schema and repository.

pub mod repository;
pub mod schema;

pub use repository::{
    open_or_noop, NoopAnalyticsRepository, ReviewAnalytics, SqliteAnalyticsRepository,
};
