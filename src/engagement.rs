//! Engagement signals: deduplicated page views, likes and shares
//!
//! Two interchangeable backends implement [`CounterStore`]:
//! - [`ContentFileCounters`] writes the counters straight into `ideas.json`
//! - [`SqliteCounters`] keeps them in a small, auto-created SQLite database
//!
//! Likes and shares only ever go up. A view is counted at most once per
//! (page, visitor, calendar day).

mod content_file;
mod sqlite;

pub use content_file::{ContentFileCounters, VIEW_LOG_FILE};
pub use sqlite::SqliteCounters;

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, Result};

/// Snapshot of an idea's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub views: u64,
    pub likes: u64,
    pub shares: u64,
}

/// Anonymous identity of a visitor: SHA-256 of `ip|user_agent`, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitorFingerprint(String);

impl VisitorFingerprint {
    pub fn new(ip: &str, user_agent: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(b"|");
        hasher.update(user_agent.unwrap_or("").as_bytes());
        VisitorFingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Persistent engagement counters shared by all request handlers
pub trait CounterStore: Send + Sync {
    /// Count a view of `page` unless `visitor` already viewed it on `day`
    ///
    /// Returns `true` when the view was counted.
    fn record_view(&self, page: &str, visitor: &VisitorFingerprint, day: NaiveDate) -> Result<bool>;

    /// Add one like and return the new total
    fn record_like(&self, idea_id: &str) -> Result<u64>;

    /// Add one share and return the new total
    fn record_share(&self, idea_id: &str) -> Result<u64>;

    fn counts(&self, idea_id: &str) -> Result<Counts>;
}

/// Where engagement counters are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    /// Fields on each idea inside the content file
    ContentFile,
    /// Separate SQLite database
    Sqlite,
}

impl FromStr for CounterBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" | "file" | "content" => Ok(CounterBackend::ContentFile),
            "sqlite" | "db" => Ok(CounterBackend::Sqlite),
            other => Err(AppError::Config(format!(
                "unknown counter backend '{}', expected 'json' or 'sqlite'",
                other
            ))),
        }
    }
}

/// Open the configured backend
///
/// # Arguments
/// * `backend` - Which store keeps the counters
/// * `ideas_path` - Content file, used only by the content-file backend
/// * `db_path` - Database file, used only by the SQLite backend; created with its directory if missing
///
/// # Returns
/// * `Result<Arc<dyn CounterStore>>` - The store, shareable across handlers
///
/// # Errors
/// * `AppError::Io` if the database directory cannot be created
/// * `AppError::Database` if the database cannot be opened or its schema created
pub fn open_store(
    backend: CounterBackend,
    ideas_path: &Path,
    db_path: &Path,
) -> Result<Arc<dyn CounterStore>> {
    let store: Arc<dyn CounterStore> = match backend {
        CounterBackend::ContentFile => Arc::new(ContentFileCounters::new(ideas_path)),
        CounterBackend::Sqlite => Arc::new(SqliteCounters::open(db_path)?),
    };
    log::info!("Engagement counters stored via {:?}", backend);
    Ok(store)
}
