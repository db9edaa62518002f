use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use super::{CounterStore, Counts, VisitorFingerprint};
use crate::error::Result;

/// Counters in a two-table SQLite database, created on first open
pub struct SqliteCounters {
    conn: Mutex<Connection>,
}

impl SqliteCounters {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS idea_stats (
                idea_id TEXT PRIMARY KEY,
                views INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0,
                shares INTEGER NOT NULL DEFAULT 0
            );

            -- One row per page, visitor and day that was counted
            CREATE TABLE IF NOT EXISTS page_views (
                page TEXT NOT NULL,
                visitor TEXT NOT NULL,
                day TEXT NOT NULL,
                PRIMARY KEY (page, visitor, day)
            );
            "#,
        )?;

        Ok(SqliteCounters {
            conn: Mutex::new(conn),
        })
    }

    fn bump(&self, idea_id: &str, column: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        // `column` is one of the fixed names below, never user input
        let sql = format!(
            "INSERT INTO idea_stats (idea_id, {col}) VALUES (?1, 1)
             ON CONFLICT(idea_id) DO UPDATE SET {col} = {col} + 1
             RETURNING {col}",
            col = column
        );
        let total: i64 = conn.query_row(&sql, params![idea_id], |row| row.get(0))?;
        Ok(total as u64)
    }
}

impl CounterStore for SqliteCounters {
    fn record_view(&self, page: &str, visitor: &VisitorFingerprint, day: NaiveDate) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO page_views (page, visitor, day) VALUES (?1, ?2, ?3)",
            params![page, visitor.as_str(), day.format("%Y-%m-%d").to_string()],
        )?;

        if inserted == 1 {
            tx.execute(
                "INSERT INTO idea_stats (idea_id, views) VALUES (?1, 1)
                 ON CONFLICT(idea_id) DO UPDATE SET views = views + 1",
                params![page],
            )?;
        }

        tx.commit()?;
        Ok(inserted == 1)
    }

    fn record_like(&self, idea_id: &str) -> Result<u64> {
        self.bump(idea_id, "likes")
    }

    fn record_share(&self, idea_id: &str) -> Result<u64> {
        self.bump(idea_id, "shares")
    }

    fn counts(&self, idea_id: &str) -> Result<Counts> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let counts = conn
            .query_row(
                "SELECT views, likes, shares FROM idea_stats WHERE idea_id = ?1",
                params![idea_id],
                |row| {
                    Ok(Counts {
                        views: row.get::<_, i64>(0)? as u64,
                        likes: row.get::<_, i64>(1)? as u64,
                        shares: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .optional()?;

        Ok(counts.unwrap_or_default())
    }
}
