use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

use super::{CounterStore, Counts, VisitorFingerprint};
use crate::error::{AppError, Result};

/// Visitors already counted today, stored next to the content file
pub const VIEW_LOG_FILE: &str = "view_log.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ViewLog {
    /// Calendar day the `seen` set belongs to, as `YYYY-MM-DD`
    day: String,
    seen: BTreeSet<String>,
}

/// Counters kept as `views`/`likes`/`shares` fields inside `ideas.json`
///
/// Every update rewrites the whole content file. Records are handled as raw
/// JSON objects, so only the touched counter changes and every other key keeps
/// its value and position. The rewrite goes through a temporary file in the
/// same directory and a rename, and a process-wide mutex serializes
/// read-modify-write cycles between handlers.
pub struct ContentFileCounters {
    ideas_path: PathBuf,
    view_log_path: PathBuf,
    lock: Mutex<()>,
}

impl ContentFileCounters {
    pub fn new(ideas_path: impl Into<PathBuf>) -> Self {
        let ideas_path = ideas_path.into();
        let view_log_path = ideas_path
            .parent()
            .map(|dir| dir.join(VIEW_LOG_FILE))
            .unwrap_or_else(|| PathBuf::from(VIEW_LOG_FILE));

        ContentFileCounters {
            ideas_path,
            view_log_path,
            lock: Mutex::new(()),
        }
    }

    fn read_content(&self) -> Result<Vec<Value>> {
        let contents = fs::read_to_string(&self.ideas_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Today's view log; a log from an earlier day is discarded
    fn load_view_log(&self, day: &str) -> Result<ViewLog> {
        if !self.view_log_path.is_file() {
            return Ok(ViewLog {
                day: day.to_string(),
                seen: BTreeSet::new(),
            });
        }

        let contents = fs::read_to_string(&self.view_log_path)?;
        let log: ViewLog = serde_json::from_str(&contents)?;
        if log.day != day {
            return Ok(ViewLog {
                day: day.to_string(),
                seen: BTreeSet::new(),
            });
        }
        Ok(log)
    }

    fn bump(&self, idea_id: &str, field: &str) -> Result<u64> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut ideas = self.read_content()?;
        let total = increment(find_mut(&mut ideas, idea_id)?, field);

        write_json_atomic(&self.ideas_path, &ideas)?;
        Ok(total)
    }
}

impl CounterStore for ContentFileCounters {
    fn record_view(&self, page: &str, visitor: &VisitorFingerprint, day: NaiveDate) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut ideas = self.read_content()?;
        let idea = find_mut(&mut ideas, page)?;

        let mut log = self.load_view_log(&day.format("%Y-%m-%d").to_string())?;
        if !log.seen.insert(format!("{}|{}", page, visitor.as_str())) {
            return Ok(false);
        }

        // Seen entry goes first: a failed counter write loses a view, never counts one twice
        write_json_atomic(&self.view_log_path, &log)?;
        increment(idea, "views");
        write_json_atomic(&self.ideas_path, &ideas)?;
        Ok(true)
    }

    fn record_like(&self, idea_id: &str) -> Result<u64> {
        self.bump(idea_id, "likes")
    }

    fn record_share(&self, idea_id: &str) -> Result<u64> {
        self.bump(idea_id, "shares")
    }

    fn counts(&self, idea_id: &str) -> Result<Counts> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut ideas = self.read_content()?;
        let idea = find_mut(&mut ideas, idea_id)?;
        let counter = |field: &str| idea.get(field).and_then(Value::as_u64).unwrap_or(0);

        Ok(Counts {
            views: counter("views"),
            likes: counter("likes"),
            shares: counter("shares"),
        })
    }
}

fn find_mut<'a>(ideas: &'a mut [Value], idea_id: &str) -> Result<&'a mut Map<String, Value>> {
    ideas
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|idea| idea.get("id").and_then(Value::as_str) == Some(idea_id))
        .ok_or_else(|| AppError::NotFound(format!("Idea '{}'", idea_id)))
}

/// Add one to a counter field, creating it at the end of the record when absent
fn increment(idea: &mut Map<String, Value>, field: &str) -> u64 {
    let total = idea.get(field).and_then(Value::as_u64).unwrap_or(0) + 1;
    idea.insert(field.to_string(), Value::from(total));
    total
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|e| AppError::Io(e.error))?;
    Ok(())
}
