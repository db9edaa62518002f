use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

pub const SUBSCRIBERS_FILE: &str = "subscribers.csv";
const HEADER: &str = "email,subscribed_at\n";

/// Result of a subscribe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Empty, without an `@`, or carrying characters that would break the CSV row
    Invalid,
    /// Address was already on the list; nothing was written
    AlreadySubscribed,
    /// Address was appended; the caller should send the welcome mail
    Subscribed(String),
}

/// Normalise an address the way it is stored: trimmed and lowercased
///
/// # Arguments
/// * `raw` - The address as typed into the form
///
/// # Returns
/// * `Some(email)` - The stored form of the address
/// * `None` - Empty, no `@`, or containing a comma, whitespace or a control
///   character, none of which may appear inside a CSV field
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return None;
    }
    if email
        .chars()
        .any(|c| c == ',' || c == '"' || c.is_whitespace() || c.is_control())
    {
        return None;
    }
    Some(email)
}

/// Append-only mailing list in `subscribers.csv`
pub struct SubscriberList {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SubscriberList {
    pub fn new(data_dir: &Path) -> Self {
        SubscriberList {
            path: data_dir.join(SUBSCRIBERS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the data directory and the CSV header when missing
    fn ensure_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            fs::write(&self.path, HEADER)?;
        }
        Ok(())
    }

    /// Every stored address, in subscription order
    pub fn emails(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(contents
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').next())
            .filter(|email| !email.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Add an address to the list unless it is already there
    ///
    /// # Arguments
    /// * `raw_email` - The address as submitted; it is normalised first
    ///
    /// # Returns
    /// * `SubscribeOutcome::Subscribed` - A new row was appended
    /// * `SubscribeOutcome::AlreadySubscribed` - Nothing was written
    /// * `SubscribeOutcome::Invalid` - The address was rejected by [`normalize_email`]
    ///
    /// # Errors
    /// * `AppError::Io` if the data directory or the CSV file cannot be created, read or appended to
    pub fn subscribe(&self, raw_email: &str) -> Result<SubscribeOutcome> {
        let Some(email) = normalize_email(raw_email) else {
            return Ok(SubscribeOutcome::Invalid);
        };

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_file()?;

        if self.emails()?.iter().any(|existing| *existing == email) {
            log::info!("Subscriber {} already on the list", email);
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let subscribed_at = Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f");
        writeln!(file, "{},{}", email, subscribed_at)?;

        log::info!("New subscriber {}", email);
        Ok(SubscribeOutcome::Subscribed(email))
    }
}
