use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::idea::{AiHack, Idea};

pub const IDEAS_FILE: &str = "ideas.json";
pub const AI_HACKS_FILE: &str = "ai_hacks.json";
pub const AI_HACKS_DIR: &str = "ai_hacks";

/// Number of ideas shown in the "latest" strip of the home page
pub const LATEST_COUNT: usize = 3;

/// Read-only access to the content files in the data directory
///
/// Nothing is cached: every call goes back to disk, so editors can change
/// `ideas.json` while the site is running.
#[derive(Debug, Clone)]
pub struct Catalog {
    data_dir: PathBuf,
}

impl Catalog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Catalog {
            data_dir: data_dir.into(),
        }
    }

    pub fn ideas_path(&self) -> PathBuf {
        self.data_dir.join(IDEAS_FILE)
    }

    /// Load every idea in file order
    ///
    /// # Errors
    /// * `AppError::Io` if the file cannot be read
    /// * `AppError::Json` if it is not a JSON array of ideas
    pub fn load_ideas(&self) -> Result<Vec<Idea>> {
        read_ideas(&self.ideas_path())
    }

    pub fn get_idea_by_id(&self, idea_id: &str) -> Result<Option<Idea>> {
        Ok(self.load_ideas()?.into_iter().find(|idea| idea.id == idea_id))
    }

    /// Load the "learn AI" listing, or nothing if the site has none yet
    pub fn load_ai_hacks(&self) -> Result<Vec<AiHack>> {
        let path = self.data_dir.join(AI_HACKS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn get_ai_hack_by_slug(&self, slug: &str) -> Result<Option<AiHack>> {
        if !is_safe_slug(slug) {
            return Ok(None);
        }

        let path = self
            .data_dir
            .join(AI_HACKS_DIR)
            .join(format!("{}.json", slug));
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// The listing entry after `slug`, or `None` when there is nothing else to suggest
    pub fn next_ai_hack(&self, slug: &str) -> Result<Option<AiHack>> {
        let hacks = self.load_ai_hacks()?;
        if hacks.len() <= 1 {
            return Ok(None);
        }
        Ok(hacks
            .iter()
            .position(|hack| hack.slug == slug)
            .map(|idx| hacks[(idx + 1) % hacks.len()].clone()))
    }
}

pub fn read_ideas(path: &Path) -> Result<Vec<Idea>> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Featured idea for `today`: `ideas[day_of_year % len]`
///
/// `day_of_year` starts at 1 on the first of January, so the first idea is
/// featured on the day the cycle wraps rather than on New Year's Day.
pub fn todays_idea(ideas: &[Idea], today: NaiveDate) -> Option<&Idea> {
    if ideas.is_empty() {
        return None;
    }
    ideas.get(today.ordinal() as usize % ideas.len())
}

/// The last `count` ideas of the file, newest first
pub fn latest_ideas(ideas: &[Idea], count: usize) -> Vec<Idea> {
    let start = ideas.len().saturating_sub(count);
    ideas[start..].iter().rev().cloned().collect()
}

/// Sorted, de-duplicated list of all categories
pub fn themes(ideas: &[Idea]) -> Vec<String> {
    ideas
        .iter()
        .flat_map(|idea| idea.category.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn ideas_in_theme(ideas: &[Idea], theme: &str) -> Vec<Idea> {
    ideas
        .iter()
        .filter(|idea| idea.in_theme(theme))
        .cloned()
        .collect()
}

pub fn next_in(ideas: &[Idea], idea_id: &str) -> Option<Idea> {
    ideas
        .iter()
        .position(|idea| idea.id == idea_id)
        .map(|idx| ideas[(idx + 1) % ideas.len()].clone())
}

fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty() && !slug.contains("..") && !slug.contains('/') && !slug.contains('\\')
}
