use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single curated idea as stored in `ideas.json`
///
/// Only the fields the site reads are typed. Anything else an editor puts in
/// the file (images, quotes, reading lists) is carried in `extra` and reaches
/// the templates unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Idea {
    /// Unique key used in `/idea/{id}` URLs
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub subtitle: String,

    /// Short body summary shown on cards and searched with weight 1
    #[serde(default)]
    pub essence: String,

    /// Themes the idea belongs to
    #[serde(default)]
    pub category: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Engagement counters, present only when they are kept in the content file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Idea {
    pub fn new(id: &str, title: &str) -> Self {
        Idea {
            id: id.to_string(),
            title: title.to_string(),
            subtitle: String::new(),
            essence: String::new(),
            category: Vec::new(),
            tags: Vec::new(),
            views: None,
            likes: None,
            shares: None,
            extra: Map::new(),
        }
    }

    pub fn in_theme(&self, theme: &str) -> bool {
        self.category.iter().any(|c| c == theme)
    }
}

/// An entry of the "learn AI" section
///
/// The listing file and the per-slug detail files share this shape; detail
/// files usually carry many more fields, which stay in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiHack {
    #[serde(default)]
    pub slug: String,

    #[serde(default)]
    pub title: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
