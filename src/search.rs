use std::collections::BTreeSet;

use crate::idea::Idea;

pub const TAG_WEIGHT: u32 = 3;
pub const CATEGORY_WEIGHT: u32 = 2;
pub const TITLE_WEIGHT: u32 = 2;
pub const SUBTITLE_WEIGHT: u32 = 1;
pub const ESSENCE_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredIdea {
    pub score: u32,
    pub idea: Idea,
}

/// Lowercase the problem and split it into a set of distinct words
pub fn tokenize(problem: &str) -> BTreeSet<String> {
    problem
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Keyword-overlap relevance of one idea
///
/// Tags and categories score once per entry that contains any query word;
/// title, subtitle and essence score once per query word they contain.
pub fn score_idea(idea: &Idea, words: &BTreeSet<String>) -> u32 {
    let contains_any = |field: &str| {
        let field = field.to_lowercase();
        words.iter().any(|w| field.contains(w.as_str()))
    };

    let mut score = 0;
    score += TAG_WEIGHT * idea.tags.iter().filter(|tag| contains_any(tag)).count() as u32;
    score += CATEGORY_WEIGHT
        * idea
            .category
            .iter()
            .filter(|cat| contains_any(cat))
            .count() as u32;

    let title = idea.title.to_lowercase();
    let subtitle = idea.subtitle.to_lowercase();
    let essence = idea.essence.to_lowercase();
    for w in words {
        if title.contains(w.as_str()) {
            score += TITLE_WEIGHT;
        }
        if subtitle.contains(w.as_str()) {
            score += SUBTITLE_WEIGHT;
        }
        if essence.contains(w.as_str()) {
            score += ESSENCE_WEIGHT;
        }
    }

    score
}

/// Rank ideas against a free-text problem
///
/// Ideas scoring zero are dropped. The sort is stable, so equal scores keep
/// the order in which ideas appear in the content file.
pub fn match_problem(ideas: &[Idea], problem: &str) -> Vec<ScoredIdea> {
    let words = tokenize(problem);
    if words.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredIdea> = ideas
        .iter()
        .filter_map(|idea| {
            let score = score_idea(idea, &words);
            (score > 0).then(|| ScoredIdea {
                score,
                idea: idea.clone(),
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored
}
