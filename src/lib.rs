/*!
# Big Picture Ideas

A small content site that serves one powerful idea at a time.

## Overview

Ideas are curated by hand in `data/ideas.json`. Visitors browse them by theme,
search them by describing a problem in their own words, subscribe to a mailing
list and leave lightweight engagement signals (views, likes, shares).

## Architecture

### Content Layer
- **catalog**: reads `ideas.json` and the "learn AI" files on every request
- Daily rotation: the featured idea is `ideas[day_of_year % len]`
- Latest ideas are the last three entries of the file, newest first

### Ranking
- **search**: keyword-overlap scorer. Tags weigh 3, categories and title words 2,
  subtitle and essence words 1. Ties keep file order.

### Engagement
- **engagement**: views are counted once per page, visitor and calendar day; the
  visitor is a SHA-256 fingerprint of client IP and user agent
- Likes and shares only ever increase
- Counters live either in the content file itself or in an auto-created SQLite
  database, selected with `COUNTER_BACKEND`

### Mailing List
- **subscribers**: append-only `subscribers.csv`, duplicate addresses are ignored
- **mailer**: best-effort welcome mail over SMTP, sent in the background

### Web Layer
- **app**: axum routes, handlebars templates and flash messages

## Modules

- **idea**: content record types
- **catalog**: content store and browsing helpers
- **search**: relevance scoring
- **engagement**: counter store trait and its two backends
- **subscribers**: mailing list persistence
- **config**: environment configuration
- **error**: application error type
- **mailer**: welcome mail delivery (web feature)
- **app**: routing and handlers (web feature)
*/

pub mod app;
pub mod catalog;
pub mod config;
pub mod engagement;
pub mod error;
pub mod idea;
pub mod mailer;
pub mod search;
pub mod subscribers;

pub use catalog::*;
pub use error::{AppError, Result};
pub use idea::*;
pub use search::*;
