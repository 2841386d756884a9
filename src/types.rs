//! Shared data types passed between the crawl pipeline and the dispatcher.
//!
//! The dispatcher treats these as read-only: it never mutates an `Article` or
//! `Source`, it only reads them to build outbound payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Webflow,
    NextJs,
    Remix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub feed_url: String,
    pub kind: SourceKind,
    pub active: bool,
}
