use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Chapter key used for highlights that carry no `chapterUid`.
pub const ROOT_CHAPTER_UID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub cover: String,
    pub categories: Option<Vec<String>>,
    pub sort: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingStatus {
    Reading,
    Finished,
}

impl ReadingStatus {
    pub fn from_marked_status(code: i64) -> Self {
        if code == 4 {
            Self::Finished
        } else {
            Self::Reading
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Reading => "在读",
            Self::Finished => "读完",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub status: ReadingStatus,
    pub reading_seconds: i64,
    pub percent: i64,
    pub finished_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub isbn: String,
    pub rating: f64,
}

impl Default for BookMetadata {
    fn default() -> Self {
        Self {
            isbn: String::new(),
            rating: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_uid: i64,
    pub level: i64,
    pub title: String,
}

pub type ChapterMap = HashMap<i64, Chapter>;

/// A highlight, or an inline review reshaped to look like one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub chapter_uid: Option<i64>,
    pub range: Option<String>,
    pub mark_text: String,
    pub style: Option<i64>,
    pub color_style: Option<i64>,
    pub review_id: Option<String>,
    #[serde(rename = "abstract")]
    pub note: Option<String>,
}

impl Highlight {
    pub fn chapter_key(&self) -> i64 {
        self.chapter_uid.unwrap_or(ROOT_CHAPTER_UID)
    }

    /// Start offset from a `start-end` range; blank or unparseable ranges are 0.
    pub fn range_start(&self) -> i64 {
        self.range
            .as_deref()
            .and_then(|range| range.split('-').next())
            .and_then(|start| start.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn sort_key(&self) -> (i64, i64) {
        (self.chapter_key(), self.range_start())
    }
}

/// Book-level review, rendered after all highlights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryReview {
    pub review_id: Option<String>,
    pub content: String,
    pub style: Option<i64>,
    pub color_style: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reviews {
    pub summaries: Vec<SummaryReview>,
    pub inline: Vec<Highlight>,
}

/// Sorts highlights by chapter then range start, keeping input order on ties.
pub fn sort_highlights(highlights: &mut [Highlight]) {
    highlights.sort_by_key(Highlight::sort_key);
}

/// Appends inline reviews to the highlights and sorts the combined stream.
pub fn merge_highlights(mut highlights: Vec<Highlight>, inline: Vec<Highlight>) -> Vec<Highlight> {
    highlights.extend(inline);
    sort_highlights(&mut highlights);
    highlights
}
