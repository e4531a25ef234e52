use chrono::DateTime;
use serde_json::{Value, json};

use crate::blocks::rich_text;
use crate::formats::{BookMetadata, LibraryEntry, ReadingProgress};

pub const PLACEHOLDER_COVER: &str = "https://www.notion.so/icons/book_gray.svg";
const DATE_TIME_ZONE: &str = "Asia/Shanghai";

/// Everything needed to create one database record.
#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    pub entry: LibraryEntry,
    pub metadata: BookMetadata,
    pub progress: Option<ReadingProgress>,
    pub reader_url: String,
}

impl BookRecord {
    pub fn cover(&self) -> &str {
        normalize_cover(&self.entry.cover)
    }

    pub fn properties(&self) -> Value {
        let entry = &self.entry;
        let mut properties = json!({
            "BookName": { "title": rich_text(&entry.title) },
            "BookId": { "rich_text": rich_text(&entry.book_id) },
            "ISBN": { "rich_text": rich_text(&self.metadata.isbn) },
            "URL": { "url": self.reader_url },
            "Author": { "rich_text": rich_text(&entry.author) },
            "Sort": { "number": entry.sort },
            "Rating": { "number": self.metadata.rating },
            "Cover": {
                "files": [{
                    "type": "external",
                    "name": "Cover",
                    "external": { "url": self.cover() },
                }],
            },
        });

        let Some(map) = properties.as_object_mut() else {
            return properties;
        };
        if let Some(categories) = &entry.categories {
            let options = categories
                .iter()
                .map(|name| json!({ "name": name }))
                .collect::<Vec<_>>();
            map.insert("Categories".to_owned(), json!({ "multi_select": options }));
        }
        if let Some(progress) = &self.progress {
            map.insert(
                "Status".to_owned(),
                json!({ "select": { "name": progress.status.label() } }),
            );
            map.insert(
                "ReadingTime".to_owned(),
                json!({ "rich_text": rich_text(&format_reading_time(progress.reading_seconds)) }),
            );
            map.insert(
                "Progress".to_owned(),
                json!({ "number": progress.percent }),
            );
            if let Some(date) = progress.finished_at.and_then(format_timestamp) {
                map.insert(
                    "Date".to_owned(),
                    json!({ "date": { "start": date, "time_zone": DATE_TIME_ZONE } }),
                );
            }
        }
        properties
    }

    /// The page icon and page cover share one external image.
    pub fn icon(&self) -> Value {
        json!({ "type": "external", "external": { "url": self.cover() } })
    }
}

/// Cover URLs without an http(s) scheme are replaced by a placeholder icon.
pub fn normalize_cover(cover: &str) -> &str {
    if cover.starts_with("http://") || cover.starts_with("https://") {
        cover
    } else {
        PLACEHOLDER_COVER
    }
}

/// Renders seconds as `{h}时{m}分`, dropping zero components.
pub fn format_reading_time(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}时"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}分"));
    }
    out
}

fn format_timestamp(secs: i64) -> Option<String> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
