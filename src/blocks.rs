use std::collections::{BTreeMap, HashMap};

use serde_json::{Value, json};

use crate::formats::{ChapterMap, Highlight, SummaryReview};

/// Notion rejects rich text longer than this in a single block.
pub const MAX_BLOCK_CHARS: usize = 2000;

pub const SUMMARY_HEADING: &str = "点评";

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    TableOfContents,
    Heading { level: i64, text: String },
    Callout {
        text: String,
        emoji: &'static str,
        color: &'static str,
    },
    Quote { text: String },
}

impl Block {
    pub fn callout(
        text: String,
        style: Option<i64>,
        color_style: Option<i64>,
        review_id: Option<&str>,
    ) -> Self {
        let emoji = if review_id.is_some() {
            "✍️"
        } else {
            match style {
                Some(0) => "💡",
                Some(1) => "⭐",
                _ => "〰️",
            }
        };
        let color = match color_style {
            Some(1) => "red",
            Some(2) => "purple",
            Some(3) => "blue",
            Some(4) => "green",
            Some(5) => "yellow",
            _ => "default",
        };
        Self::Callout { text, emoji, color }
    }

    /// Renders the block in the Notion block-object shape.
    pub fn to_notion(&self) -> Value {
        match self {
            Self::TableOfContents => json!({
                "type": "table_of_contents",
                "table_of_contents": { "color": "default" },
            }),
            Self::Heading { level, text } => {
                let kind = match level {
                    1 => "heading_1",
                    2 => "heading_2",
                    _ => "heading_3",
                };
                json!({
                    "type": kind,
                    kind: {
                        "rich_text": rich_text(text),
                        "color": "default",
                        "is_toggleable": false,
                    },
                })
            }
            Self::Callout { text, emoji, color } => json!({
                "type": "callout",
                "callout": {
                    "rich_text": rich_text(text),
                    "icon": { "emoji": emoji },
                    "color": color,
                },
            }),
            Self::Quote { text } => json!({
                "type": "quote",
                "quote": {
                    "rich_text": rich_text(text),
                    "color": "default",
                },
            }),
        }
    }
}

pub fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

/// Blocks for one record plus notes that must be nested under earlier blocks.
///
/// `children` maps the index of a block in `blocks` to the single block that
/// goes underneath it. Indices are fixed when the block is emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentTree {
    pub blocks: Vec<Block>,
    pub children: BTreeMap<usize, Block>,
}

impl ContentTree {
    fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    fn push_chunked(
        &mut self,
        text: &str,
        style: Option<i64>,
        color_style: Option<i64>,
        review_id: Option<&str>,
    ) {
        for chunk in chunk_text(text, MAX_BLOCK_CHARS) {
            self.push(Block::callout(chunk, style, color_style, review_id));
        }
    }

    fn push_highlight(&mut self, highlight: &Highlight) {
        self.push_chunked(
            &highlight.mark_text,
            highlight.style,
            highlight.color_style,
            highlight.review_id.as_deref(),
        );
        if let Some(note) = highlight.note.as_deref().filter(|n| !n.is_empty()) {
            let parent = self.blocks.len() - 1;
            self.children.insert(
                parent,
                Block::Quote {
                    text: note.to_owned(),
                },
            );
        }
    }
}

/// Splits text into consecutive pieces of at most `max_chars` characters.
///
/// Empty input yields a single empty piece so every highlight keeps a block.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let chars = text.chars().collect::<Vec<_>>();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(max_chars.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}

/// Builds the block tree for one book.
///
/// `highlights` must already be merged with inline reviews and sorted.
pub fn assemble(
    chapters: Option<&ChapterMap>,
    summaries: &[SummaryReview],
    highlights: &[Highlight],
) -> ContentTree {
    let mut tree = ContentTree::default();

    match chapters {
        Some(chapters) => {
            tree.push(Block::TableOfContents);
            for (chapter_uid, group) in group_by_chapter(highlights) {
                if let Some(chapter) = chapters.get(&chapter_uid) {
                    tree.push(Block::Heading {
                        level: chapter.level,
                        text: chapter.title.clone(),
                    });
                }
                for highlight in group {
                    tree.push_highlight(highlight);
                }
            }
        }
        None => {
            for highlight in highlights {
                tree.push_highlight(highlight);
            }
        }
    }

    if !summaries.is_empty() {
        tree.push(Block::Heading {
            level: 1,
            text: SUMMARY_HEADING.to_owned(),
        });
        for summary in summaries {
            tree.push_chunked(
                &summary.content,
                summary.style,
                summary.color_style,
                summary.review_id.as_deref(),
            );
        }
    }

    tree
}

fn group_by_chapter(highlights: &[Highlight]) -> Vec<(i64, Vec<&Highlight>)> {
    let mut groups: Vec<(i64, Vec<&Highlight>)> = Vec::new();
    let mut index_by_uid: HashMap<i64, usize> = HashMap::new();
    for highlight in highlights {
        let uid = highlight.chapter_key();
        let idx = *index_by_uid.entry(uid).or_insert_with(|| {
            groups.push((uid, Vec::new()));
            groups.len() - 1
        });
        groups[idx].1.push(highlight);
    }
    groups
}
