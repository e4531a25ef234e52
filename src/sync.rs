use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;

use crate::blocks::{self, Block, ContentTree};
use crate::book_id::reader_url;
use crate::error::is_session_expired;
use crate::formats::{LibraryEntry, merge_highlights};
use crate::notion::DocumentStore;
use crate::record::BookRecord;
use crate::weread::Catalog;

/// Notion accepts at most this many children per append call.
pub const MAX_BLOCKS_PER_APPEND: usize = 100;
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(300);
/// Consecutive session failures after which the run stops.
pub const SESSION_FAILURE_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub reader_base_url: String,
    pub throttle: Duration,
    pub batch_size: usize,
    pub session_failure_limit: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            reader_base_url: crate::weread::DEFAULT_BASE_URL.to_owned(),
            throttle: DEFAULT_THROTTLE,
            batch_size: MAX_BLOCKS_PER_APPEND,
            session_failure_limit: SESSION_FAILURE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub stats: SyncStats,
    /// Set when the run stopped early because the session kept failing.
    pub aborted: bool,
}

/// Entries newer than the watermark, ascending by sort key, and the skip count.
pub fn pending_entries(entries: &[LibraryEntry], watermark: i64) -> (Vec<&LibraryEntry>, usize) {
    let mut pending = entries
        .iter()
        .filter(|e| e.sort > watermark)
        .collect::<Vec<_>>();
    pending.sort_by_key(|e| e.sort);
    let skipped = entries.len() - pending.len();
    (pending, skipped)
}

pub struct Syncer<'a> {
    catalog: &'a dyn Catalog,
    store: &'a dyn DocumentStore,
    options: SyncOptions,
}

impl<'a> Syncer<'a> {
    pub fn new(catalog: &'a dyn Catalog, store: &'a dyn DocumentStore, options: SyncOptions) -> Self {
        Self {
            catalog,
            store,
            options,
        }
    }

    /// Runs one incremental pass.
    ///
    /// Failures of a single entry are counted and skipped. Errors returned
    /// here mean the run could not start.
    pub fn run(&self) -> anyhow::Result<SyncReport> {
        let watermark = self.store.watermark().context("read sync watermark")?;
        let entries = self.catalog.list_library().context("list library")?;
        let (pending, skipped) = pending_entries(&entries, watermark);
        tracing::info!(
            total = entries.len(),
            pending = pending.len(),
            watermark,
            "starting sync"
        );

        let mut report = SyncReport {
            stats: SyncStats {
                skipped,
                ..SyncStats::default()
            },
            aborted: false,
        };
        let mut session_failures = 0_u32;
        let total = pending.len();

        for (index, entry) in pending.into_iter().enumerate() {
            tracing::info!(
                progress = %format!("{}/{total}", index + 1),
                book_id = %entry.book_id,
                title = %entry.title,
                "syncing book"
            );
            match self.sync_entry(entry) {
                Ok(()) => {
                    report.stats.succeeded += 1;
                    session_failures = 0;
                }
                Err(err) => {
                    report.stats.failed += 1;
                    tracing::error!(book_id = %entry.book_id, error = %format!("{err:#}"), "book failed");
                    if !is_session_expired(&err) {
                        session_failures = 0;
                        continue;
                    }
                    session_failures += 1;
                    if session_failures == 1 {
                        tracing::warn!("WeRead session looks expired; update the cookie if this persists");
                    }
                    if session_failures >= self.options.session_failure_limit {
                        tracing::error!(
                            consecutive = session_failures,
                            "stopping: session failed repeatedly; refresh WEREAD_COOKIE or the cookie cloud account"
                        );
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        Ok(report)
    }

    fn sync_entry(&self, entry: &LibraryEntry) -> anyhow::Result<()> {
        let book_id = entry.book_id.as_str();
        self.remove_existing(book_id)?;

        let metadata = self.catalog.metadata(book_id)?;
        let progress = self.catalog.progress(book_id)?;
        let record = BookRecord {
            entry: entry.clone(),
            metadata,
            progress,
            reader_url: reader_url(&self.options.reader_base_url, book_id),
        };
        let record_id = self.store.create_record(&record)?;

        let chapters = self.catalog.chapters(book_id)?;
        let highlights = self.catalog.highlights(book_id)?;
        let reviews = self.catalog.reviews(book_id)?;
        let highlights = merge_highlights(highlights, reviews.inline);
        let tree = blocks::assemble(chapters.as_ref(), &reviews.summaries, &highlights);

        self.upload(&record_id, tree)
    }

    fn remove_existing(&self, book_id: &str) -> anyhow::Result<()> {
        let existing = self
            .store
            .find_records(book_id)
            .context("look up existing records")?;
        for record_id in existing {
            if let Err(err) = self.store.delete_record(&record_id) {
                tracing::warn!(%record_id, error = %format!("{err:#}"), "failed to delete stale record");
            }
        }
        Ok(())
    }

    fn upload(&self, record_id: &str, tree: ContentTree) -> anyhow::Result<()> {
        let ContentTree { blocks, children } = tree;
        let payload = blocks.iter().map(Block::to_notion).collect::<Vec<_>>();
        let Some(block_ids) = self.append_in_batches(record_id, &payload) else {
            if !children.is_empty() {
                tracing::warn!(record_id, notes = children.len(), "skipping notes: blocks were not fully attached");
            }
            return Ok(());
        };
        self.attach_children(&children, &block_ids)
    }

    /// Appends blocks in bounded batches.
    ///
    /// Returns `None` unless every block was attached.
    fn append_in_batches(&self, parent_id: &str, payload: &[Value]) -> Option<Vec<String>> {
        let mut ids = Vec::with_capacity(payload.len());
        for batch in payload.chunks(self.options.batch_size.max(1)) {
            self.pause();
            match self.store.append_blocks(parent_id, batch) {
                Ok(created) => ids.extend(created),
                Err(err) => {
                    tracing::warn!(parent_id, error = %format!("{err:#}"), "failed to append blocks");
                    return None;
                }
            }
        }
        if ids.len() != payload.len() {
            tracing::warn!(
                parent_id,
                requested = payload.len(),
                attached = ids.len(),
                "block count mismatch"
            );
            return None;
        }
        Some(ids)
    }

    fn attach_children(
        &self,
        children: &BTreeMap<usize, Block>,
        block_ids: &[String],
    ) -> anyhow::Result<()> {
        for (index, child) in children {
            let parent_id = block_ids
                .get(*index)
                .ok_or_else(|| anyhow::anyhow!("no block at index {index} for note"))?;
            self.pause();
            self.store
                .append_blocks(parent_id, &[child.to_notion()])
                .with_context(|| format!("attach note to block {index}"))?;
        }
        Ok(())
    }

    fn pause(&self) {
        if !self.options.throttle.is_zero() {
            std::thread::sleep(self.options.throttle);
        }
    }
}
