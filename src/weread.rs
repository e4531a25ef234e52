use std::collections::HashMap;

use anyhow::Context as _;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::WereadError;
use crate::formats::{
    BookMetadata, Chapter, ChapterMap, Highlight, LibraryEntry, ReadingProgress, ReadingStatus,
    Reviews, SummaryReview, sort_highlights,
};
use crate::retry::{RetryHook, RetryPolicy};
use crate::session;

pub const DEFAULT_BASE_URL: &str = "https://weread.qq.com";

const NOTEBOOKS_PATH: &str = "/api/user/notebook";
const BOOKMARKLIST_PATH: &str = "/web/book/bookmarklist";
const CHAPTER_INFO_PATH: &str = "/web/book/chapterInfos";
const READ_INFO_PATH: &str = "/web/book/readinfo";
const REVIEW_LIST_PATH: &str = "/web/review/list";
const BOOK_INFO_PATH: &str = "/web/book/info";

const REVIEW_TYPE_INLINE: i64 = 1;
const REVIEW_TYPE_SUMMARY: i64 = 4;

/// Read access to the reading platform.
pub trait Catalog {
    /// All library entries, ascending by sort key.
    fn list_library(&self) -> anyhow::Result<Vec<LibraryEntry>>;
    /// Highlights sorted by chapter and range start.
    fn highlights(&self, book_id: &str) -> anyhow::Result<Vec<Highlight>>;
    fn progress(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>>;
    fn metadata(&self, book_id: &str) -> anyhow::Result<BookMetadata>;
    fn reviews(&self, book_id: &str) -> anyhow::Result<Reviews>;
    fn chapters(&self, book_id: &str) -> anyhow::Result<Option<ChapterMap>>;
}

pub struct WereadClient {
    http: reqwest::blocking::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl WereadClient {
    pub fn new(base_url: &str, cookie: &str, retry: RetryPolicy) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("parse WeRead url: {base_url}"))?;
        let http = session::build_client(cookie, &base_url)?;
        tracing::debug!(base_url = %base_url, "created WeRead client");
        Ok(Self {
            http,
            base_url,
            retry,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        let joined = format!("{}{path}", self.base_url.as_str().trim_end_matches('/'));
        Url::parse(&joined).with_context(|| format!("build WeRead url: {joined}"))
    }

    /// Requests the service root so renewed session cookies land in the jar.
    pub fn touch(&self) -> anyhow::Result<reqwest::StatusCode> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .with_context(|| format!("GET {}", self.base_url))?;
        Ok(response.status())
    }

    fn touch_quietly(&self) {
        if let Err(err) = self.touch() {
            tracing::debug!(error = %format!("{err:#}"), "session touch failed");
        }
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder, path: &str) -> anyhow::Result<Value> {
        let response = request.send().with_context(|| format!("request {path}"))?;
        let status = response.status();
        let raw = response
            .text()
            .with_context(|| format!("read body of {path}"))?;
        if !status.is_success() {
            return Err(failed_status(path, status.as_u16(), &raw).into());
        }
        let value: Value = serde_json::from_str(&raw).map_err(|source| WereadError::Decode {
            endpoint: path.to_owned(),
            source,
        })?;
        check_err_code(&value)?;
        Ok(value)
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Value> {
        let url = self.url(path)?;
        tracing::debug!(%url, ?query, "GET");
        self.send(self.http.get(url).query(query), path)
    }

    fn post(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let url = self.url(path)?;
        tracing::debug!(%url, "POST");
        self.send(self.http.post(url).json(body), path)
    }

    fn with_retry<T>(&self, op: impl Fn() -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.retry.run(self, || {
            self.touch_quietly();
            op()
        })
    }

    fn fetch_library(&self) -> anyhow::Result<Vec<LibraryEntry>> {
        let value = self.get(NOTEBOOKS_PATH, &[])?;
        let Some(response) = decode_shape::<NotebookResponse>(value, NOTEBOOKS_PATH) else {
            anyhow::bail!("unexpected notebook response shape");
        };
        let mut entries = response
            .books
            .unwrap_or_default()
            .into_iter()
            .map(NotebookItem::into_entry)
            .collect::<Vec<_>>();
        if entries.is_empty() {
            tracing::warn!("library is empty");
        }
        entries.sort_by_key(|e| e.sort);
        Ok(entries)
    }

    fn fetch_highlights(&self, book_id: &str) -> anyhow::Result<Vec<Highlight>> {
        let value = no_data_on_http_error(self.get(BOOKMARKLIST_PATH, &[("bookId", book_id)]))?;
        let Some(response) = value.and_then(|v| decode_shape::<BookmarkResponse>(v, BOOKMARKLIST_PATH)) else {
            return Ok(Vec::new());
        };
        let mut highlights = response
            .updated
            .unwrap_or_default()
            .into_iter()
            .map(Highlight::from)
            .collect::<Vec<_>>();
        sort_highlights(&mut highlights);
        Ok(highlights)
    }

    fn fetch_progress(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>> {
        let query = [
            ("bookId", book_id),
            ("readingDetail", "1"),
            ("readingBookIndex", "1"),
            ("finishedDate", "1"),
        ];
        let value = no_data_on_http_error(self.get(READ_INFO_PATH, &query))?;
        Ok(value
            .and_then(|v| decode_shape::<ReadInfoResponse>(v, READ_INFO_PATH))
            .map(ReadInfoResponse::into_progress))
    }

    fn fetch_metadata(&self, book_id: &str) -> anyhow::Result<BookMetadata> {
        let value = no_data_on_http_error(self.get(BOOK_INFO_PATH, &[("bookId", book_id)]))?;
        let Some(info) = value.and_then(|v| decode_shape::<BookInfoResponse>(v, BOOK_INFO_PATH)) else {
            tracing::warn!(book_id, "book info unavailable");
            return Ok(BookMetadata::default());
        };
        Ok(BookMetadata {
            isbn: info.isbn.unwrap_or_default(),
            rating: info.new_rating.unwrap_or(0.0) / 1000.0,
        })
    }

    fn fetch_reviews(&self, book_id: &str) -> anyhow::Result<Reviews> {
        let query = [
            ("bookId", book_id),
            ("listType", "11"),
            ("mine", "1"),
            ("syncKey", "0"),
        ];
        let value = no_data_on_http_error(self.get(REVIEW_LIST_PATH, &query))?;
        let Some(response) = value.and_then(|v| decode_shape::<ReviewListResponse>(v, REVIEW_LIST_PATH)) else {
            return Ok(Reviews::default());
        };
        Ok(split_reviews(response.reviews.unwrap_or_default()))
    }

    fn fetch_chapters(&self, book_id: &str) -> anyhow::Result<Option<ChapterMap>> {
        let body = serde_json::json!({
            "bookIds": [book_id],
            "synckeys": [0],
            "teenmode": 0,
        });
        let value = no_data_on_http_error(self.post(CHAPTER_INFO_PATH, &body))?;
        Ok(value
            .and_then(|v| decode_shape::<ChapterInfoResponse>(v, CHAPTER_INFO_PATH))
            .and_then(ChapterInfoResponse::into_map))
    }
}

impl RetryHook for WereadClient {
    fn before_retry(&self, attempt: u32, err: &anyhow::Error) {
        tracing::debug!(attempt, error = %err, "refreshing WeRead session before retry");
        self.touch_quietly();
    }
}

impl Catalog for WereadClient {
    #[tracing::instrument(level = "debug", skip(self))]
    fn list_library(&self) -> anyhow::Result<Vec<LibraryEntry>> {
        self.with_retry(|| self.fetch_library())
            .context("list library")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn highlights(&self, book_id: &str) -> anyhow::Result<Vec<Highlight>> {
        self.with_retry(|| self.fetch_highlights(book_id))
            .context("get highlights")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn progress(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>> {
        self.with_retry(|| self.fetch_progress(book_id))
            .context("get reading progress")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn metadata(&self, book_id: &str) -> anyhow::Result<BookMetadata> {
        self.with_retry(|| self.fetch_metadata(book_id))
            .context("get book info")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn reviews(&self, book_id: &str) -> anyhow::Result<Reviews> {
        self.with_retry(|| self.fetch_reviews(book_id))
            .context("get reviews")
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn chapters(&self, book_id: &str) -> anyhow::Result<Option<ChapterMap>> {
        self.with_retry(|| self.fetch_chapters(book_id))
            .context("get chapter info")
    }
}

fn check_err_code(value: &Value) -> Result<(), WereadError> {
    let Some(code) = value.get("errCode") else {
        return Ok(());
    };
    let code = code.as_i64().unwrap_or(-1);
    if code == 0 {
        return Ok(());
    }
    let message = value
        .get("errMsg")
        .and_then(Value::as_str)
        .unwrap_or("登录超时")
        .to_owned();
    Err(WereadError::SessionExpired { code, message })
}

/// Classifies a non-2xx reply: an `errCode` in the body wins over the status.
fn failed_status(endpoint: &str, status: u16, raw: &str) -> WereadError {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| check_err_code(&value).err())
        .unwrap_or_else(|| WereadError::Http {
            endpoint: endpoint.to_owned(),
            status,
        })
}

fn no_data_on_http_error(result: anyhow::Result<Value>) -> anyhow::Result<Option<Value>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) => match err.downcast_ref::<WereadError>() {
            Some(WereadError::Http { endpoint, status }) => {
                tracing::warn!(%endpoint, status, "request failed; treating as no data");
                Ok(None)
            }
            _ => Err(err),
        },
    }
}

fn decode_shape<T: DeserializeOwned>(value: Value, endpoint: &str) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!(endpoint, error = %err, "unexpected response shape");
            None
        }
    }
}

fn split_reviews(items: Vec<ReviewItem>) -> Reviews {
    let mut reviews = Reviews::default();
    for item in items {
        let review = item.review;
        match review.kind {
            Some(REVIEW_TYPE_SUMMARY) => reviews.summaries.push(SummaryReview {
                review_id: review.review_id,
                content: review.content.unwrap_or_default(),
                style: review.style,
                color_style: review.color_style,
            }),
            Some(REVIEW_TYPE_INLINE) => reviews.inline.push(Highlight {
                chapter_uid: review.chapter_uid,
                range: review.range,
                mark_text: review.content.unwrap_or_default(),
                style: review.style,
                color_style: review.color_style,
                review_id: review.review_id,
                note: review.note,
            }),
            _ => {}
        }
    }
    reviews
}

#[derive(Debug, Deserialize)]
struct NotebookResponse {
    #[serde(default)]
    books: Option<Vec<NotebookItem>>,
}

#[derive(Debug, Deserialize)]
struct NotebookItem {
    sort: i64,
    book: NotebookBook,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookBook {
    book_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    cover: String,
    #[serde(default)]
    categories: Option<Vec<NotebookCategory>>,
}

#[derive(Debug, Deserialize)]
struct NotebookCategory {
    title: String,
}

impl NotebookItem {
    fn into_entry(self) -> LibraryEntry {
        let book = self.book;
        LibraryEntry {
            book_id: book.book_id,
            title: book.title,
            author: book.author,
            cover: book.cover.replace("/s_", "/t7_"),
            categories: book
                .categories
                .map(|cats| cats.into_iter().map(|c| c.title).collect()),
            sort: self.sort,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BookmarkResponse {
    #[serde(default)]
    updated: Option<Vec<Bookmark>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bookmark {
    #[serde(default)]
    chapter_uid: Option<i64>,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    mark_text: String,
    #[serde(default)]
    style: Option<i64>,
    #[serde(default)]
    color_style: Option<i64>,
    #[serde(default)]
    review_id: Option<String>,
    #[serde(default, rename = "abstract")]
    note: Option<String>,
}

impl From<Bookmark> for Highlight {
    fn from(b: Bookmark) -> Self {
        Self {
            chapter_uid: b.chapter_uid,
            range: b.range,
            mark_text: b.mark_text,
            style: b.style,
            color_style: b.color_style,
            review_id: b.review_id,
            note: b.note,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadInfoResponse {
    #[serde(default)]
    marked_status: i64,
    #[serde(default)]
    reading_time: i64,
    #[serde(default)]
    reading_progress: i64,
    #[serde(default)]
    finished_date: Option<i64>,
}

impl ReadInfoResponse {
    fn into_progress(self) -> ReadingProgress {
        ReadingProgress {
            status: ReadingStatus::from_marked_status(self.marked_status),
            reading_seconds: self.reading_time,
            percent: self.reading_progress,
            finished_at: self.finished_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookInfoResponse {
    #[serde(default)]
    isbn: Option<String>,
    #[serde(default)]
    new_rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ReviewListResponse {
    #[serde(default)]
    reviews: Option<Vec<ReviewItem>>,
}

#[derive(Debug, Deserialize)]
struct ReviewItem {
    review: Review,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Review {
    #[serde(default)]
    review_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<i64>,
    #[serde(default)]
    chapter_uid: Option<i64>,
    #[serde(default)]
    range: Option<String>,
    #[serde(default, rename = "abstract")]
    note: Option<String>,
    #[serde(default)]
    style: Option<i64>,
    #[serde(default)]
    color_style: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChapterInfoResponse {
    #[serde(default)]
    data: Vec<ChapterInfoBook>,
}

#[derive(Debug, Deserialize)]
struct ChapterInfoBook {
    #[serde(default)]
    updated: Option<Vec<ChapterInfo>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterInfo {
    chapter_uid: i64,
    #[serde(default)]
    level: i64,
    #[serde(default)]
    title: String,
}

impl ChapterInfoResponse {
    fn into_map(self) -> Option<ChapterMap> {
        let [book] = <[ChapterInfoBook; 1]>::try_from(self.data).ok()?;
        let chapters = book.updated?;
        let map: HashMap<i64, Chapter> = chapters
            .into_iter()
            .map(|c| {
                (
                    c.chapter_uid,
                    Chapter {
                        chapter_uid: c.chapter_uid,
                        level: c.level,
                        title: c.title,
                    },
                )
            })
            .collect();
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn err_code_zero_or_absent_is_fine() {
        assert!(check_err_code(&json!({"books": []})).is_ok());
        assert!(check_err_code(&json!({"errCode": 0})).is_ok());
    }

    #[test]
    fn non_zero_err_code_is_session_expiry() {
        let err = check_err_code(&json!({"errCode": -2012, "errMsg": "登录超时"})).unwrap_err();
        match err {
            WereadError::SessionExpired { code, message } => {
                assert_eq!(code, -2012);
                assert_eq!(message, "登录超时");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn http_errors_become_no_data() {
        let result = no_data_on_http_error(Err(WereadError::Http {
            endpoint: BOOK_INFO_PATH.to_owned(),
            status: 500,
        }
        .into()));
        assert!(result.unwrap().is_none());

        let result = no_data_on_http_error(Err(anyhow::anyhow!("connection reset")));
        assert!(result.is_err());
    }

    #[test]
    fn err_code_in_failed_reply_is_session_expiry() {
        let err = failed_status(
            REVIEW_LIST_PATH,
            401,
            r#"{"errCode":-2012,"errMsg":"登录超时"}"#,
        );
        assert!(matches!(err, WereadError::SessionExpired { code: -2012, .. }));

        let result = no_data_on_http_error(Err(err.into()));
        let err = result.unwrap_err();
        assert!(crate::error::is_session_expired(&err));
    }

    #[test]
    fn failed_reply_without_err_code_is_http_error() {
        for raw in ["<html>bad gateway</html>", "{}", r#"{"errCode":0}"#] {
            match failed_status(BOOK_INFO_PATH, 502, raw) {
                WereadError::Http { endpoint, status } => {
                    assert_eq!(endpoint, BOOK_INFO_PATH);
                    assert_eq!(status, 502);
                }
                other => panic!("unexpected error for {raw}: {other}"),
            }
        }
    }

    #[test]
    fn reviews_split_by_type_and_reshape_inline_ones() {
        let response: ReviewListResponse = serde_json::from_value(json!({
            "reviews": [
                {"review": {"reviewId": "s1", "content": "summary", "type": 4}},
                {"review": {"reviewId": "i1", "content": "thought", "type": 1,
                            "chapterUid": 12, "range": "30-40", "abstract": "quoted"}},
                {"review": {"reviewId": "x", "content": "other", "type": 7}}
            ]
        }))
        .unwrap();

        let reviews = split_reviews(response.reviews.unwrap());
        assert_eq!(reviews.summaries.len(), 1);
        assert_eq!(reviews.summaries[0].content, "summary");
        assert_eq!(reviews.inline.len(), 1);
        let inline = &reviews.inline[0];
        assert_eq!(inline.mark_text, "thought");
        assert_eq!(inline.review_id.as_deref(), Some("i1"));
        assert_eq!(inline.note.as_deref(), Some("quoted"));
        assert_eq!(inline.sort_key(), (12, 30));
    }

    #[test]
    fn notebook_items_become_entries_with_large_covers() {
        let response: NotebookResponse = serde_json::from_value(json!({
            "books": [{
                "sort": 17,
                "book": {
                    "bookId": "695233",
                    "title": "T",
                    "author": "A",
                    "cover": "https://cdn/s_cover.jpg",
                    "categories": [{"title": "Fiction"}]
                }
            }]
        }))
        .unwrap();
        let entry = response.books.unwrap().remove(0).into_entry();
        assert_eq!(entry.cover, "https://cdn/t7_cover.jpg");
        assert_eq!(entry.categories, Some(vec!["Fiction".to_owned()]));
        assert_eq!(entry.sort, 17);
    }

    #[test]
    fn chapter_map_requires_exactly_one_book() {
        let one: ChapterInfoResponse = serde_json::from_value(json!({
            "data": [{"updated": [{"chapterUid": 3, "level": 2, "title": "Three"}]}]
        }))
        .unwrap();
        let map = one.into_map().unwrap();
        assert_eq!(map[&3].title, "Three");
        assert_eq!(map[&3].level, 2);

        let two: ChapterInfoResponse =
            serde_json::from_value(json!({"data": [{"updated": []}, {"updated": []}]})).unwrap();
        assert!(two.into_map().is_none());

        let missing: ChapterInfoResponse = serde_json::from_value(json!({"data": [{}]})).unwrap();
        assert!(missing.into_map().is_none());
    }
}
