use anyhow::Context as _;
use reqwest::Method;
use serde_json::{Value, json};

use crate::record::BookRecord;

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2025-09-03";

/// Write access to the database holding one record per book.
pub trait DocumentStore {
    /// Highest `Sort` value stored so far, or 0 for an empty database.
    fn watermark(&self) -> anyhow::Result<i64>;
    /// Ids of records whose `BookId` equals `book_id`.
    fn find_records(&self, book_id: &str) -> anyhow::Result<Vec<String>>;
    fn delete_record(&self, record_id: &str) -> anyhow::Result<()>;
    /// Creates a record and returns its id.
    fn create_record(&self, record: &BookRecord) -> anyhow::Result<String>;
    /// Appends blocks under `parent_id`, returning created ids in request order.
    fn append_blocks(&self, parent_id: &str, blocks: &[Value]) -> anyhow::Result<Vec<String>>;
}

pub struct NotionClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
    database_id: String,
    data_source_id: String,
}

impl NotionClient {
    /// Connects to a database and resolves the data source used for queries.
    pub fn connect(base_url: &str, token: &str, database_id: &str) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .context("build Notion http client")?;
        let mut client = Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            database_id: database_id.to_owned(),
            data_source_id: database_id.to_owned(),
        };
        client.data_source_id = client.resolve_data_source();
        tracing::info!(
            database_id = %client.database_id,
            data_source_id = %client.data_source_id,
            "connected to Notion"
        );
        Ok(client)
    }

    fn resolve_data_source(&self) -> String {
        match self.call(Method::GET, &format!("/databases/{}", self.database_id), None) {
            Ok(value) => value
                .pointer("/data_sources/0/id")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| self.database_id.clone()),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "could not resolve data source; using database id");
                self.database_id.clone()
            }
        }
    }

    fn call(&self, method: Method, path: &str, body: Option<&Value>) -> anyhow::Result<Value> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%method, %url, "Notion request");
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .with_context(|| format!("{method} {url}"))?;

        let status = response.status();
        let raw = response.text().context("read Notion response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            anyhow::bail!("Notion API error ({status}) on {method} {path}: {message}");
        }
        serde_json::from_str(&raw).context("parse Notion response")
    }

    fn query(&self, body: &Value) -> anyhow::Result<Value> {
        let path = format!("/data_sources/{}/query", self.data_source_id);
        self.call(Method::POST, &path, Some(body))
    }
}

impl DocumentStore for NotionClient {
    fn watermark(&self) -> anyhow::Result<i64> {
        let body = json!({
            "filter": { "property": "Sort", "number": { "is_not_empty": true } },
            "sorts": [{ "property": "Sort", "direction": "descending" }],
            "page_size": 1,
        });
        let value = self.query(&body).context("query sync watermark")?;
        Ok(value
            .pointer("/results/0/properties/Sort/number")
            .and_then(Value::as_f64)
            .map(|n| n as i64)
            .unwrap_or(0))
    }

    fn find_records(&self, book_id: &str) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": { "property": "BookId", "rich_text": { "equals": book_id } },
            });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }
            let value = self.query(&body).context("query existing records")?;
            ids.extend(result_ids(&value));

            let has_more = value.get("has_more").and_then(Value::as_bool) == Some(true);
            cursor = value
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_owned);
            if !has_more || cursor.is_none() {
                break;
            }
        }
        Ok(ids)
    }

    fn delete_record(&self, record_id: &str) -> anyhow::Result<()> {
        self.call(Method::DELETE, &format!("/blocks/{record_id}"), None)
            .with_context(|| format!("delete record {record_id}"))?;
        Ok(())
    }

    fn create_record(&self, record: &BookRecord) -> anyhow::Result<String> {
        let icon = record.icon();
        let body = json!({
            "parent": { "database_id": self.database_id, "type": "database_id" },
            "icon": icon,
            "cover": icon,
            "properties": record.properties(),
        });
        let value = self
            .call(Method::POST, "/pages", Some(&body))
            .context("create record")?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("created record has no id"))
    }

    fn append_blocks(&self, parent_id: &str, blocks: &[Value]) -> anyhow::Result<Vec<String>> {
        let body = json!({ "children": blocks });
        let value = self
            .call(
                Method::PATCH,
                &format!("/blocks/{parent_id}/children"),
                Some(&body),
            )
            .with_context(|| format!("append blocks to {parent_id}"))?;
        Ok(result_ids(&value))
    }
}

fn result_ids(value: &Value) -> Vec<String> {
    value
        .get("results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("message")?.as_str()?.to_owned();
    Some(message)
}
