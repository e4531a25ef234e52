use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

pub const DATABASE_ID: &str = "0123456789abcdef0123456789abcdef";
pub const DATA_SOURCE_ID: &str = "ds-books";

#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    /// `(bookId, sort)` pairs returned by the notebook endpoint.
    pub books: Vec<(String, i64)>,
    /// Highest `Sort` already stored in Notion.
    pub watermark: Option<i64>,
    /// Books whose highlight endpoint answers with `errCode -2012`.
    pub expired_books: HashSet<String>,
    /// Existing Notion record ids per `bookId`.
    pub existing: HashMap<String, Vec<String>>,
    /// Books whose review endpoint answers HTTP 401 with `errCode -2012`.
    pub unauthorized_books: HashSet<String>,
    /// WeRead cookies held by the cookie cloud account; `None` stores only other domains.
    pub cloud_cookies: Option<Vec<(String, String)>>,
}

pub const CLOUD_ID: &str = "uuid-1";
pub const CLOUD_PASSWORD: &str = "pw";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
    pub cookie: Option<String>,
}

pub struct ServiceStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ServiceStub {
    pub fn spawn(config: StubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start service stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let mut next_id = 0_usize;
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let (path, query) = match url.split_once('?') {
                    Some((path, query)) => (path.to_owned(), query.to_owned()),
                    None => (url.clone(), String::new()),
                };
                let method = request.method().to_string();
                let cookie = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Cookie"))
                    .map(|h| h.value.as_str().to_owned());
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);

                recorder.lock().expect("lock requests").push(Recorded {
                    method: method.clone(),
                    path: path.clone(),
                    query: query.clone(),
                    body: body.clone(),
                    cookie,
                });

                let (status, payload) =
                    route(&config, &method, &path, &query, &body, &mut next_id);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(payload.to_string())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn weread_url(&self) -> String {
        format!("{}/weread", self.base_url)
    }

    pub fn notion_url(&self) -> String {
        format!("{}/notion/v1", self.base_url)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

impl Drop for ServiceStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

fn route(
    config: &StubConfig,
    method: &str,
    path: &str,
    query: &str,
    body: &str,
    next_id: &mut usize,
) -> (u16, Value) {
    let book_id = query_param(query, "bookId").unwrap_or_default();
    let mut fresh_id = |prefix: &str| {
        *next_id += 1;
        format!("{prefix}-{next_id}")
    };

    match (method, path) {
        ("GET", "/weread") | ("GET", "/weread/") => (200, json!({})),
        ("GET", "/weread/api/user/notebook") => {
            let books = config
                .books
                .iter()
                .map(|(id, sort)| {
                    json!({
                        "sort": sort,
                        "book": {
                            "bookId": id,
                            "title": format!("Book {id}"),
                            "author": "Stub Author",
                            "cover": format!("https://cdn.example/s_{id}.jpg"),
                            "categories": [{ "title": "Essays" }],
                        }
                    })
                })
                .collect::<Vec<_>>();
            (200, json!({ "books": books }))
        }
        ("GET", "/weread/web/book/bookmarklist") => {
            if config.expired_books.contains(book_id) {
                return (200, json!({ "errCode": -2012, "errMsg": "登录超时" }));
            }
            (
                200,
                json!({
                    "updated": [
                        { "chapterUid": 2, "range": "40-50", "markText": "second chapter", "style": 1, "colorStyle": 4 },
                        { "chapterUid": 1, "range": "10-20", "markText": "first chapter", "style": 0, "colorStyle": 1 }
                    ]
                }),
            )
        }
        ("GET", "/weread/web/book/readinfo") => (
            200,
            json!({
                "markedStatus": 4,
                "readingTime": 3725,
                "readingProgress": 100,
                "finishedDate": 1_700_000_000
            }),
        ),
        ("GET", "/weread/web/book/info") => (200, json!({ "isbn": "9780000000000", "newRating": 875 })),
        ("GET", "/weread/web/review/list") if config.unauthorized_books.contains(book_id) => {
            (401, json!({ "errCode": -2012, "errMsg": "登录超时" }))
        }
        ("GET", "/weread/web/review/list") => (
            200,
            json!({
                "reviews": [
                    { "review": { "reviewId": "sum-1", "content": "worth reading", "type": 4 } },
                    { "review": { "reviewId": "rev-1", "content": "my thought", "type": 1,
                                  "chapterUid": 1, "range": "15-16", "abstract": "quoted passage" } }
                ]
            }),
        ),
        ("POST", "/weread/web/book/chapterInfos") => (
            200,
            json!({
                "data": [{
                    "updated": [
                        { "chapterUid": 1, "level": 1, "title": "Opening" },
                        { "chapterUid": 2, "level": 2, "title": "Middle" }
                    ]
                }]
            }),
        ),
        ("GET", p) if p == format!("/notion/v1/databases/{DATABASE_ID}") => {
            (200, json!({ "data_sources": [{ "id": DATA_SOURCE_ID }] }))
        }
        ("POST", p) if p == format!("/notion/v1/data_sources/{DATA_SOURCE_ID}/query") => {
            let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
            let property = parsed
                .pointer("/filter/property")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if property == "Sort" {
                let results = match config.watermark {
                    Some(sort) => vec![json!({ "id": "page-max", "properties": { "Sort": { "number": sort } } })],
                    None => Vec::new(),
                };
                return (200, json!({ "results": results, "has_more": false }));
            }
            let wanted = parsed
                .pointer("/filter/rich_text/equals")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let results = config
                .existing
                .get(wanted)
                .map(|ids| ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>())
                .unwrap_or_default();
            (200, json!({ "results": results, "has_more": false, "next_cursor": null }))
        }
        ("POST", "/notion/v1/pages") => (200, json!({ "id": fresh_id("page") })),
        ("DELETE", p) if p.starts_with("/notion/v1/blocks/") => (200, json!({ "archived": true })),
        ("PATCH", p) if p.starts_with("/notion/v1/blocks/") && p.ends_with("/children") => {
            let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
            let count = parsed
                .get("children")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            let results = (0..count)
                .map(|_| json!({ "id": fresh_id("blk") }))
                .collect::<Vec<_>>();
            (200, json!({ "results": results }))
        }
        ("POST", p) if p == format!("/cookiecloud/get/{CLOUD_ID}") => {
            if body != format!("password={CLOUD_PASSWORD}") {
                return (403, json!({ "message": "wrong password" }));
            }
            let domains = match &config.cloud_cookies {
                Some(cookies) => {
                    let cookies = cookies
                        .iter()
                        .map(|(name, value)| json!({ "name": name, "value": value, "domain": ".weread.qq.com" }))
                        .collect::<Vec<_>>();
                    json!({ "weread.qq.com": cookies })
                }
                None => json!({ "example.com": [{ "name": "sid", "value": "x" }] }),
            };
            (200, json!({ "cookie_data": domains }))
        }
        _ => (404, json!({ "object": "error", "message": format!("no route for {method} {path}") })),
    }
}
