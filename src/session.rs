use std::sync::Arc;

use anyhow::Context as _;
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use url::Url;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const COOKIE_DOMAIN: &str = "weread.qq.com";

/// Splits a `name=value; name=value` header into pairs, skipping junk.
pub fn parse_cookie_string(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Loads cookies into a jar scoped to the catalog origin.
pub fn cookie_jar(raw: &str, origin: &Url) -> Jar {
    let jar = Jar::default();
    let pairs = parse_cookie_string(raw);
    if pairs.is_empty() {
        tracing::warn!(preview = %preview(raw), "cookie string parsed to nothing");
    } else {
        let names = pairs.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
        tracing::info!(count = pairs.len(), ?names, "loaded cookies");
    }
    for (name, value) in &pairs {
        jar.add_cookie_str(&format!("{name}={value}; Path=/"), origin);
    }
    jar
}

fn browser_headers(origin: &Url) -> anyhow::Result<HeaderMap> {
    let origin_str = origin.as_str().trim_end_matches('/');
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(
        REFERER,
        HeaderValue::from_str(&format!("{origin_str}/")).context("build referer header")?,
    );
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(origin_str).context("build origin header")?,
    );
    Ok(headers)
}

/// An HTTP client that replays the browser session against `origin`.
pub fn build_client(cookie: &str, origin: &Url) -> anyhow::Result<reqwest::blocking::Client> {
    let jar = Arc::new(cookie_jar(cookie, origin));
    reqwest::blocking::Client::builder()
        .default_headers(browser_headers(origin)?)
        .cookie_provider(jar)
        .build()
        .context("build WeRead http client")
}

/// Short, non-secret rendering of a cookie for logs.
pub fn preview(raw: &str) -> String {
    let head = raw.chars().take(12).collect::<String>();
    format!("{head}… ({} chars)", raw.chars().count())
}

#[derive(Debug, Deserialize)]
struct CookieCloudResponse {
    #[serde(default)]
    cookie_data: Option<std::collections::HashMap<String, Vec<CloudCookie>>>,
}

#[derive(Debug, Deserialize)]
struct CloudCookie {
    name: String,
    value: String,
}

/// Asks a CookieCloud server for the WeRead cookies of an account.
///
/// Returns `Ok(None)` when the server answers but holds nothing for the domain.
pub fn fetch_cloud_cookie(
    base_url: &str,
    id: &str,
    password: &str,
) -> anyhow::Result<Option<String>> {
    let endpoint = format!("{}/get/{id}", base_url.trim_end_matches('/'));
    let client = reqwest::blocking::Client::new();
    let response = client
        .post(&endpoint)
        .form(&[("password", password)])
        .send()
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        tracing::warn!(%status, "cookie cloud request failed");
        return Ok(None);
    }

    let body: CookieCloudResponse = response.json().context("parse cookie cloud response")?;
    let Some(cookies) = body
        .cookie_data
        .and_then(|mut domains| domains.remove(COOKIE_DOMAIN))
    else {
        return Ok(None);
    };
    if cookies.is_empty() {
        return Ok(None);
    }

    let joined = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");
    Ok(Some(joined))
}
