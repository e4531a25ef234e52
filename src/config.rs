use std::path::Path;

use regex::Regex;

use crate::error::ConfigError;
use crate::session;

pub const DEFAULT_COOKIE_CLOUD_URL: &str = "https://cookiecloud.malinkang.com/";

const NOTION_ID_PATTERN: &str =
    r"[a-f0-9]{32}|[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}";

/// CookieCloud account used to fetch a fresh browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieCloud {
    pub url: String,
    pub id: String,
    pub password: String,
}

/// Raw settings as read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    pub weread_cookie: Option<String>,
    pub cc_url: Option<String>,
    pub cc_id: Option<String>,
    pub cc_password: Option<String>,
    pub notion_token: Option<String>,
    pub notion_page: Option<String>,
    pub notion_database_id: Option<String>,
}

impl Env {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            weread_cookie: var("WEREAD_COOKIE"),
            cc_url: var("CC_URL"),
            cc_id: var("CC_ID"),
            cc_password: var("CC_PASSWORD"),
            notion_token: var("NOTION_TOKEN"),
            notion_page: var("NOTION_PAGE"),
            notion_database_id: var("NOTION_DATABASE_ID"),
        }
    }

    pub fn cookie_cloud(&self) -> Option<CookieCloud> {
        let id = self.cc_id.clone()?;
        let password = self.cc_password.clone()?;
        let url = self
            .cc_url
            .clone()
            .unwrap_or_else(|| DEFAULT_COOKIE_CLOUD_URL.to_owned());
        Some(CookieCloud { url, id, password })
    }
}

/// Loads `.env.local` or `.env` from the working directory when present.
pub fn load_dotenv() -> anyhow::Result<()> {
    for name in [".env.local", ".env"] {
        if Path::new(name).exists() {
            dotenvy::from_filename(name)
                .map_err(|err| anyhow::anyhow!("load {name}: {err}"))?;
            tracing::debug!(file = name, "loaded environment file");
            break;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub weread_cookie: String,
    pub notion_token: String,
    pub database_id: String,
}

impl Config {
    /// Validates the environment and obtains the session cookie.
    ///
    /// CookieCloud wins when it is configured and answers; otherwise the static
    /// `WEREAD_COOKIE` is used.
    pub fn resolve(env: &Env) -> Result<Self, ConfigError> {
        let notion_token = env
            .notion_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "***")
            .ok_or(ConfigError::MissingNotionToken)?
            .to_owned();

        let destination = env
            .notion_page
            .as_deref()
            .or(env.notion_database_id.as_deref())
            .ok_or(ConfigError::MissingDestination)?;
        let database_id = extract_notion_id(destination)?;

        let mut cookie = env.weread_cookie.clone();
        if let Some(cloud) = env.cookie_cloud() {
            tracing::info!(url = %cloud.url, "fetching cookie from cookie cloud");
            match session::fetch_cloud_cookie(&cloud.url, &cloud.id, &cloud.password) {
                Ok(Some(fetched)) => {
                    tracing::info!("using cookie from cookie cloud");
                    cookie = Some(fetched);
                }
                Ok(None) => {
                    tracing::warn!("cookie cloud has no WeRead cookie; falling back to WEREAD_COOKIE");
                }
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "cookie cloud unavailable; falling back to WEREAD_COOKIE");
                }
            }
        }

        let weread_cookie = cookie
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::MissingCookie)?;
        tracing::info!(cookie = %session::preview(&weread_cookie), "resolved WeRead cookie");

        Ok(Self {
            weread_cookie,
            notion_token,
            database_id,
        })
    }
}

/// Pulls a Notion page or database id out of a URL or raw id.
pub fn extract_notion_id(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(NOTION_ID_PATTERN).expect("static notion id pattern");
    re.find(input)
        .map(|m| m.as_str().to_owned())
        .ok_or_else(|| ConfigError::InvalidDestination(input.to_owned()))
}
