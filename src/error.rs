use thiserror::Error;

/// Problems detected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no WeRead cookie found: set WEREAD_COOKIE or CC_URL/CC_ID/CC_PASSWORD")]
    MissingCookie,

    #[error("NOTION_TOKEN is not set")]
    MissingNotionToken,

    #[error("no Notion destination found: set NOTION_PAGE or NOTION_DATABASE_ID")]
    MissingDestination,

    #[error("could not find a Notion id in {0:?}")]
    InvalidDestination(String),
}

#[derive(Error, Debug)]
pub enum WereadError {
    /// A response carried a non-zero `errCode`.
    #[error("session expired (errCode {code}): {message}")]
    SessionExpired { code: i64, message: String },

    #[error("{endpoint} returned HTTP {status}")]
    Http { endpoint: String, status: u16 },

    #[error("{endpoint} returned a body that is not JSON")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Whether any error in the chain is a session failure.
pub fn is_session_expired(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<WereadError>(),
            Some(WereadError::SessionExpired { .. })
        )
    })
}

pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<ConfigError>())
}
