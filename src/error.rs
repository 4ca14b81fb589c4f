use std::io;
use std::path::{Path, PathBuf};

/// Errors that abort a bundling run
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error("no fragment selectors given")]
    NoSelectors,

    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("selector `{0}` did not match any element")]
    SelectorNotFound(String),

    #[error("staging root {staging} and output root {output} must not overlap")]
    OverlappingRoots { staging: PathBuf, output: PathBuf },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid ignore pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, BundleError>;

impl BundleError {
    /// Build a closure that wraps an `io::Error` with the action and path involved
    pub fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> BundleError + use<> {
        let path = path.to_path_buf();
        move |source| BundleError::Io {
            action,
            path,
            source,
        }
    }
}
