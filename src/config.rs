use crate::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// How relative hyperlinks inside the page are made absolute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Prepend `scheme://host` to every `href` verbatim. Already-absolute
    /// links are prefixed too.
    Prefix,
    /// Resolve every `href` against the page URL, leaving absolute links intact
    #[default]
    Resolve,
}

/// Configuration for one bundling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Page to mirror (`http`, `https` or `file`)
    #[serde(default)]
    pub url: String,

    /// Ordered selectors of the fragments to keep
    #[serde(default)]
    pub selectors: Vec<String>,

    /// Stylesheet name fragments to drop after mirroring (`*<fragment>.css`)
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Capture the page through a WebDriver session so client-side scripts run first
    #[serde(default)]
    pub render_scripts: bool,

    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Hyperlink absolutisation strategy
    #[serde(default)]
    pub link_mode: LinkMode,

    /// Staging root, deleted at the start of every run
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Output root, deleted at the start of every run
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum number of concurrent asset downloads
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Default value for max_concurrency
fn default_max_concurrency() -> usize {
    8
}

impl BundleConfig {
    /// Create a new configuration with default values
    pub fn new(url: &str, selectors: Vec<String>) -> Self {
        Self {
            url: url.to_string(),
            selectors,
            ignore: Vec::new(),
            render_scripts: false,
            webdriver_url: default_webdriver_url(),
            link_mode: LinkMode::default(),
            staging_dir: default_staging_dir(),
            output_dir: default_output_dir(),
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(BundleError::io("open", path))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(BundleError::io("read", path))?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Apply the `WEBDRIVER_URL` environment override, if set
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }
    }

    /// Check the settings that cannot be defaulted
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(BundleError::Config("a page URL is required".to_string()));
        }
        if self.selectors.iter().all(|s| s.trim().is_empty()) {
            return Err(BundleError::NoSelectors);
        }
        if self.max_concurrency == 0 {
            return Err(BundleError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma separated command-line list, dropping empty entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config =
            BundleConfig::from_json(r##"{"url": "https://example.com/", "selectors": ["#a"]}"##)
                .unwrap();
        assert_eq!(config.selectors, vec!["#a"]);
        assert!(config.ignore.is_empty());
        assert!(!config.render_scripts);
        assert_eq!(config.link_mode, LinkMode::Resolve);
        assert_eq!(config.staging_dir, PathBuf::from("tmp"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn test_link_mode_names() {
        let config = BundleConfig::from_json(
            r#"{"url": "https://example.com/", "selectors": ["main"], "link_mode": "prefix"}"#,
        )
        .unwrap();
        assert_eq!(config.link_mode, LinkMode::Prefix);
    }

    #[test]
    fn test_validate() {
        let config = BundleConfig::new("https://example.com/", vec![" ".to_string()]);
        assert!(matches!(config.validate(), Err(BundleError::NoSelectors)));

        let config = BundleConfig::new("https://example.com/", vec!["#a".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("#a, .b ,,main"), vec!["#a", ".b", "main"]);
        assert!(split_list("").is_empty());
    }
}
