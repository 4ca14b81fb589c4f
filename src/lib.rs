pub mod assets;
pub mod config;
pub mod css;
pub mod error;
pub mod extract;
pub mod filter;
pub mod layout;
pub mod mirror;
pub mod pipeline;
pub mod stylesheets;
pub mod utils;


// Re-export commonly used types for convenience
pub use config::{BundleConfig, LinkMode};
pub use error::{BundleError, Result};
pub use mirror::{Mirror, MirrorReport, SiteMirror};
pub use pipeline::{BundleReport, Pipeline};

use std::path::{Path, PathBuf};

/// Main builder for a bundling run
#[derive(Debug, Clone)]
pub struct Bundler {
    config: BundleConfig,
}

impl Bundler {
    /// Create a builder for `url` keeping the fragments matched by `selectors`, in order
    pub fn new(url: &str, selectors: Vec<String>) -> Self {
        Self {
            config: BundleConfig::new(url, selectors),
        }
    }

    /// Start from an existing configuration
    pub fn with_config(mut self, config: BundleConfig) -> Self {
        let url = std::mem::take(&mut self.config.url);
        let selectors = std::mem::take(&mut self.config.selectors);
        self.config = config;

        // A configuration without page or selectors keeps the builder's
        if self.config.url.trim().is_empty() {
            self.config.url = url;
        }
        if self.config.selectors.is_empty() {
            self.config.selectors = selectors;
        }
        self
    }

    /// Load configuration from a JSON file
    pub fn with_config_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let config = BundleConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// Apply configuration from a JSON string
    pub fn with_config_str(self, json: &str) -> Result<Self> {
        let config = BundleConfig::from_json(json)?;
        Ok(self.with_config(config))
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.config.url = url.to_string();
        self
    }

    /// Fragments to keep, in output order
    pub fn with_selectors(mut self, selectors: Vec<String>) -> Self {
        self.config.selectors = selectors;
        self
    }

    /// Stylesheet name fragments to drop after mirroring
    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.config.ignore = ignore;
        self
    }

    /// Capture the page through WebDriver so client-side scripts run first
    pub fn with_render_scripts(mut self, render: bool) -> Self {
        self.config.render_scripts = render;
        self
    }

    pub fn with_webdriver_url(mut self, webdriver_url: impl Into<String>) -> Self {
        self.config.webdriver_url = webdriver_url.into();
        self
    }

    pub fn with_link_mode(mut self, link_mode: LinkMode) -> Self {
        self.config.link_mode = link_mode;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    /// Set the maximum number of concurrent asset downloads
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Mirror the page and write the bundle
    pub async fn run(self) -> Result<BundleReport> {
        let mut config = self.config;

        // Override the WebDriver URL with an environment variable if provided
        config.apply_env();
        config.validate()?;

        let mirror = SiteMirror::from_config(&config)?;
        Pipeline::new(config, mirror).run().await
    }
}
