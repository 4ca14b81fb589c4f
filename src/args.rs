use clap::{Parser, ValueEnum};
use fragment_bundler::config::split_list;
use fragment_bundler::{Bundler, LinkMode, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fragment-bundler")]
#[command(about = "Extracts page fragments with only the CSS and images they use")]
#[command(version)]
pub struct Args {
    /// Page to bundle (http, https or file URL)
    pub url: Option<String>,

    /// Comma separated selectors of the fragments to keep, in output order
    #[arg(short, long)]
    pub selector: Option<String>,

    /// Comma separated stylesheet name fragments to drop (matches `*<name>.css`)
    #[arg(short, long)]
    pub ignore: Option<String>,

    /// Render the page through WebDriver so scripts run before mirroring
    #[arg(long)]
    pub render_scripts: bool,

    /// WebDriver server used with --render-scripts
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// How relative hyperlinks are made absolute
    #[arg(long, value_enum)]
    pub link_mode: Option<LinkModeArg>,

    /// Output folder (deleted and recreated on every run)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Staging folder for the mirrored page (deleted and recreated on every run)
    #[arg(long)]
    pub staging: Option<PathBuf>,

    /// Number of concurrent asset downloads
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// JSON configuration file; flags given on the command line take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LinkModeArg {
    Prefix,
    Resolve,
}

impl From<LinkModeArg> for LinkMode {
    fn from(arg: LinkModeArg) -> Self {
        match arg {
            LinkModeArg::Prefix => LinkMode::Prefix,
            LinkModeArg::Resolve => LinkMode::Resolve,
        }
    }
}

impl Args {
    /// Build the run from an optional config file overridden by explicit flags
    pub fn into_bundler(self) -> Result<Bundler> {
        let mut bundler = Bundler::new("", Vec::new());
        if let Some(path) = &self.config {
            bundler = bundler.with_config_file(path)?;
        }

        if let Some(url) = &self.url {
            bundler = bundler.with_url(url);
        }
        if let Some(selector) = &self.selector {
            bundler = bundler.with_selectors(split_list(selector));
        }
        if let Some(ignore) = &self.ignore {
            bundler = bundler.with_ignore(split_list(ignore));
        }
        if self.render_scripts {
            bundler = bundler.with_render_scripts(true);
        }
        if let Some(webdriver_url) = self.webdriver_url {
            bundler = bundler.with_webdriver_url(webdriver_url);
        }
        if let Some(link_mode) = self.link_mode {
            bundler = bundler.with_link_mode(link_mode.into());
        }
        if let Some(output) = self.output {
            bundler = bundler.with_output_dir(output);
        }
        if let Some(staging) = self.staging {
            bundler = bundler.with_staging_dir(staging);
        }
        if let Some(concurrency) = self.concurrency {
            bundler = bundler.with_max_concurrency(concurrency);
        }
        Ok(bundler)
    }
}
