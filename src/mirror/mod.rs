//! Copies a page and the assets it references into the staging tree

pub mod fetch;
pub mod plan;
pub mod render;

use crate::config::BundleConfig;
use crate::error::{BundleError, Result};
use crate::layout::StagingLayout;
use fetch::Fetcher;
use futures::stream::{self, StreamExt};
use plan::{Download, DownloadPlan, plan_page, plan_stylesheet};
use std::path::PathBuf;
use url::Url;

/// Summary of one mirroring pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorReport {
    /// Number of assets written to the staging tree
    pub assets: usize,
    /// URLs that could not be fetched
    pub failed: Vec<String>,
}

/// Produces a local copy of a page in the staging layout.
///
/// Implementations write the page to `layout.staged_html()` and each asset
/// into the folder for its kind.
#[allow(async_fn_in_trait)]
pub trait Mirror {
    async fn mirror(&self, page: &Url, layout: &StagingLayout) -> Result<MirrorReport>;
}

/// Mirror that fetches over `http(s)` or `file://`, optionally rendering through WebDriver
#[derive(Debug, Clone)]
pub struct SiteMirror {
    fetcher: Fetcher,
    webdriver_url: Option<String>,
    max_concurrency: usize,
}

impl SiteMirror {
    pub fn new(max_concurrency: usize) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new()?,
            webdriver_url: None,
            max_concurrency: max_concurrency.max(1),
        })
    }

    /// Capture the page from a WebDriver session instead of fetching it
    pub fn with_renderer(mut self, webdriver_url: impl Into<String>) -> Self {
        self.webdriver_url = Some(webdriver_url.into());
        self
    }

    pub fn from_config(config: &BundleConfig) -> Result<Self> {
        let mirror = Self::new(config.max_concurrency)?;
        Ok(if config.render_scripts {
            mirror.with_renderer(config.webdriver_url.clone())
        } else {
            mirror
        })
    }

    async fn page_source(&self, page: &Url) -> Result<String> {
        match &self.webdriver_url {
            Some(webdriver_url) => render::render_page(page, webdriver_url).await,
            None => self.fetcher.fetch_text(page).await,
        }
    }

    /// Fetch `downloads` concurrently; failures are logged and collected
    async fn fetch_all(
        &self,
        downloads: Vec<Download>,
        report: &mut MirrorReport,
    ) -> Vec<(Download, Vec<u8>)> {
        let results: Vec<_> = stream::iter(downloads)
            .map(|download| async move {
                let body = self.fetcher.fetch(&download.url).await;
                (download, body)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut fetched = Vec::with_capacity(results.len());
        for (download, body) in results {
            match body {
                Ok(body) => fetched.push((download, body)),
                Err(e) => {
                    ::log::warn!("Skipping {}: {}", download.url, e);
                    report.failed.push(download.url.to_string());
                }
            }
        }
        fetched
    }
}

async fn write_staged(layout: &StagingLayout, download: &Download, body: &[u8]) -> Result<()> {
    let path: PathBuf = layout.staging_root().join(download.relative_path());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(BundleError::io("create", parent))?;
    }
    tokio::fs::write(&path, body)
        .await
        .map_err(BundleError::io("write", &path))
}

impl Mirror for SiteMirror {
    async fn mirror(&self, page: &Url, layout: &StagingLayout) -> Result<MirrorReport> {
        let source = self.page_source(page).await?;

        let staging_token = layout.staging_token();
        let plan = plan_page(&source, page, &staging_token)?;
        let mut downloads: DownloadPlan = plan.downloads;

        let html_path = layout.staged_html();
        tokio::fs::write(&html_path, &plan.html)
            .await
            .map_err(BundleError::io("write", &html_path))?;

        let mut report = MirrorReport::default();
        let (stylesheets, mut others) = downloads.take_pending();

        // Stylesheets first: their url() references add to the download set
        for (download, body) in self.fetch_all(stylesheets, &mut report).await {
            let css = String::from_utf8_lossy(&body);
            let rewritten = plan_stylesheet(&css, &download.url, &mut downloads);
            write_staged(layout, &download, rewritten.as_bytes()).await?;
            report.assets += 1;
        }

        let (_, referenced) = downloads.take_pending();
        others.extend(referenced);
        for (download, body) in self.fetch_all(others, &mut report).await {
            write_staged(layout, &download, &body).await?;
            report.assets += 1;
        }

        report.failed.sort();
        ::log::debug!(
            "Mirrored {} assets, {} failed",
            report.assets,
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::AssetKind;
    use std::path::Path;

    async fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_mirror_local_site() {
        let dir = tempfile::tempdir().unwrap();
        let site = dir.path().join("site");
        write(
            &site,
            "index.html",
            r#"<html><head>
                <link rel="stylesheet" href="styles/main.css">
                <style>.hero{background:url(images/bg.png)}</style>
                <script src="scripts/app.js"></script>
            </head><body><img src="images/pic.jpg"><img src="images/gone.png"></body></html>"#,
        )
        .await;
        write(
            &site,
            "styles/main.css",
            "body{background:url(../images/tile.gif)}@font-face{src:url(brand.woff)}",
        )
        .await;
        write(&site, "styles/brand.woff", "font").await;
        write(&site, "images/bg.png", "png").await;
        write(&site, "images/pic.jpg", "jpg").await;
        write(&site, "images/tile.gif", "gif").await;
        write(&site, "scripts/app.js", "js").await;

        let layout = StagingLayout::new(dir.path().join("tmp"), dir.path().join("out")).unwrap();
        layout.reset().await.unwrap();

        let page = Url::from_file_path(site.join("index.html")).unwrap();
        let report = SiteMirror::new(4)
            .unwrap()
            .mirror(&page, &layout)
            .await
            .unwrap();

        assert_eq!(report.assets, 6);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].ends_with("images/gone.png"));

        let html = tokio::fs::read_to_string(layout.staged_html()).await.unwrap();
        assert!(html.contains(r#"href="css/main.css""#));
        assert!(html.contains(r#"src="js/app.js""#));
        assert!(html.contains(r#"<img src="img/pic.jpg">"#));
        assert!(html.contains("url(tmp/img/bg.png)"));

        let css = tokio::fs::read_to_string(layout.staged(AssetKind::Stylesheet).join("main.css"))
            .await
            .unwrap();
        assert_eq!(
            css,
            "body{background:url(../img/tile.gif)}@font-face{src:url(../fonts/brand.woff)}"
        );

        for (kind, name) in [
            (AssetKind::Image, "bg.png"),
            (AssetKind::Image, "pic.jpg"),
            (AssetKind::Image, "tile.gif"),
            (AssetKind::Font, "brand.woff"),
            (AssetKind::Script, "app.js"),
        ] {
            assert!(layout.staged(kind).join(name).exists(), "{name} not staged");
        }
    }

    #[tokio::test]
    async fn test_missing_page_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StagingLayout::new(dir.path().join("tmp"), dir.path().join("out")).unwrap();
        layout.reset().await.unwrap();

        let page = Url::from_file_path(dir.path().join("nowhere.html")).unwrap();
        let result = SiteMirror::new(2).unwrap().mirror(&page, &layout).await;
        assert!(result.is_err());
    }
}
