use crate::assets::{copy_folder, copy_images, image_set};
use crate::config::BundleConfig;
use crate::css::{Minifier, reduce};
use crate::error::{BundleError, Result};
use crate::extract::extract;
use crate::filter::StylesheetFilter;
use crate::layout::{AssetKind, CSS_FILE, MINIFIED_FILE, StagingLayout};
use crate::mirror::Mirror;
use crate::stylesheets::aggregate;
use url::Url;

/// What a completed run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    /// Fragments written to the output page
    pub fragments: usize,
    /// Stylesheet sources in the cascade, the inline one included
    pub stylesheet_sources: usize,
    /// Rules in the minified stylesheet
    pub rules_before: usize,
    /// Rules left after reduction
    pub rules_after: usize,
    pub images_copied: Vec<String>,
    /// Images the bundle references that the mirror does not have
    pub images_skipped: Vec<String>,
    pub fonts_copied: usize,
    /// Assets the mirror could not fetch
    pub mirror_failures: Vec<String>,
}

/// Runs the stages in order; the first failure stops the run.
///
/// Nothing written before a failure is rolled back.
pub struct Pipeline<M: Mirror> {
    config: BundleConfig,
    mirror: M,
}

impl<M: Mirror> Pipeline<M> {
    pub fn new(config: BundleConfig, mirror: M) -> Self {
        Self { config, mirror }
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<BundleReport> {
        let config = &self.config;
        config.validate()?;

        let page = Url::parse(&config.url).map_err(|source| BundleError::InvalidUrl {
            url: config.url.clone(),
            source,
        })?;
        let selectors: Vec<String> = config
            .selectors
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let filter = StylesheetFilter::new(config.ignore.as_slice())?;
        let layout = StagingLayout::new(&config.staging_dir, &config.output_dir)?;

        layout.reset().await?;
        let mut report = BundleReport::default();

        ::log::info!("Cloning website...");
        let mirrored = self.mirror.mirror(&page, &layout).await?;
        report.mirror_failures = mirrored.failed;
        ::log::info!("Website cloned");

        filter
            .delete_ignored(&layout.staged(AssetKind::Stylesheet))
            .await?;

        let staged_html = layout.staged_html();
        let html = tokio::fs::read_to_string(&staged_html)
            .await
            .map_err(BundleError::io("read", &staged_html))?;

        ::log::info!("Extracting fragments...");
        let extraction = extract(&html, &selectors, &page, config.link_mode)?;
        report.fragments = extraction.fragments.len();

        report.fonts_copied = copy_folder(
            &layout.staged(AssetKind::Font),
            &layout.output(AssetKind::Font),
        )
        .await?;
        ::log::info!("Fonts copied");

        let sources = aggregate(
            &layout,
            &extraction.stylesheet_links,
            &extraction.inline_style,
        )
        .await?;
        report.stylesheet_sources = sources.len();

        let stylesheet_href = format!("{}/{}", AssetKind::Stylesheet.dir_name(), CSS_FILE);
        let bundle_html = extraction.bundle_html(&stylesheet_href);
        let output_html = layout.output_html();
        tokio::fs::write(&output_html, &bundle_html)
            .await
            .map_err(BundleError::io("write", &output_html))?;
        ::log::info!("HTML file created");

        ::log::info!("Minifying CSS...");
        let token = layout.staging_token();
        let minified = Minifier::new()
            .with_path_rewrite(&token, "../")
            .minify_sources(&sources);
        report.rules_before = minified.rule_count();
        let minified_path = layout.scratch().join(MINIFIED_FILE);
        tokio::fs::write(&minified_path, minified.to_string())
            .await
            .map_err(BundleError::io("write", &minified_path))?;

        ::log::info!("Removing unused CSS...");
        let reduced = reduce(&minified, &bundle_html);
        report.rules_after = reduced.rule_count();
        let reduced_css = reduced.to_string();
        let output_css = layout.output_css();
        tokio::fs::write(&output_css, &reduced_css)
            .await
            .map_err(BundleError::io("write", &output_css))?;
        ::log::info!(
            "CSS reduced from {} to {} rules",
            report.rules_before,
            report.rules_after
        );

        let images = image_set(&extraction.images, &reduced_css);
        let copied = copy_images(
            &images,
            &layout.staged(AssetKind::Image),
            &layout.output(AssetKind::Image),
        )
        .await?;
        report.images_copied = copied.copied;
        report.images_skipped = copied.missing;
        ::log::info!("{} images copied", report.images_copied.len());

        ::log::info!("Process complete!");
        Ok(report)
    }
}
