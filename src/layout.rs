use crate::error::{BundleError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Name of the mirrored page inside the staging root and of the bundle page inside the output root
pub const HTML_FILE: &str = "index.html";
/// Name of the reduced stylesheet inside the output `css/` folder
pub const CSS_FILE: &str = "style.css";
/// Name of the minified intermediate stylesheet inside the scratch folder
pub const MINIFIED_FILE: &str = "minified.css";
/// Scratch name of the inline stylesheet, sorts after every `NN_` prefixed file
pub const INLINE_STYLE_FILE: &str = "zz_inline-style.css";

const SCRATCH_DIR: &str = "tmp_css";

/// Kinds of mirrored assets, each with its own subfolder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Image,
    Font,
    Script,
    Stylesheet,
}

/// Extension rules in precedence order; `svg` is claimed by images first
const CLASSIFICATION_RULES: &[(AssetKind, &[&str])] = &[
    (AssetKind::Image, &["jpg", "png", "gif", "tiff", "svg", "jpeg"]),
    (AssetKind::Font, &["eot", "ttf", "woff", "woff2", "svg"]),
    (AssetKind::Script, &["js"]),
    (AssetKind::Stylesheet, &["css"]),
];

impl AssetKind {
    /// Subfolder name used in both staging and output trees
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Image => "img",
            AssetKind::Font => "fonts",
            AssetKind::Script => "js",
            AssetKind::Stylesheet => "css",
        }
    }

    /// Classify a bare file name by its extension (case-insensitive)
    pub fn classify(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        let extension = extension.to_ascii_lowercase();
        CLASSIFICATION_RULES
            .iter()
            .find(|(_, extensions)| extensions.contains(&extension.as_str()))
            .map(|(kind, _)| *kind)
    }
}

/// Directory roles for one run. Every path used by the pipeline comes from here.
#[derive(Debug, Clone)]
pub struct StagingLayout {
    staging_root: PathBuf,
    output_root: PathBuf,
}

impl StagingLayout {
    /// Create a layout, rejecting roots that contain one another
    pub fn new(staging_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Result<Self> {
        let staging_root = staging_root.into();
        let output_root = output_root.into();

        if staging_root.starts_with(&output_root) || output_root.starts_with(&staging_root) {
            return Err(BundleError::OverlappingRoots {
                staging: staging_root,
                output: output_root,
            });
        }

        Ok(Self {
            staging_root,
            output_root,
        })
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Mirrored folder for an asset kind
    pub fn staged(&self, kind: AssetKind) -> PathBuf {
        self.staging_root.join(kind.dir_name())
    }

    /// Output folder for an asset kind
    pub fn output(&self, kind: AssetKind) -> PathBuf {
        self.output_root.join(kind.dir_name())
    }

    /// Folder holding the ordered intermediate stylesheets
    pub fn scratch(&self) -> PathBuf {
        self.staging_root.join(SCRATCH_DIR)
    }

    pub fn staged_html(&self) -> PathBuf {
        self.staging_root.join(HTML_FILE)
    }

    pub fn output_html(&self) -> PathBuf {
        self.output_root.join(HTML_FILE)
    }

    pub fn output_css(&self) -> PathBuf {
        self.output(AssetKind::Stylesheet).join(CSS_FILE)
    }

    /// Path prefix that marks a reference as staging-relative (e.g. `tmp/`).
    ///
    /// The mirror writes inline-style references with this prefix and the
    /// minifier turns it into `../` for the output stylesheet.
    pub fn staging_token(&self) -> String {
        let name = self
            .staging_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.staging_root.to_string_lossy().into_owned());
        format!("{name}/")
    }

    /// Delete both roots and recreate the empty output skeleton and staging root
    pub async fn reset(&self) -> Result<()> {
        for root in [&self.staging_root, &self.output_root] {
            match tokio::fs::remove_dir_all(root).await {
                Ok(()) => ::log::debug!("Removed {}", root.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(BundleError::io("remove", root)(e)),
            }
        }

        let folders = [
            self.staging_root.clone(),
            self.output(AssetKind::Stylesheet),
            self.output(AssetKind::Image),
            self.output(AssetKind::Font),
        ];
        for folder in &folders {
            tokio::fs::create_dir_all(folder)
                .await
                .map_err(BundleError::io("create", folder))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(AssetKind::classify("logo.PNG"), Some(AssetKind::Image));
        assert_eq!(AssetKind::classify("icons.svg"), Some(AssetKind::Image));
        assert_eq!(AssetKind::classify("font.woff2"), Some(AssetKind::Font));
        assert_eq!(AssetKind::classify("app.min.js"), Some(AssetKind::Script));
        assert_eq!(AssetKind::classify("main.css"), Some(AssetKind::Stylesheet));
        assert_eq!(AssetKind::classify("feed.xml"), None);
        assert_eq!(AssetKind::classify("README"), None);
    }

    #[test]
    fn test_overlapping_roots_rejected() {
        assert!(StagingLayout::new("build", "build/out").is_err());
        assert!(StagingLayout::new("build/tmp", "build").is_err());
        assert!(StagingLayout::new("same", "same").is_err());
        assert!(StagingLayout::new("tmp", "output").is_ok());
    }

    #[test]
    fn test_staging_token() {
        let layout = StagingLayout::new("/work/tmp", "/work/output").unwrap();
        assert_eq!(layout.staging_token(), "tmp/");
    }

    #[tokio::test]
    async fn test_reset_clears_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let layout =
            StagingLayout::new(dir.path().join("tmp"), dir.path().join("output")).unwrap();

        tokio::fs::create_dir_all(layout.scratch()).await.unwrap();
        tokio::fs::write(layout.scratch().join("00_old.css"), "a{}")
            .await
            .unwrap();
        tokio::fs::create_dir_all(layout.output_root()).await.unwrap();
        tokio::fs::write(layout.output_html(), "stale").await.unwrap();

        layout.reset().await.unwrap();

        assert!(layout.staging_root().is_dir());
        assert!(!layout.scratch().exists());
        assert!(!layout.output_html().exists());
        assert!(layout.output(AssetKind::Stylesheet).is_dir());
        assert!(layout.output(AssetKind::Image).is_dir());
        assert!(layout.output(AssetKind::Font).is_dir());
    }
}
