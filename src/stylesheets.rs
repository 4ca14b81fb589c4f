use crate::error::{BundleError, Result};
use crate::layout::{AssetKind, INLINE_STYLE_FILE, StagingLayout};
use crate::utils::basename;
use std::collections::HashSet;
use std::io::ErrorKind;

/// Where a stylesheet came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// A `<link rel="stylesheet">`, `index` is its position among the page's
    /// links and `width` the digits its scratch prefix is padded to
    Linked {
        index: usize,
        width: usize,
        file_name: String,
    },
    /// All inline `<style>` blocks, concatenated in document order
    Inline,
}

/// One stylesheet in cascade order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetSource {
    pub kind: SourceKind,
    pub content: String,
}

impl StylesheetSource {
    pub fn linked(index: usize, file_name: &str, content: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Linked {
                index,
                width: 2,
                file_name: file_name.to_string(),
            },
            content: content.into(),
        }
    }

    /// Pad the scratch prefix to `width` digits
    pub fn with_index_width(mut self, digits: usize) -> Self {
        if let SourceKind::Linked { width, .. } = &mut self.kind {
            *width = digits;
        }
        self
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Inline,
            content: content.into(),
        }
    }

    /// File name in the scratch folder. Lexicographic order of these names is
    /// the cascade order.
    pub fn scratch_name(&self) -> String {
        match &self.kind {
            SourceKind::Linked {
                index,
                width,
                file_name,
            } => format!("{index:0width$}_{file_name}", width = *width),
            SourceKind::Inline => INLINE_STYLE_FILE.to_string(),
        }
    }
}

/// Collect the linked stylesheets in `<link>` order followed by the inline
/// stylesheet, and persist them to the scratch folder.
///
/// `links` are the `href`s of the page's stylesheet links in document order.
/// A linked file missing from the mirror (never downloaded, or removed by the
/// ignore filter) is skipped. The inline source is always present, even when
/// empty.
pub async fn aggregate(
    layout: &StagingLayout,
    links: &[String],
    inline_style: &str,
) -> Result<Vec<StylesheetSource>> {
    let staged = layout.staged(AssetKind::Stylesheet);
    let width = index_width(links.len());
    let mut sources = Vec::with_capacity(links.len() + 1);
    let mut seen = HashSet::new();

    for (index, href) in links.iter().enumerate() {
        let file_name = basename(href);
        if file_name.is_empty() || !seen.insert(file_name.to_string()) {
            ::log::debug!("Skipping repeated stylesheet link {href}");
            continue;
        }

        let path = staged.join(file_name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => sources
                .push(StylesheetSource::linked(index, file_name, content).with_index_width(width)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ::log::info!("Stylesheet {file_name} not in mirror, skipped");
            }
            Err(e) => return Err(BundleError::io("read", &path)(e)),
        }
    }

    sources.push(StylesheetSource::inline(inline_style));
    persist(layout, &sources).await?;

    Ok(sources)
}

/// Digits needed so every link index sorts in order, never fewer than two
fn index_width(links: usize) -> usize {
    links.saturating_sub(1).max(1).to_string().len().max(2)
}

async fn persist(layout: &StagingLayout, sources: &[StylesheetSource]) -> Result<()> {
    let scratch = layout.scratch();
    tokio::fs::create_dir_all(&scratch)
        .await
        .map_err(BundleError::io("create", &scratch))?;

    for source in sources {
        let path = scratch.join(source.scratch_name());
        tokio::fs::write(&path, &source.content)
            .await
            .map_err(BundleError::io("write", &path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn staged_layout(files: &[(&str, &str)]) -> (tempfile::TempDir, StagingLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout =
            StagingLayout::new(dir.path().join("tmp"), dir.path().join("output")).unwrap();
        layout.reset().await.unwrap();

        let css_dir = layout.staged(AssetKind::Stylesheet);
        tokio::fs::create_dir_all(&css_dir).await.unwrap();
        for (name, content) in files {
            tokio::fs::write(css_dir.join(name), content).await.unwrap();
        }
        (dir, layout)
    }

    async fn scratch_listing(layout: &StagingLayout) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(layout.scratch()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[test]
    fn test_scratch_names() {
        assert_eq!(
            StylesheetSource::linked(3, "main.css", "").scratch_name(),
            "03_main.css"
        );
        assert_eq!(
            StylesheetSource::linked(12, "x.css", "").scratch_name(),
            "12_x.css"
        );
        assert_eq!(
            StylesheetSource::inline("").scratch_name(),
            "zz_inline-style.css"
        );
    }

    #[test]
    fn test_index_width() {
        assert_eq!(index_width(0), 2);
        assert_eq!(index_width(100), 2);
        assert_eq!(index_width(101), 3);
        assert_eq!(index_width(1001), 4);
        assert_eq!(
            StylesheetSource::linked(7, "a.css", "")
                .with_index_width(3)
                .scratch_name(),
            "007_a.css"
        );
    }

    #[tokio::test]
    async fn test_many_links_keep_cascade_order_in_scratch() {
        let files: Vec<(String, String)> = (0..120)
            .map(|i| (format!("s{i}.css"), format!(".c{i}{{top:0}}")))
            .collect();
        let borrowed: Vec<(&str, &str)> = files
            .iter()
            .map(|(name, css)| (name.as_str(), css.as_str()))
            .collect();
        let (_dir, layout) = staged_layout(&borrowed).await;
        let links: Vec<String> = (0..120).map(|i| format!("css/s{i}.css")).collect();

        let sources = aggregate(&layout, &links, "").await.unwrap();

        let names: Vec<_> = sources.iter().map(StylesheetSource::scratch_name).collect();
        assert_eq!(names[0], "000_s0.css");
        assert_eq!(names[99], "099_s99.css");
        assert_eq!(names[100], "100_s100.css");
        assert_eq!(scratch_listing(&layout).await, names);
    }

    #[tokio::test]
    async fn test_link_order_is_cascade_order() {
        // Alphabetical file order is the reverse of link order
        let (_dir, layout) =
            staged_layout(&[("zeta.css", "z{top:0}"), ("alpha.css", "a{top:0}")]).await;
        let links = vec!["css/zeta.css".to_string(), "css/alpha.css?v=2".to_string()];

        let sources = aggregate(&layout, &links, "i{top:0}").await.unwrap();

        let names: Vec<_> = sources.iter().map(StylesheetSource::scratch_name).collect();
        assert_eq!(names, vec!["00_zeta.css", "01_alpha.css", "zz_inline-style.css"]);
        assert_eq!(sources[0].content, "z{top:0}");
        assert_eq!(sources[2].content, "i{top:0}");
        assert_eq!(scratch_listing(&layout).await, names);
    }

    #[tokio::test]
    async fn test_missing_and_repeated_links_skipped() {
        let (_dir, layout) = staged_layout(&[("b.css", "b{top:0}")]).await;
        let links = vec![
            "css/ignored.css".to_string(),
            "css/b.css".to_string(),
            "css/b.css".to_string(),
        ];

        let sources = aggregate(&layout, &links, "").await.unwrap();

        let names: Vec<_> = sources.iter().map(StylesheetSource::scratch_name).collect();
        assert_eq!(names, vec!["01_b.css", "zz_inline-style.css"]);
    }

    #[tokio::test]
    async fn test_empty_inline_source_still_written() {
        let (_dir, layout) = staged_layout(&[("site.css", "p{top:0}")]).await;
        let links = vec!["css/site.css".to_string()];

        let sources = aggregate(&layout, &links, "").await.unwrap();

        assert_eq!(sources.last(), Some(&StylesheetSource::inline("")));
        let listing = scratch_listing(&layout).await;
        assert_eq!(listing, vec!["00_site.css", "zz_inline-style.css"]);
        let inline = tokio::fs::read_to_string(layout.scratch().join("zz_inline-style.css"))
            .await
            .unwrap();
        assert!(inline.is_empty());
    }
}
