use crate::error::{BundleError, Result};
use crate::layout::{AssetKind, HTML_FILE};
use crate::utils::staged_file_name;
use lol_html::errors::AttributeNameError;
use lol_html::html_content::Element;
use lol_html::{HtmlRewriter, Settings, element};
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use url::Url;

static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).expect("css url pattern is valid")
});

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<style\b[^>]*>)(.*?)(</style>)").expect("style block pattern is valid")
});

/// One remote file and where it lands in the staging tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub url: Url,
    pub kind: Option<AssetKind>,
    pub file_name: String,
}

impl Download {
    /// Path relative to the staging root; unclassified files sit at the root
    pub fn relative_path(&self) -> String {
        match self.kind {
            Some(kind) => format!("{}/{}", kind.dir_name(), self.file_name),
            None => self.file_name.clone(),
        }
    }

    fn is_stylesheet(&self) -> bool {
        self.kind == Some(AssetKind::Stylesheet)
    }
}

/// Pending downloads, one staged path per URL.
///
/// A URL whose file name is already taken by another URL is staged under a
/// numbered name (`style_1.css`).
#[derive(Debug)]
pub struct DownloadPlan {
    pending: Vec<Download>,
    claimed: HashSet<String>,
    staged: HashMap<Url, String>,
}

impl Default for DownloadPlan {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            // The mirrored page itself
            claimed: HashSet::from([HTML_FILE.to_string()]),
            staged: HashMap::new(),
        }
    }
}

impl DownloadPlan {
    /// Queue a download and return its staged path
    pub fn add(&mut self, mut download: Download) -> String {
        if let Some(path) = self.staged.get(&download.url) {
            return path.clone();
        }

        let mut path = download.relative_path();
        if self.claimed.contains(&path) {
            let original = download.file_name.clone();
            let (stem, extension) = split_extension(&original);
            for n in 1.. {
                download.file_name = format!("{stem}_{n}{extension}");
                path = download.relative_path();
                if !self.claimed.contains(&path) {
                    break;
                }
            }
            ::log::debug!("{original} already taken, staging {} as {path}", download.url);
        }

        self.claimed.insert(path.clone());
        self.staged.insert(download.url.clone(), path.clone());
        self.pending.push(download);
        path
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the queued downloads, split into stylesheets and everything else.
    /// Paths stay claimed.
    pub fn take_pending(&mut self) -> (Vec<Download>, Vec<Download>) {
        std::mem::take(&mut self.pending)
            .into_iter()
            .partition(Download::is_stylesheet)
    }
}

/// The page with its references pointing into the staging tree, plus what to fetch
#[derive(Debug)]
pub struct PagePlan {
    pub html: String,
    pub downloads: DownloadPlan,
}

/// `("style", ".css")` for `style.css`; names without a dot have no extension
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name.split_at(dot),
        _ => (file_name, ""),
    }
}

/// Whether a reference names a file that can be fetched
pub(crate) fn is_fetchable(reference: &str) -> bool {
    let reference = reference.trim();
    let lower = reference.to_ascii_lowercase();
    !(reference.is_empty()
        || reference.starts_with('#')
        || lower.starts_with("data:")
        || lower.starts_with("javascript:")
        || lower.starts_with("about:"))
}

/// Resolve a reference against `base` and decide where it is staged
fn download_for(base: &Url, reference: &str, stylesheet: bool) -> Option<Download> {
    if !is_fetchable(reference) {
        return None;
    }
    let url = base.join(reference.trim()).ok()?;
    let mut file_name = staged_file_name(&url)?;

    let kind = if stylesheet {
        if !file_name.to_ascii_lowercase().ends_with(".css") {
            file_name.push_str(".css");
        }
        Some(AssetKind::Stylesheet)
    } else {
        AssetKind::classify(&file_name)
    };

    Some(Download {
        url,
        kind,
        file_name,
    })
}

/// Replace every `url(...)` reference in `css` for which `rewrite` returns a new value
pub fn rewrite_css_urls(css: &str, mut rewrite: impl FnMut(&str) -> Option<String>) -> String {
    CSS_URL
        .replace_all(css, |caps: &Captures<'_>| match rewrite(&caps[1]) {
            Some(reference) if reference.contains([' ', '(', ')', '\'', '"']) => {
                format!("url(\"{}\")", reference.replace('"', "\\\""))
            }
            Some(reference) => format!("url({reference})"),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Point image and font references of a downloaded stylesheet at `../img/` and `../fonts/`
pub fn plan_stylesheet(css: &str, sheet_url: &Url, plan: &mut DownloadPlan) -> String {
    rewrite_css_urls(css, |reference| {
        let download = download_for(sheet_url, reference, false)?;
        match download.kind {
            Some(AssetKind::Image | AssetKind::Font) => Some(format!("../{}", plan.add(download))),
            _ => None,
        }
    })
}

/// Discover the page's assets and rewrite its references to the staged copies.
///
/// `img`, `script` and stylesheet `link` attributes become `img/…`, `js/…`
/// and `css/…`. References inside inline `<style>` blocks are prefixed with
/// `staging_token` so the stylesheet built from them can be rebased later.
pub fn plan_page(html: &str, page: &Url, staging_token: &str) -> Result<PagePlan> {
    let mut downloads = DownloadPlan::default();
    let local = plan_elements(html, page, &mut downloads);

    let styled = STYLE_BLOCK.replace_all(html, |caps: &Captures<'_>| {
        let css = rewrite_css_urls(&caps[2], |reference| {
            let download = download_for(page, reference, false)?;
            match download.kind {
                Some(AssetKind::Image | AssetKind::Font) => {
                    Some(format!("{staging_token}{}", downloads.add(download)))
                }
                _ => None,
            }
        });
        format!("{}{}{}", &caps[1], css, &caps[3])
    });

    let html = rewrite_references(&styled, &local)?;
    Ok(PagePlan { html, downloads })
}

/// Queue element-referenced assets, returning original reference -> staged path
fn plan_elements(html: &str, page: &Url, plan: &mut DownloadPlan) -> HashMap<String, String> {
    let sources = [
        ("img[src]", "src", false),
        ("script[src]", "src", false),
        (r#"link[rel~="stylesheet"][href]"#, "href", true),
    ];

    let doc = Html::parse_document(html);
    let mut local = HashMap::new();
    for (css, attribute, stylesheet) in sources {
        let selector = Selector::parse(css).expect("asset selector is valid");
        for element in doc.select(&selector) {
            let Some(reference) = element.value().attr(attribute) else {
                continue;
            };
            if local.contains_key(reference) {
                continue;
            }
            if let Some(download) = download_for(page, reference, stylesheet) {
                local.insert(reference.to_string(), plan.add(download));
            }
        }
    }
    local
}

fn relink(
    el: &mut Element<'_, '_>,
    attribute: &str,
    local: &HashMap<String, String>,
) -> std::result::Result<(), AttributeNameError> {
    if let Some(staged) = el.get_attribute(attribute).and_then(|v| local.get(&v)) {
        el.set_attribute(attribute, staged)?;
    }
    Ok(())
}

fn rewrite_references(html: &str, local: &HashMap<String, String>) -> Result<String> {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("img[src]", |el| Ok(relink(el, "src", local)?)),
                element!("script[src]", |el| Ok(relink(el, "src", local)?)),
                element!(r#"link[rel~="stylesheet"][href]"#, |el| {
                    Ok(relink(el, "href", local)?)
                }),
            ],
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| BundleError::Rewrite(e.to_string()))?;
    rewriter
        .end()
        .map_err(|e| BundleError::Rewrite(e.to_string()))?;

    String::from_utf8(output).map_err(|e| BundleError::Rewrite(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://example.com/shop/index.html").unwrap()
    }

    const PAGE: &str = r#"<html><head>
        <link rel="stylesheet" href="/static/site.css?v=2">
        <link rel="stylesheet" href="https://cdn.example.net/theme">
        <link rel="icon" href="favicon.ico">
        <style>#a{background:url('img/bg.png')}.i{background:url(data:image/png;base64,AA)}</style>
        <script src="js/app.js"></script>
    </head><body>
        <img src="/media/pic.png"><img src="/media/pic.png"><img src="data:image/gif;base64,R0">
    </body></html>"#;

    #[test]
    fn test_plan_page_queues_assets() {
        let mut plan = plan_page(PAGE, &page(), "tmp/").unwrap();
        let (sheets, others) = plan.downloads.take_pending();

        let sheet_paths: Vec<_> = sheets.iter().map(Download::relative_path).collect();
        assert_eq!(sheet_paths, vec!["css/site.css", "css/theme.css"]);
        assert_eq!(sheets[0].url.as_str(), "https://example.com/static/site.css?v=2");

        let other_paths: Vec<_> = others.iter().map(Download::relative_path).collect();
        assert_eq!(other_paths, vec!["img/pic.png", "js/app.js", "img/bg.png"]);
        assert!(plan.downloads.is_empty());
    }

    #[test]
    fn test_plan_page_rewrites_references() {
        let plan = plan_page(PAGE, &page(), "tmp/").unwrap();

        assert!(plan.html.contains(r#"<link rel="stylesheet" href="css/site.css">"#));
        assert!(plan.html.contains(r#"href="css/theme.css""#));
        assert!(plan.html.contains(r#"href="favicon.ico""#));
        assert!(plan.html.contains(r#"<script src="js/app.js">"#));
        assert!(plan.html.contains(r#"<img src="img/pic.png"><img src="img/pic.png">"#));
        assert!(plan.html.contains("url(tmp/img/bg.png)"));
        assert!(plan.html.contains("url(data:image/png;base64,AA)"));
        assert!(plan.html.contains(r#"src="data:image/gif;base64,R0""#));
    }

    #[test]
    fn test_plan_stylesheet() {
        let sheet_url = Url::parse("https://example.com/static/site.css").unwrap();
        let css = r#"@import url(other.css);
            #a{background:url("../images/hero.jpg?x=1")}
            @font-face{src:url(fonts/brand.woff2) format("woff2")}
            .m{mask:url(#clip)}"#;

        let mut plan = DownloadPlan::default();
        let rewritten = plan_stylesheet(css, &sheet_url, &mut plan);

        assert!(rewritten.contains("@import url(other.css)"));
        assert!(rewritten.contains("url(../img/hero.jpg)"));
        assert!(rewritten.contains("url(../fonts/brand.woff2)"));
        assert!(rewritten.contains("url(#clip)"));

        let (_, others) = plan.take_pending();
        assert_eq!(others[0].url.as_str(), "https://example.com/images/hero.jpg?x=1");
        assert_eq!(others[1].url.as_str(), "https://example.com/static/fonts/brand.woff2");
    }

    #[test]
    fn test_colliding_names_get_numbered() {
        let mut plan = DownloadPlan::default();
        let base = page();
        let first = plan.add(download_for(&base, "/a/logo.png", false).unwrap());
        let second = plan.add(download_for(&base, "/b/logo.png", false).unwrap());
        let third = plan.add(download_for(&base, "/c/logo.png", false).unwrap());
        let again = plan.add(download_for(&base, "/b/logo.png", false).unwrap());

        assert_eq!(first, "img/logo.png");
        assert_eq!(second, "img/logo_1.png");
        assert_eq!(third, "img/logo_2.png");
        assert_eq!(again, second);

        let (_, others) = plan.take_pending();
        let urls: Vec<_> = others.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/a/logo.png",
                "https://example.com/b/logo.png",
                "https://example.com/c/logo.png",
            ]
        );
    }

    #[test]
    fn test_same_named_stylesheets_both_staged() {
        let mut plan = DownloadPlan::default();
        let base = page();
        let a = plan.add(download_for(&base, "a/style.css", true).unwrap());
        let b = plan.add(download_for(&base, "b/style.css", true).unwrap());
        let repeat = plan.add(download_for(&base, "a/style.css", true).unwrap());

        assert_eq!(a, "css/style.css");
        assert_eq!(b, "css/style_1.css");
        assert_eq!(repeat, a);
        let (sheets, _) = plan.take_pending();
        assert_eq!(sheets.len(), 2);
    }

    #[test]
    fn test_page_name_is_reserved() {
        let mut plan = DownloadPlan::default();
        let path = plan.add(download_for(&page(), "/other/index.html", false).unwrap());
        assert_eq!(path, "index_1.html");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("style.css"), ("style", ".css"));
        assert_eq!(split_extension("a.min.js"), ("a.min", ".js"));
        assert_eq!(split_extension("LICENSE"), ("LICENSE", ""));
        assert_eq!(split_extension(".htaccess"), (".htaccess", ""));
    }

    #[test]
    fn test_unclassified_assets_stage_at_root() {
        let download = download_for(&page(), "feed.xml", false).unwrap();
        assert_eq!(download.relative_path(), "feed.xml");
        assert!(download_for(&page(), "javascript:void(0)", false).is_none());
    }
}
