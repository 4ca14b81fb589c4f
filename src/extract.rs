use crate::config::LinkMode;
use crate::error::{BundleError, Result};
use crate::mirror::plan::is_fetchable;
use crate::utils::{basename, site_prefix};
use lol_html::{HtmlRewriter, Settings, element};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Meta tag that opens every bundle page
pub const META_CHARSET: &str =
    r#"<meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />"#;

/// One extracted subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub selector: String,
    pub html: String,
}

/// Everything the later stages need from the mirrored page
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    /// Extracted subtrees in selector order
    pub fragments: Vec<Fragment>,
    /// Bare file names of `img[src]` inside the fragments
    pub images: BTreeSet<String>,
    /// Contents of every inline `<style>` block, in document order
    pub inline_style: String,
    /// `href`s of `<link rel="stylesheet">` elements, in document order
    pub stylesheet_links: Vec<String>,
}

impl PageExtraction {
    /// The fragments concatenated in selector order
    pub fn fragment_html(&self) -> String {
        self.fragments.iter().map(|f| f.html.as_str()).collect()
    }

    /// Full bundle page: charset meta, stylesheet link, then the fragments
    pub fn bundle_html(&self, stylesheet_href: &str) -> String {
        format!(
            "{META_CHARSET}<link rel=\"stylesheet\" href=\"{stylesheet_href}\">{}",
            self.fragment_html()
        )
    }
}

/// Extract the fragments matching `selectors` from mirrored page HTML.
///
/// Hyperlinks are made absolute against `site_url` first, so the extracted
/// markup carries working links. Every selector must match; the first match
/// is taken.
pub fn extract(
    html: &str,
    selectors: &[String],
    site_url: &Url,
    link_mode: LinkMode,
) -> Result<PageExtraction> {
    if selectors.is_empty() {
        return Err(BundleError::NoSelectors);
    }

    // Parse every selector before touching the page so a typo fails fast
    let parsed = selectors
        .iter()
        .map(|raw| {
            Selector::parse(raw)
                .map(|selector| (raw.clone(), selector))
                .map_err(|e| BundleError::InvalidSelector {
                    selector: raw.clone(),
                    message: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let rewritten = absolutize_links(html, site_url, link_mode)?;
    let doc = Html::parse_document(&rewritten);

    let mut extraction = PageExtraction {
        inline_style: inline_style(&doc),
        stylesheet_links: stylesheet_links(&doc),
        ..PageExtraction::default()
    };

    let img_selector = Selector::parse("img").expect("img selector is valid");
    for (raw, selector) in parsed {
        let element = doc
            .select(&selector)
            .next()
            .ok_or_else(|| BundleError::SelectorNotFound(raw.clone()))?;

        extraction
            .images
            .extend(fragment_images(element, &img_selector));
        extraction.fragments.push(Fragment {
            selector: raw,
            html: element.html(),
        });
    }

    ::log::debug!(
        "Extracted {} fragments referencing {} images",
        extraction.fragments.len(),
        extraction.images.len()
    );

    Ok(extraction)
}

fn inline_style(doc: &Html) -> String {
    let selector = Selector::parse("style").expect("style selector is valid");
    doc.select(&selector)
        .flat_map(|style| style.text())
        .collect()
}

fn stylesheet_links(doc: &Html) -> Vec<String> {
    let selector =
        Selector::parse(r#"link[rel~="stylesheet"][href]"#).expect("link selector is valid");
    doc.select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn fragment_images(element: ElementRef<'_>, img_selector: &Selector) -> Vec<String> {
    // `select` only visits descendants; the fragment root may itself be an image
    let root = (element.value().name() == "img").then_some(element);
    root.into_iter()
        .chain(element.select(img_selector))
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| is_fetchable(src))
        .map(basename)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrite every `a[href]` to an absolute URL
pub fn absolutize_links(html: &str, site_url: &Url, link_mode: LinkMode) -> Result<String> {
    let prefix = site_prefix(site_url);
    let mut output = Vec::with_capacity(html.len());

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("a[href]", |el| {
                if let Some(href) = el.get_attribute("href") {
                    let absolute = match link_mode {
                        LinkMode::Prefix => format!("{prefix}{href}"),
                        LinkMode::Resolve => match site_url.join(&href) {
                            Ok(url) => url.to_string(),
                            Err(_) => href,
                        },
                    };
                    el.set_attribute("href", &absolute)?;
                }
                Ok(())
            })],
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

    fn site() -> Url {
        Url::parse("https://example.com/shop/").unwrap()
    }

    fn selectors(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    const PAGE: &str = r#"<html><head>
        <link rel="stylesheet" href="css/base.css">
        <style>#a{color:red}</style>
        <link rel="stylesheet" href="css/theme.css">
        <link rel="icon" href="favicon.ico">
        <style>#b{color:blue}</style>
    </head><body>
        <div id="b"><p>second</p></div>
        <div id="a"><img src="/x/pic.png"><img src="img/pic.png?v=1"><a href="/about">About</a></div>
        <div id="c"><img src="img/other.gif"></div>
    </body></html>"#;

    #[test]
    fn test_fragments_follow_selector_order() {
        let result = extract(PAGE, &selectors(&["#a", "#b"]), &site(), LinkMode::Resolve).unwrap();

        assert_eq!(result.fragments.len(), 2);
        assert_eq!(result.fragments[0].selector, "#a");
        assert!(result.fragments[0].html.starts_with(r#"<div id="a">"#));
        assert!(result.fragments[1].html.starts_with(r#"<div id="b">"#));
        assert!(!result.fragment_html().contains(r#"id="c""#));
    }

    #[test]
    fn test_images_are_deduplicated_basenames() {
        let result = extract(PAGE, &selectors(&["#a"]), &site(), LinkMode::Resolve).unwrap();
        assert_eq!(result.images.into_iter().collect::<Vec<_>>(), vec!["pic.png"]);
    }

    #[test]
    fn test_image_as_fragment_root() {
        let html = r#"<body><img id="logo" src="img/logo.svg"></body>"#;
        let result = extract(html, &selectors(&["#logo"]), &site(), LinkMode::Resolve).unwrap();
        assert!(result.images.contains("logo.svg"));
    }

    #[test]
    fn test_inline_image_data_is_not_a_file() {
        let data = format!("data:image/png;base64,{}", "A".repeat(400));
        let html = format!(
            r#"<div id="a"><img src="img/pic.png"><img src="{data}"><img src=""></div>"#
        );
        let result = extract(&html, &selectors(&["#a"]), &site(), LinkMode::Resolve).unwrap();
        assert_eq!(result.images.into_iter().collect::<Vec<_>>(), vec!["pic.png"]);
    }

    #[test]
    fn test_missing_selector_is_fatal() {
        let err = extract(PAGE, &selectors(&["#a", "#nope"]), &site(), LinkMode::Resolve)
            .unwrap_err();
        assert!(matches!(err, BundleError::SelectorNotFound(s) if s == "#nope"));
    }

    #[test]
    fn test_invalid_selector_is_fatal() {
        let err = extract(PAGE, &selectors(&["#a["]), &site(), LinkMode::Resolve).unwrap_err();
        assert!(matches!(err, BundleError::InvalidSelector { .. }));
    }

    #[test]
    fn test_inline_styles_and_links_in_document_order() {
        let result = extract(PAGE, &selectors(&["#a"]), &site(), LinkMode::Resolve).unwrap();
        assert_eq!(result.inline_style, "#a{color:red}#b{color:blue}");
        assert_eq!(result.stylesheet_links, vec!["css/base.css", "css/theme.css"]);
    }

    #[test]
    fn test_no_inline_styles() {
        let html = r#"<body><main>x</main></body>"#;
        let result = extract(html, &selectors(&["main"]), &site(), LinkMode::Resolve).unwrap();
        assert_eq!(result.inline_style, "");
        assert!(result.stylesheet_links.is_empty());
    }

    #[test]
    fn test_resolve_mode_links() {
        let html = r#"<a href="/about">a</a><a href="cart">b</a><a href="https://other.org/x">c</a>"#;
        let out = absolutize_links(html, &site(), LinkMode::Resolve).unwrap();
        assert!(out.contains(r#"href="https://example.com/about""#));
        assert!(out.contains(r#"href="https://example.com/shop/cart""#));
        assert!(out.contains(r#"href="https://other.org/x""#));
    }

    #[test]
    fn test_prefix_mode_links() {
        let html = r#"<a href="/about">a</a><a href="https://other.org/x">c</a>"#;
        let out = absolutize_links(html, &site(), LinkMode::Prefix).unwrap();
        assert!(out.contains(r#"href="https://example.com/about""#));
        // Already-absolute links are prefixed as well in this mode
        assert!(out.contains(r#"href="https://example.comhttps://other.org/x""#));
    }

    #[test]
    fn test_bundle_html() {
        let result = extract(PAGE, &selectors(&["#b"]), &site(), LinkMode::Resolve).unwrap();
        let page = result.bundle_html("css/style.css");
        assert!(page.starts_with(META_CHARSET));
        assert!(page.contains(r#"<link rel="stylesheet" href="css/style.css"><div id="b">"#));
    }
}
