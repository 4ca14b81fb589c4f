use url::Url;

/// Strip any query string or fragment from a reference
pub fn strip_query(reference: &str) -> &str {
    reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
}

/// Bare file name of a path or URL reference (`/x/pic.png?v=2` -> `pic.png`)
pub fn basename(reference: &str) -> &str {
    let path = strip_query(reference);
    path.rsplit('/').next().unwrap_or(path)
}

/// File name to stage a remote asset under, taken from the last path segment
pub fn staged_file_name(url: &Url) -> Option<String> {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())?;

    // Keep staged names flat and filesystem-safe
    Some(name.replace(['\\', ':', '*', '?', '"', '<', '>', '|'], "_"))
}

/// `scheme://host[:port]` of a URL, without a trailing slash
pub fn site_prefix(url: &Url) -> String {
    let mut prefix = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        prefix.push_str(&format!(":{port}"));
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("/x/pic.png"), "pic.png");
        assert_eq!(basename("pic.png"), "pic.png");
        assert_eq!(basename("../img/bg.jpg?v=3#top"), "bg.jpg");
        assert_eq!(basename("https://cdn.example.com/a/b/c.css"), "c.css");
    }

    #[test]
    fn test_staged_file_name() {
        let url = Url::parse("https://example.com/assets/site.css?v=1").unwrap();
        assert_eq!(staged_file_name(&url).as_deref(), Some("site.css"));

        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(staged_file_name(&root), None);
    }

    #[test]
    fn test_site_prefix() {
        let url = Url::parse("https://example.com/blog/post").unwrap();
        assert_eq!(site_prefix(&url), "https://example.com");

        let with_port = Url::parse("http://localhost:8080/").unwrap();
        assert_eq!(site_prefix(&with_port), "http://localhost:8080");
    }
}
