// Text helpers shared by toolkits

use regex::Regex;
use reqwest::Url;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|svg)[^>]*>.*?</(script|style|noscript|svg)>")
        .expect("static regex")
});
static BLOCK_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|tr|h[1-6]|section|article|table)[^>]*>").expect("static regex")
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("static regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f]+").expect("static regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").expect("static regex"));
static HREFS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"'#]+)["']"#).expect("static regex"));

/// Reduce an HTML page to readable text.
pub(crate) fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, " ");
    let text = BLOCK_TAGS.replace_all(&text, "\n");
    let text = TAGS.replace_all(&text, " ");
    let text = decode_entities(&text);
    let text = SPACES.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n");
    text.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
}

/// Links of the page at `base`, resolved to absolute http(s) URLs, in
/// document order, deduplicated.
pub(crate) fn extract_links(base: &str, html: &str, limit: usize) -> Vec<String> {
    let base = Url::parse(base).ok();
    let mut links: Vec<String> = Vec::new();
    for capture in HREFS.captures_iter(html) {
        let href = decode_entities(capture[1].trim());
        let resolved = match &base {
            Some(base) => base.join(&href),
            None => Url::parse(&href),
        };
        let Ok(url) = resolved else { continue };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        let link = url.to_string();
        if !links.contains(&link) {
            links.push(link);
            if links.len() >= limit {
                break;
            }
        }
    }
    links
}

/// Decode the handful of entities that matter for readability.
pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Truncate to at most `max_chars` characters, marking the cut.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

/// Whether `location` is an http(s) URL.
pub(crate) fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolve `path` against `base` unless it is absolute.
pub(crate) fn resolve_path(base: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() { candidate } else { base.join(candidate) }
}

/// Pull the first JSON object out of a model reply, tolerating code fences
/// and surrounding prose.
pub(crate) fn extract_json_object(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok().filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_drops_markup_and_scripts() {
        let html = "<html><head><style>p{}</style><script>var x = 1;</script></head>\
                    <body><h1>Title</h1><p>Fish &amp; chips</p><p>Price: &lt;$5&gt;</p></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Title\nFish & chips\nPrice: <$5>");
    }

    #[test]
    fn test_extract_links() {
        let html = r#"<a href="https://a.example/x">x</a><a href="mailto:me@a.example">m</a>
                      <a class="c" href="https://b.example/?q=1&amp;p=2">b</a><a href="https://a.example/x">again</a>"#;
        assert_eq!(
            extract_links("https://a.example/", html, 10),
            vec!["https://a.example/x".to_string(), "https://b.example/?q=1&p=2".to_string()]
        );
        assert_eq!(extract_links("https://a.example/", html, 1).len(), 1);
    }

    #[test]
    fn test_extract_links_resolves_relative_hrefs() {
        let html = r#"<a href="/dp/B0KEYBOARD">k</a><a href='item/2'>i</a><a href="../up">u</a>"#;
        assert_eq!(
            extract_links("https://shop.example/s/list?page=1", html, 10),
            vec![
                "https://shop.example/dp/B0KEYBOARD".to_string(),
                "https://shop.example/s/item/2".to_string(),
                "https://shop.example/up".to_string(),
            ]
        );
        assert!(extract_links("not a url", html, 10).is_empty());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé\n... [truncated]");
    }

    #[test]
    fn test_extract_json_object() {
        let reply = "Sure:\n```json\n{\"action\": \"visit\", \"url\": \"https://x\"}\n```";
        let value = extract_json_object(reply).unwrap();
        assert_eq!(value["action"], "visit");
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/out");
        assert_eq!(resolve_path(base, "a.txt"), PathBuf::from("/out/a.txt"));
        assert_eq!(resolve_path(base, "/abs/b.txt"), PathBuf::from("/abs/b.txt"));
    }
}
