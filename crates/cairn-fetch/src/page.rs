use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::redirect::Policy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{instrument, warn};
use url::Url;

use crate::error::{FetchError, Result};
use crate::validate::validate_url;

const TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BODY_BYTES: usize = 500 * 1024;
const MAX_REDIRECTS: usize = 10;
const BODY_TRUNCATE_SCALARS: usize = 2000;

const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "iframe", "svg", "noscript",
];

#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub final_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_site_name: Option<String>,
    pub content: String,
}

/// Builds the single `reqwest::Client` the fetcher and NodeInfo prober
/// share, matching the "one client per process" reuse discipline the LLM
/// providers each follow with their own `reqwest::Client` field.
pub fn build_client(blacklist: Arc<Vec<String>>) -> Client {
    let policy_list = blacklist.clone();
    Client::builder()
        .timeout(TIMEOUT)
        .redirect(Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match validate_url(attempt.url(), &policy_list) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e.to_string()),
            }
        }))
        .build()
        .expect("fetch client must build")
}

#[instrument(skip(client, blacklist), fields(url = %raw_url))]
pub async fn fetch_page_content(
    client: &Client,
    raw_url: &str,
    blacklist: &[String],
) -> Result<PageContent> {
    let url = Url::parse(raw_url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    validate_url(&url, blacklist)?;

    let resp = client.get(url.clone()).send().await?;
    let final_url = resp.url().to_string();

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.contains("text/html") {
        return Err(FetchError::UnsupportedContentType(content_type));
    }

    let mut body = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            warn!(url = %final_url, "page body exceeded cap, truncating");
            let remaining = MAX_BODY_BYTES.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    let html_text = String::from_utf8_lossy(&body);
    Ok(parse_html(&html_text, final_url))
}

fn parse_html(html_text: &str, final_url: String) -> PageContent {
    let doc = Html::parse_document(html_text);

    let title = select_text(&doc, "title");
    let description = select_attr(&doc, r#"meta[name="description"]"#, "content");
    let og_title = select_attr(&doc, r#"meta[property="og:title"]"#, "content");
    let og_description = select_attr(&doc, r#"meta[property="og:description"]"#, "content");
    let og_image = select_attr(&doc, r#"meta[property="og:image"]"#, "content");
    let og_site_name = select_attr(&doc, r#"meta[property="og:site_name"]"#, "content");

    let skip: HashSet<&str> = SKIP_TAGS.iter().copied().collect();
    let mut content = String::new();
    if let Ok(sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&sel).next() {
            extract_text(body, &skip, &mut content);
        }
    }
    let content = truncate_scalars(content.trim(), BODY_TRUNCATE_SCALARS);

    PageContent {
        final_url,
        title,
        description,
        og_title,
        og_description,
        og_image,
        og_site_name,
        content,
    }
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

fn extract_text(el: ElementRef, skip: &HashSet<&str>, out: &mut String) {
    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let tag = child_el.value().name();
            if skip.contains(tag) {
                continue;
            }
            extract_text(child_el, skip, out);
            if matches!(tag, "p" | "div" | "br" | "li") {
                out.push('\n');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn truncate_scalars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_tags_excluded_from_body_text() {
        let html = "<html><body><script>bad()</script><p>hello <br>world</p></body></html>";
        let page = parse_html(html, "https://example.com".to_string());
        assert!(page.content.contains("hello"));
        assert!(page.content.contains("world"));
        assert!(!page.content.contains("bad()"));
    }

    #[test]
    fn truncation_adds_ellipsis() {
        let long = "a".repeat(3000);
        let truncated = truncate_scalars(&long, 2000);
        assert_eq!(truncated.chars().count(), 2001);
        assert!(truncated.ends_with('…'));
    }
}
