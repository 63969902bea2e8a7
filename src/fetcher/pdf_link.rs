//! Find the PDF behind an archive's HTML viewer page.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::http::download;
use super::{FetchError, FetchStrategy};
use crate::http_client::HttpClient;
use crate::models::{ContentBuffer, FetchMethod, SourceReference, SourceRequest};

static RAW_PDF_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+\.pdf)["']"#).expect("pdf href regex should compile")
});

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector should compile"));

static EMBEDS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("embed[src], iframe[src], object[data]")
        .expect("embed selector should compile")
});

fn path_of(link: &str) -> String {
    link.split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn resolve(base: &Url, link: &str) -> Option<String> {
    base.join(link.trim()).ok().map(|u| u.to_string())
}

/// First PDF link on the page, resolved against `base_url`.
///
/// Preference order: an anchor ending in `.pdf`, an anchor containing
/// `/pdf/`, an embed/iframe/object pointing at a PDF, then a raw
/// `href="...pdf"` anywhere in the markup.
pub fn find_pdf_link(html: &str, base_url: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let document = Html::parse_document(html);

    let hrefs: Vec<&str> = document
        .select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .collect();

    if let Some(link) = hrefs.iter().find(|h| path_of(h).ends_with(".pdf")) {
        return resolve(&base, link);
    }
    if let Some(link) = hrefs.iter().find(|h| h.to_lowercase().contains("/pdf/")) {
        return resolve(&base, link);
    }

    let embedded = document.select(&EMBEDS).find_map(|el| {
        let value = el.value();
        value
            .attr("src")
            .or_else(|| value.attr("data"))
            .filter(|v| path_of(v).ends_with(".pdf") || v.to_lowercase().contains("pdf"))
    });
    if let Some(link) = embedded {
        return resolve(&base, link);
    }

    RAW_PDF_HREF
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| resolve(&base, m.as_str()))
}

/// Fetch the landing page, find its PDF, and download that with the
/// browser-mimic client.
pub struct PdfLinkStrategy {
    client: HttpClient,
}

impl PdfLinkStrategy {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for PdfLinkStrategy {
    fn method(&self) -> FetchMethod {
        FetchMethod::PdfLinkExtract
    }

    fn applies(&self, request: &SourceRequest) -> bool {
        matches!(request.reference, SourceReference::Url(_)) && !request.reference.has_pdf_path()
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<ContentBuffer, FetchError> {
        let SourceReference::Url(url) = &request.reference else {
            return Err(FetchError::NotApplicable);
        };

        let page = download(&self.client, url, FetchMethod::PdfLinkExtract).await?;
        if !page.is_html() {
            debug!("{} is {}, not an HTML page", url, page.mime());
            return Err(FetchError::NoPdfLink);
        }
        let html = String::from_utf8_lossy(page.bytes());
        let link = find_pdf_link(&html, page.final_url()).ok_or(FetchError::NoPdfLink)?;
        debug!("Found PDF link {} on {}", link, url);

        download(&self.client, &link, FetchMethod::PdfLinkExtract).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://archive.test/collection/item/42";

    #[test]
    fn test_anchor_ending_in_pdf_wins() {
        let html = r#"<a href="/viewer/pdf/42">viewer</a><a href="../files/v812.PDF?dl=1">Download</a>"#;
        assert_eq!(
            find_pdf_link(html, BASE).as_deref(),
            Some("https://archive.test/collection/files/v812.PDF?dl=1")
        );
    }

    #[test]
    fn test_anchor_with_pdf_segment() {
        let html = r#"<a href="/about">About</a><a href="/download/pdf/42">Get</a>"#;
        assert_eq!(
            find_pdf_link(html, BASE).as_deref(),
            Some("https://archive.test/download/pdf/42")
        );
    }

    #[test]
    fn test_embedded_viewer() {
        let html = r#"<iframe src="https://cdn.test/scans/v812.pdf"></iframe>"#;
        assert_eq!(
            find_pdf_link(html, BASE).as_deref(),
            Some("https://cdn.test/scans/v812.pdf")
        );
        let html = r#"<object data="scan.pdf" type="application/pdf"></object>"#;
        assert_eq!(
            find_pdf_link(html, BASE).as_deref(),
            Some("https://archive.test/collection/item/scan.pdf")
        );
    }

    #[test]
    fn test_raw_href_in_script() {
        let html = r#"<script>var x = '<link href="files/p47.pdf">';</script>"#;
        assert_eq!(
            find_pdf_link(html, BASE).as_deref(),
            Some("https://archive.test/collection/item/files/p47.pdf")
        );
    }

    #[test]
    fn test_no_link() {
        assert!(find_pdf_link("<p>nothing here</p>", BASE).is_none());
        assert!(find_pdf_link("<a href='x.pdf'>", "not a url").is_none());
    }
}
