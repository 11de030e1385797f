use crate::capability::{PageRenderer, RenderSession};
use crate::error::{Result, ScanError};
use crate::result::RenderedPage;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

const USER_AGENT: &str = "pagewatch/0.1 (+https://github.com/pagewatch/pagewatch)";

/// Elements whose text never shows up on the rendered page.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Renders pages over plain HTTP and parses them with `scraper`.
///
/// Each [`HttpRenderer::open`] builds a fresh client with its own cookie jar,
/// so no state leaks from one seed's subtree into the next.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    timeout_secs: u64,
}

impl HttpRenderer {
    pub fn new() -> Self {
        Self::with_timeout(60)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    fn build_client(&self) -> Result<Client> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.timeout_secs.div_ceil(2)))
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(client)
    }
}

impl Default for HttpRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    type Session = HttpSession;

    async fn open(&self) -> Result<HttpSession> {
        Ok(HttpSession {
            client: self.build_client()?,
            current: None,
        })
    }
}

pub struct HttpSession {
    client: Client,
    current: Option<RenderedPage>,
}

impl HttpSession {
    pub fn current_page(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }

    fn loaded(&self, what: &str) -> Result<&RenderedPage> {
        self.current
            .as_ref()
            .ok_or_else(|| ScanError::StaleReference(format!("no page loaded for {}", what)))
    }
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("Rendering {}", url);
        // The previous page is gone as soon as navigation starts.
        self.current = None;

        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let response_time = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let html = response.text().await?;

        self.current = Some(RenderedPage {
            url: final_url,
            status_code: status.as_u16(),
            content_type,
            response_time,
            html,
        });
        Ok(())
    }

    fn body_text(&self) -> Result<String> {
        let page = self.loaded("body text")?;
        extract_body_text(&page.html)
            .ok_or_else(|| ScanError::NoSuchElement(format!("body on {}", page.url)))
    }

    fn anchor_hrefs(&self) -> Result<Vec<String>> {
        let page = self.loaded("anchors")?;
        Ok(extract_anchor_hrefs(&page.html, &page.url))
    }

    async fn dismiss_dialog(&mut self) {
        // Plain HTTP never raises native dialogs.
        debug!("No dialog to dismiss");
    }
}

/// Visible text of `<body>`, one text run per line.
pub fn extract_body_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();
    let body = document.select(&body_selector).next()?;

    let lines: Vec<&str> = body
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|el| HIDDEN_ELEMENTS.contains(&el.value().name()));
                (!hidden).then(|| text.trim())
            }
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect();

    Some(lines.join("\n"))
}

/// Every `a[href]` resolved against `page_url`.
pub fn extract_anchor_hrefs(html: &str, page_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("a[href]").unwrap();

    document
        .select(&link_selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_url(page_url, href))
        .collect()
}

pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    // Skip empty, javascript:, mailto:, tel:, etc.
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let mut resolved = base_url.join(href).ok()?;
    resolved.set_fragment(None);

    Some(resolved.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_body_text_skips_scripts_and_styles() {
        let html = r#"<html><head><title>T</title></head><body>
            <h1>Hello</h1>
            <script>var hidden = 1;</script>
            <style>p { color: red; }</style>
            <p>World</p>
        </body></html>"#;

        assert_eq!(extract_body_text(html).unwrap(), "Hello\nWorld");
    }

    #[test]
    fn test_anchor_hrefs_are_absolute() {
        let html = r##"<body>
            <a href="/a">A</a>
            <a href="b#top">B</a>
            <a href="https://other.org/c">C</a>
            <a href="mailto:x@example.com">mail</a>
            <a href="#frag">frag</a>
            <a>no href</a>
        </body>"##;

        let hrefs = extract_anchor_hrefs(html, "http://example.com/dir/page");
        assert_eq!(
            hrefs,
            vec![
                "http://example.com/a".to_string(),
                "http://example.com/dir/b".to_string(),
                "https://other.org/c".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_url_rejects_bad_base() {
        assert_eq!(resolve_url("not a url", "/a"), None);
    }

    #[tokio::test]
    async fn test_session_renders_page() {
        let mock_server = MockServer::start().await;
        let html = format!(
            r#"<html><body><p>Hello   World</p><a href="{}/next">n</a></body></html>"#,
            mock_server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(html.as_bytes()),
            )
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::with_timeout(5);
        let mut session = renderer.open().await.unwrap();
        session.navigate(&mock_server.uri()).await.unwrap();

        assert_eq!(session.body_text().unwrap(), "Hello   World\nn");
        assert_eq!(
            session.anchor_hrefs().unwrap(),
            vec![format!("{}/next", mock_server.uri())]
        );
    }

    #[tokio::test]
    async fn test_session_error_status_is_fetch_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let renderer = HttpRenderer::with_timeout(5);
        let mut session = renderer.open().await.unwrap();
        let err = session
            .navigate(&format!("{}/missing", mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::HttpStatus { status: 404, .. }));
        assert!(err.is_fetch_failure());
        assert!(session.current_page().is_none());
    }

    #[tokio::test]
    async fn test_unloaded_session_is_stale() {
        let session = HttpRenderer::new().open().await.unwrap();
        assert!(matches!(
            session.anchor_hrefs(),
            Err(ScanError::StaleReference(_))
        ));
    }
}
