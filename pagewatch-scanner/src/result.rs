use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A page as loaded by a render session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedPage {
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub response_time: Duration,
    pub html: String,
}

/// How a monitored URL is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlKind {
    /// Ends in `.pdf`: fetched whole and fingerprinted per internal page.
    Document,
    /// Anything else: rendered, and its same-host links followed.
    Page,
}

impl UrlKind {
    /// Case-sensitive on the last four characters.
    pub fn classify(url: &str) -> Self {
        if url.ends_with(".pdf") {
            UrlKind::Document
        } else {
            UrlKind::Page
        }
    }
}
