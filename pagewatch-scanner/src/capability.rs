//! The fetch and render capabilities the change detector depends on.
//!
//! Implementations live next to these traits ([`crate::HttpRenderer`],
//! [`crate::HttpDocumentFetcher`]); tests substitute scripted fakes.

use crate::error::Result;
use async_trait::async_trait;

/// Downloads a document (PDF) and splits it into per-page text.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>>;

    /// Text of every internal page, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>>;
}

/// Hands out one [`RenderSession`] per seed.
///
/// The session is released when dropped, so a seed's subtree owns its
/// renderer for exactly as long as it runs.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    type Session: RenderSession + 'static;

    async fn open(&self) -> Result<Self::Session>;
}

#[async_trait]
pub trait RenderSession: Send {
    /// Load `url`, replacing the current page.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Visible text of the current page's body.
    fn body_text(&self) -> Result<String>;

    /// Absolute hrefs of every anchor on the current page.
    fn anchor_hrefs(&self) -> Result<Vec<String>>;

    /// Best effort; never fails.
    async fn dismiss_dialog(&mut self);
}
