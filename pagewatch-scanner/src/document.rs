use crate::capability::DocumentFetcher;
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use lopdf::Document;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Fetches PDFs over HTTP and extracts their text with `lopdf`.
#[derive(Debug, Clone)]
pub struct HttpDocumentFetcher {
    client: Client,
}

impl HttpDocumentFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(60)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching document {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        extract_pdf_pages(bytes)
    }
}

/// Text of each page of a PDF, ordered by page number.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let document =
        Document::load_mem(bytes).map_err(|e| ScanError::DocumentError(e.to_string()))?;

    // get_pages is a BTreeMap keyed by page number, so iteration is in page order
    document
        .get_pages()
        .keys()
        .map(|&page_number| {
            document.extract_text(&[page_number]).map_err(|e| {
                ScanError::DocumentError(format!("page {}: {}", page_number, e))
            })
        })
        .collect()
}
