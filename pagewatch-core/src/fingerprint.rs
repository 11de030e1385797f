use crate::normalize::normalize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the UTF-8 bytes of `text`.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a rendered page's body text.
pub fn page_fingerprint(body_text: &str) -> String {
    fingerprint(&normalize(body_text))
}

/// Per-page fingerprints of a document, concatenated in page order.
///
/// Not a hash of the whole document: the stored value grows by 64 hex
/// characters per page.
pub fn document_fingerprint<S: AsRef<str>>(pages: &[S]) -> String {
    pages
        .iter()
        .map(|page| page_fingerprint(page.as_ref()))
        .collect()
}
