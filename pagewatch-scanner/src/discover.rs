use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Discovered links processed per seed page.
pub const FAN_OUT_CAP: usize = 31;

/// Same-host links from `hrefs`, deduplicated, first occurrence first,
/// at most `limit` of them.
///
/// Hosts are compared by the authority as written in each URL, ignoring
/// ASCII case: `docs.example.com` is not `example.com`, and neither is
/// `example.com:80`, even though it names the default port. The scheme is
/// not compared.
pub fn discover_links(page_url: &str, hrefs: &[String], limit: usize) -> Vec<String> {
    let Some(page_authority) = authority_of(page_url) else {
        debug!("Cannot discover links from unparseable URL {}", page_url);
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        if links.len() >= limit {
            break;
        }
        if authority_of(href).as_deref() != Some(page_authority.as_str()) {
            debug!("  -> {} is off-host, skipping", href);
            continue;
        }
        if seen.insert(href.as_str()) {
            links.push(href.clone());
        }
    }

    links
}

/// `Url` drops default ports once parsed, so the authority is sliced from
/// the raw string after the URL is known to have a host.
fn authority_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str()?;
    let (_, rest) = url.trim().split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    Some(rest[..end].to_ascii_lowercase())
}
