use crate::error::Result;
use crate::fingerprint::{document_fingerprint, page_fingerprint};
use crate::notify::{CHANGE_ALERT_SUBJECT, Notifier, change_alert_body};
use crate::snapshot::{SnapshotLog, SnapshotStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What one observation of a URL amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// First time this URL was seen; recorded without an alert.
    Baseline,
    Unchanged,
    Changed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Baseline => "baseline",
            Outcome::Unchanged => "unchanged",
            Outcome::Changed => "changed",
        }
    }
}

/// Compares fingerprints against the snapshot store, alerts on change and
/// logs every observation.
///
/// Shared between crawl workers; the store sits behind one async mutex so
/// compare-and-set and the log append for a URL happen as a unit.
pub struct ChangeDetector<L, N> {
    store: Mutex<SnapshotStore<L>>,
    notifier: N,
    recipients: Vec<String>,
}

impl<L: SnapshotLog, N: Notifier> ChangeDetector<L, N> {
    pub fn new(store: SnapshotStore<L>, notifier: N, recipients: Vec<String>) -> Self {
        Self {
            store: Mutex::new(store),
            notifier,
            recipients,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Observe a page's body text.
    pub async fn observe_page(&self, url: &str, body_text: &str) -> Result<Outcome> {
        self.observe(url, &page_fingerprint(body_text)).await
    }

    /// Observe a document's per-page texts.
    pub async fn observe_document<S: AsRef<str>>(&self, url: &str, pages: &[S]) -> Result<Outcome> {
        self.observe(url, &document_fingerprint(pages)).await
    }

    /// Record `value` as the current fingerprint of `url`.
    ///
    /// The log append happens on every call and the in-memory mapping only
    /// moves once the append succeeded, so a failed append leaves the old
    /// value in place and the same content is reported again next time.
    /// A detected change is alerted even when the append failed. The alert
    /// is sent after the store is released; a failed alert is logged and
    /// does not undo the update.
    pub async fn observe(&self, url: &str, value: &str) -> Result<Outcome> {
        let (outcome, logged) = {
            let mut store = self.store.lock().await;
            let outcome = match store.get(url) {
                None => Outcome::Baseline,
                Some(previous) if previous == value => Outcome::Unchanged,
                Some(_) => Outcome::Changed,
            };
            let logged = store.append(url, value);
            if logged.is_ok() {
                store.compare_and_set(url, value);
            }
            (outcome, logged)
        };

        match outcome {
            Outcome::Changed => {
                info!("[X] CHANGED ==> {}", url);
                let body = change_alert_body(url, value);
                if let Err(e) = self
                    .notifier
                    .notify(&self.recipients, CHANGE_ALERT_SUBJECT, &body)
                    .await
                {
                    warn!("Change alert for {} not delivered: {}", url, e);
                }
            }
            Outcome::Unchanged => debug!("[-] SAME ==> {}", url),
            Outcome::Baseline => debug!("[+] NEW ==> {}", url),
        }

        if let Err(e) = logged {
            warn!("Snapshot for {} not recorded: {}", url, e);
            return Err(e);
        }

        Ok(outcome)
    }

    pub async fn snapshot(&self, url: &str) -> Option<String> {
        self.store.lock().await.get(url).map(str::to_string)
    }

    pub async fn tracked_urls(&self) -> usize {
        self.store.lock().await.len()
    }

    /// Run `f` with the store locked, e.g. to inspect the log in tests.
    pub async fn with_store<T>(&self, f: impl FnOnce(&SnapshotStore<L>) -> T) -> T {
        f(&*self.store.lock().await)
    }
}
