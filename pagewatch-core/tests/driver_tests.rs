// Tests for the watch driver, run against scripted renderers and fetchers

use async_trait::async_trait;
use pagewatch_core::crawl::{WatchOptions, Watcher};
use pagewatch_core::data::{RecordStore, SeedBook, SeedRow};
use pagewatch_core::detect::{ChangeDetector, Outcome};
use pagewatch_core::error::{Result, WatchError};
use pagewatch_core::fingerprint::{fingerprint, page_fingerprint};
use pagewatch_core::notify::Notifier;
use pagewatch_core::snapshot::{MemorySnapshotLog, SnapshotStore};
use pagewatch_scanner::error::Result as ScanResult;
use pagewatch_scanner::{DocumentFetcher, PageRenderer, RenderSession, ScanError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Clone, Default)]
struct FakePage {
    /// `None` means the page has no body element.
    body: Option<String>,
    hrefs: Vec<String>,
    fail_navigation: bool,
    hang: bool,
    /// A dialog that blocks body text until dismissed.
    dialog: bool,
    /// A dialog that survives dismissal.
    sticky_dialog: bool,
    stale_anchors: bool,
}

impl FakePage {
    fn with_body(body: &str) -> Self {
        Self {
            body: Some(body.to_string()),
            ..Default::default()
        }
    }

    fn links(mut self, hrefs: &[&str]) -> Self {
        self.hrefs = hrefs.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Default)]
struct FakeSite {
    pages: Mutex<HashMap<String, FakePage>>,
    visits: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl FakeSite {
    fn page(&self, url: &str, page: FakePage) {
        self.pages.lock().unwrap().insert(url.to_string(), page);
    }

    fn set_body(&self, url: &str, body: &str) {
        if let Some(page) = self.pages.lock().unwrap().get_mut(url) {
            page.body = Some(body.to_string());
        }
    }

    fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct FakeRenderer {
    site: Arc<FakeSite>,
    fail_open: bool,
}

struct FakeSession {
    site: Arc<FakeSite>,
    current: Option<(String, FakePage)>,
    dismissed: bool,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.site.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    type Session = FakeSession;

    async fn open(&self) -> ScanResult<FakeSession> {
        if self.fail_open {
            return Err(ScanError::Other("no browser".to_string()));
        }
        self.site.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            site: self.site.clone(),
            current: None,
            dismissed: false,
        })
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> ScanResult<()> {
        self.current = None;
        self.dismissed = false;
        self.site.visits.lock().unwrap().push(url.to_string());

        let page = self.site.pages.lock().unwrap().get(url).cloned();
        let Some(page) = page else {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: 404,
            });
        };
        if page.hang {
            std::future::pending::<()>().await;
        }
        if page.fail_navigation {
            return Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: 500,
            });
        }

        self.current = Some((url.to_string(), page));
        Ok(())
    }

    fn body_text(&self) -> ScanResult<String> {
        let Some((url, page)) = &self.current else {
            return Err(ScanError::StaleReference("nothing loaded".to_string()));
        };
        if page.sticky_dialog || (page.dialog && !self.dismissed) {
            return Err(ScanError::BlockingDialog(url.clone()));
        }
        page.body
            .clone()
            .ok_or_else(|| ScanError::NoSuchElement("body".to_string()))
    }

    fn anchor_hrefs(&self) -> ScanResult<Vec<String>> {
        let Some((url, page)) = &self.current else {
            return Err(ScanError::StaleReference("nothing loaded".to_string()));
        };
        if page.stale_anchors {
            return Err(ScanError::StaleReference(url.clone()));
        }
        Ok(page.hrefs.clone())
    }

    async fn dismiss_dialog(&mut self) {
        self.dismissed = true;
    }
}

#[derive(Clone, Default)]
struct FakeFetcher {
    documents: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl FakeFetcher {
    fn document(&self, url: &str, pages: &[&str]) {
        self.documents.lock().unwrap().insert(
            url.to_string(),
            pages.iter().map(|s| s.to_string()).collect(),
        );
    }
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch_document(&self, url: &str) -> ScanResult<Vec<u8>> {
        match self.documents.lock().unwrap().get(url) {
            Some(pages) => Ok(pages.join("\u{c}").into_bytes()),
            None => Err(ScanError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }

    fn extract_pages(&self, bytes: &[u8]) -> ScanResult<Vec<String>> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| ScanError::DocumentError(e.to_string()))?;
        if text == "corrupt" {
            return Err(ScanError::DocumentError("not a PDF".to_string()));
        }
        Ok(text.split('\u{c}').map(str::to_string).collect())
    }
}

#[derive(Clone, Default)]
struct CountingNotifier {
    alerts: Arc<Mutex<Vec<String>>>,
}

impl CountingNotifier {
    fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, _recipients: &[String], _subject: &str, body: &str) -> Result<()> {
        self.alerts.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

/// Record store whose checked-marking always fails.
struct ReadOnlyRecords {
    rows: Vec<SeedRow>,
}

impl RecordStore for ReadOnlyRecords {
    fn load_seed_rows(&self, _source_id: &str, sheet_index: usize) -> Result<Vec<SeedRow>> {
        if sheet_index == 0 {
            Ok(self.rows.clone())
        } else {
            Err(WatchError::Notify("sheet unavailable".to_string()))
        }
    }

    fn mark_rows_checked(
        &self,
        _source_id: &str,
        _sheet_index: usize,
        _rows: &[usize],
        _date: &str,
    ) -> Result<()> {
        Err(WatchError::Notify("read only".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

type TestWatcher = Watcher<FakeRenderer, FakeFetcher, MemorySnapshotLog, CountingNotifier>;

struct Harness {
    site: Arc<FakeSite>,
    fetcher: FakeFetcher,
    notifier: CountingNotifier,
    detector: Arc<ChangeDetector<MemorySnapshotLog, CountingNotifier>>,
}

impl Harness {
    fn new() -> Self {
        let notifier = CountingNotifier::default();
        let detector = ChangeDetector::new(
            SnapshotStore::load(MemorySnapshotLog::new()),
            notifier.clone(),
            vec!["ops@example.com".to_string()],
        )
        .shared();
        Self {
            site: Arc::new(FakeSite::default()),
            fetcher: FakeFetcher::default(),
            notifier,
            detector,
        }
    }

    fn watcher(&self, options: WatchOptions) -> TestWatcher {
        let renderer = FakeRenderer {
            site: self.site.clone(),
            fail_open: false,
        };
        Watcher::new(
            renderer,
            self.fetcher.clone(),
            self.detector.clone(),
            options,
        )
    }

    async fn logged(&self) -> usize {
        self.detector
            .with_store(|store| store.log().records().len())
            .await
    }
}

fn options() -> WatchOptions {
    let mut options = WatchOptions::new("agencies", 0..1);
    options.cooldown = Duration::ZERO;
    options
}

fn book(urls: &[&str]) -> SeedBook {
    let book = SeedBook::in_memory().unwrap();
    let rows: Vec<SeedRow> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| SeedRow::new(i, *url))
        .collect();
    book.import_sheet("agencies", 0, &["URL".to_string()], &rows)
        .unwrap();
    book
}

// ============================================================================
// Page Path Tests
// ============================================================================

#[tokio::test]
async fn test_page_seed_and_same_host_links_are_observed() {
    let harness = Harness::new();
    harness.site.page(
        "http://example.com/",
        FakePage::with_body("Home").links(&[
            "http://example.com/about",
            "http://other.com/x",
            "http://example.com/about",
            "http://example.com/contact",
        ]),
    );
    harness
        .site
        .page("http://example.com/about", FakePage::with_body("About us"));
    harness
        .site
        .page("http://example.com/contact", FakePage::with_body("Call us"));

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert_eq!(report.links_discovered, 2);
    assert_eq!(report.count(Outcome::Baseline), 3);
    assert!(report.skipped.is_empty());
    assert_eq!(
        harness.site.visits(),
        vec![
            "http://example.com/",
            "http://example.com/about",
            "http://example.com/contact"
        ]
    );
    assert_eq!(
        harness.detector.snapshot("http://example.com/about").await,
        Some(page_fingerprint("About us"))
    );
    assert_eq!(harness.logged().await, 3);
}

#[tokio::test]
async fn test_fan_out_cap_limits_links() {
    let harness = Harness::new();
    let hrefs: Vec<String> = (0..40)
        .map(|i| format!("http://example.com/p{}", i))
        .collect();
    let href_refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
    harness.site.page(
        "http://example.com/",
        FakePage::with_body("Index").links(&href_refs),
    );
    for href in &hrefs {
        harness.site.page(href, FakePage::with_body(href));
    }

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert_eq!(report.links_discovered, 31);
    assert_eq!(report.observations.len(), 32);
    assert!(!harness.site.visits().contains(&"http://example.com/p31".to_string()));
}

#[tokio::test]
async fn test_stale_anchors_end_link_discovery_only() {
    let harness = Harness::new();
    let mut page = FakePage::with_body("Home").links(&["http://example.com/a"]);
    page.stale_anchors = true;
    harness.site.page("http://example.com/", page);

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert_eq!(report.count(Outcome::Baseline), 1);
    assert_eq!(report.links_discovered, 0);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_missing_body_abandons_seed() {
    let harness = Harness::new();
    let mut page = FakePage::default().links(&["http://example.com/a"]);
    page.body = None;
    harness.site.page("http://example.com/", page);
    harness
        .site
        .page("http://example.com/a", FakePage::with_body("A"));

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert!(report.observations.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(harness.site.visits(), vec!["http://example.com/"]);
    assert_eq!(harness.logged().await, 0);
}

#[tokio::test]
async fn test_blocking_dialog_is_dismissed_once() {
    let harness = Harness::new();
    harness.site.page(
        "http://example.com/",
        FakePage::with_body("Home").links(&["http://example.com/alert", "http://example.com/stuck"]),
    );
    let mut alert = FakePage::with_body("Behind the dialog");
    alert.dialog = true;
    harness.site.page("http://example.com/alert", alert);
    let mut stuck = FakePage::with_body("Never readable");
    stuck.sticky_dialog = true;
    harness.site.page("http://example.com/stuck", stuck);

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert_eq!(
        harness.detector.snapshot("http://example.com/alert").await,
        Some(page_fingerprint("Behind the dialog"))
    );
    assert_eq!(harness.detector.snapshot("http://example.com/stuck").await, None);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].url, "http://example.com/stuck");
}

#[tokio::test]
async fn test_failed_link_does_not_stop_siblings() {
    let harness = Harness::new();
    harness.site.page(
        "http://example.com/",
        FakePage::with_body("Home").links(&[
            "http://example.com/broken",
            "http://example.com/missing",
            "http://example.com/ok",
        ]),
    );
    let mut broken = FakePage::with_body("x");
    broken.fail_navigation = true;
    harness.site.page("http://example.com/broken", broken);
    harness
        .site
        .page("http://example.com/ok", FakePage::with_body("fine"));

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert_eq!(report.count(Outcome::Baseline), 2);
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        skipped,
        vec!["http://example.com/broken", "http://example.com/missing"]
    );
    assert_eq!(harness.detector.snapshot("http://example.com/broken").await, None);
}

#[tokio::test]
async fn test_failed_seed_mutates_nothing() {
    let harness = Harness::new();

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/gone"))
        .await;

    assert!(report.observations.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("404"));
    assert_eq!(harness.detector.tracked_urls().await, 0);
    assert_eq!(harness.logged().await, 0);
}

#[tokio::test]
async fn test_renderer_unavailable_skips_seed() {
    let harness = Harness::new();
    let renderer = FakeRenderer {
        site: harness.site.clone(),
        fail_open: true,
    };
    let watcher = Watcher::new(
        renderer,
        harness.fetcher.clone(),
        harness.detector.clone(),
        options(),
    );

    let report = watcher
        .check_seed(&SeedRow::new(0, "http://example.com/"))
        .await;

    assert_eq!(report.skipped.len(), 1);
    assert!(harness.site.visits().is_empty());
}

#[tokio::test]
async fn test_session_released_on_every_path() {
    let harness = Harness::new();
    harness.site.page("http://example.com/ok", FakePage::with_body("ok"));
    let mut no_body = FakePage::default();
    no_body.body = None;
    harness.site.page("http://example.com/empty", no_body);

    let records = book(&[
        "http://example.com/ok",
        "http://example.com/empty",
        "http://example.com/gone",
    ]);
    harness.watcher(options()).run(&records).await.unwrap();

    assert_eq!(harness.site.opened.load(Ordering::SeqCst), 3);
    assert_eq!(harness.site.closed.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_navigation_times_out() {
    let harness = Harness::new();
    let mut hang = FakePage::with_body("never");
    hang.hang = true;
    harness.site.page("http://example.com/slow", hang);

    let mut opts = options();
    opts.render_timeout = Duration::from_secs(5);
    let report = harness
        .watcher(opts)
        .check_seed(&SeedRow::new(0, "http://example.com/slow"))
        .await;

    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].reason.contains("Timed out"));
    assert_eq!(harness.site.closed.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Document Path Tests
// ============================================================================

#[tokio::test]
async fn test_document_seed_stores_combined_fingerprint() {
    let harness = Harness::new();
    harness
        .fetcher
        .document("http://example.com/report.pdf", &["Foo", "Bar"]);

    let report = harness
        .watcher(options())
        .check_seed(&SeedRow::new(0, "http://example.com/report.pdf"))
        .await;

    assert_eq!(report.count(Outcome::Baseline), 1);
    assert_eq!(
        harness.detector.snapshot("http://example.com/report.pdf").await,
        Some(format!("{}{}", fingerprint("foo"), fingerprint("bar")))
    );
    assert_eq!(harness.logged().await, 1);
    assert_eq!(harness.site.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_document_failures_skip_url() {
    let harness = Harness::new();
    harness
        .fetcher
        .document("http://example.com/bad.pdf", &["corrupt"]);

    let watcher = harness.watcher(options());
    let missing = watcher
        .check_seed(&SeedRow::new(0, "http://example.com/missing.pdf"))
        .await;
    let corrupt = watcher
        .check_seed(&SeedRow::new(1, "http://example.com/bad.pdf"))
        .await;

    assert_eq!(missing.skipped.len(), 1);
    assert_eq!(corrupt.skipped.len(), 1);
    assert!(corrupt.skipped[0].reason.contains("not a PDF"));
    assert_eq!(harness.logged().await, 0);
}

// ============================================================================
// Pass Tests
// ============================================================================

#[tokio::test]
async fn test_second_pass_detects_change() {
    let harness = Harness::new();
    harness
        .site
        .page("http://example.com/a", FakePage::with_body("Hello   World\n"));
    let records = book(&["http://example.com/a"]);
    let watcher = harness.watcher(options());

    let first = watcher.run(&records).await.unwrap();
    assert_eq!(first[0].count(Outcome::Baseline), 1);

    harness.site.set_body("http://example.com/a", "Hello, World");
    let second = watcher.run(&records).await.unwrap();
    assert_eq!(second[0].count(Outcome::Unchanged), 1);
    assert_eq!(harness.notifier.count(), 0);

    harness.site.set_body("http://example.com/a", "Goodbye World");
    let third = watcher.run(&records).await.unwrap();
    assert_eq!(third[0].count(Outcome::Changed), 1);
    assert_eq!(harness.notifier.count(), 1);
    assert_eq!(harness.logged().await, 3);
}

#[tokio::test]
async fn test_run_marks_processed_rows_checked() {
    let harness = Harness::new();
    harness.site.page("http://example.com/a", FakePage::with_body("a"));
    let records = book(&["http://example.com/a", "  ", "http://example.com/gone"]);

    let passes = harness.watcher(options()).run(&records).await.unwrap();

    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].blank_rows, 1);
    assert_eq!(passes[0].rows_marked, vec![0, 2]);
    assert!(records.checked_date("agencies", 0, 0).unwrap().is_some());
    assert!(records.checked_date("agencies", 0, 1).unwrap().is_none());
    assert!(records.checked_date("agencies", 0, 2).unwrap().is_some());
}

#[tokio::test]
async fn test_mark_failure_is_reported_not_fatal() {
    let harness = Harness::new();
    harness.site.page("http://example.com/a", FakePage::with_body("a"));
    let records = ReadOnlyRecords {
        rows: vec![SeedRow::new(0, "http://example.com/a")],
    };

    let passes = harness.watcher(options()).run(&records).await.unwrap();

    assert_eq!(passes.len(), 1);
    assert!(passes[0].rows_marked.is_empty());
    assert_eq!(passes[0].count(Outcome::Baseline), 1);
}

#[tokio::test]
async fn test_unreadable_sheet_is_left_out() {
    let harness = Harness::new();
    harness.site.page("http://example.com/a", FakePage::with_body("a"));
    let records = ReadOnlyRecords {
        rows: vec![SeedRow::new(0, "http://example.com/a")],
    };

    let mut opts = options();
    opts.sheets = 0..3;
    let passes = harness.watcher(opts).run(&records).await.unwrap();

    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].sheet_index, 0);
}

#[tokio::test]
async fn test_empty_sheet_range_is_rejected() {
    let harness = Harness::new();
    let records = book(&[]);

    let mut opts = options();
    opts.sheets = 2..2;
    let result = harness.watcher(opts).run(&records).await;

    assert!(matches!(
        result,
        Err(WatchError::InvalidRange { start: 2, end: 2 })
    ));
}

#[tokio::test]
async fn test_worker_pool_reports_in_row_order() {
    let harness = Harness::new();
    let urls: Vec<String> = (0..6).map(|i| format!("http://site{}.example.com/", i)).collect();
    for url in &urls {
        harness.site.page(url, FakePage::with_body(url));
    }
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let records = book(&url_refs);

    let mut opts = options();
    opts.workers = 3;
    let passes = harness.watcher(opts).run(&records).await.unwrap();

    let rows: Vec<usize> = passes[0].seeds.iter().map(|s| s.row_index).collect();
    assert_eq!(rows, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(passes[0].count(Outcome::Baseline), 6);
    assert_eq!(harness.detector.tracked_urls().await, 6);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_between_seeds() {
    let harness = Harness::new();
    harness.site.page("http://example.com/a", FakePage::with_body("a"));
    harness.site.page("http://example.com/b", FakePage::with_body("b"));
    harness.site.page("http://example.com/c", FakePage::with_body("c"));
    let records = book(&[
        "http://example.com/a",
        "http://example.com/b",
        "http://example.com/c",
    ]);

    let mut opts = options();
    opts.cooldown = Duration::from_secs(60);
    let started = tokio::time::Instant::now();
    harness.watcher(opts).run(&records).await.unwrap();

    // Two pauses: none after the last seed.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(180));
}

#[tokio::test]
async fn test_progress_callback_receives_seed_messages() {
    let harness = Harness::new();
    harness.site.page("http://example.com/a", FakePage::with_body("a"));
    let records = book(&["http://example.com/a"]);
    let messages = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = messages.clone();

    harness
        .watcher(options())
        .with_progress_callback(Arc::new(move |msg: String| sink.lock().unwrap().push(msg)))
        .run(&records)
        .await
        .unwrap();

    let messages = messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.contains("http://example.com/a")));
}
