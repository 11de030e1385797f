use crate::data::{RecordStore, SeedRow};
use crate::detect::{ChangeDetector, Outcome};
use crate::error::{Result, WatchError};
use crate::notify::Notifier;
use crate::report::{PassReport, SeedReport};
use crate::snapshot::SnapshotLog;
use chrono::{Local, Utc};
use pagewatch_scanner::error::Result as ScanResult;
use pagewatch_scanner::{
    DocumentFetcher, FAN_OUT_CAP, PageRenderer, RenderSession, ScanError, UrlKind, discover_links,
};
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Options for configuring a watch pass
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub source_id: String,
    /// Sheet indices to process, end exclusive
    pub sheets: Range<usize>,
    pub workers: usize,
    /// Pause a worker takes between two seeds
    pub cooldown: Duration,
    /// Upper bound on a single page navigation
    pub render_timeout: Duration,
    /// Discovered links processed per seed page
    pub fan_out: usize,
}

impl WatchOptions {
    pub fn new(source_id: impl Into<String>, sheets: Range<usize>) -> Self {
        Self {
            source_id: source_id.into(),
            sheets,
            workers: 1,
            cooldown: Duration::from_secs(60),
            render_timeout: Duration::from_secs(60),
            fan_out: FAN_OUT_CAP,
        }
    }
}

/// Callback for reporting watch progress
pub type WatchProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Drives seed rows through the change detector.
///
/// Page seeds are rendered in their own session, observed, and then their
/// same-host links are observed in that session. Document seeds are fetched
/// once and fingerprinted per internal page. Every failure is local to the
/// URL or subtree it happened in.
pub struct Watcher<R, F, L, N> {
    renderer: Arc<R>,
    fetcher: Arc<F>,
    detector: Arc<ChangeDetector<L, N>>,
    options: Arc<WatchOptions>,
    progress: Option<WatchProgressCallback>,
}

impl<R, F, L, N> Clone for Watcher<R, F, L, N> {
    fn clone(&self) -> Self {
        Self {
            renderer: self.renderer.clone(),
            fetcher: self.fetcher.clone(),
            detector: self.detector.clone(),
            options: self.options.clone(),
            progress: self.progress.clone(),
        }
    }
}

impl<R, F, L, N> Watcher<R, F, L, N>
where
    R: PageRenderer + 'static,
    F: DocumentFetcher + 'static,
    L: SnapshotLog + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        renderer: R,
        fetcher: F,
        detector: Arc<ChangeDetector<L, N>>,
        options: WatchOptions,
    ) -> Self {
        Self {
            renderer: Arc::new(renderer),
            fetcher: Arc::new(fetcher),
            detector,
            options: Arc::new(options),
            progress: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: WatchProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn detector(&self) -> &Arc<ChangeDetector<L, N>> {
        &self.detector
    }

    /// Run one pass per sheet in the configured range.
    ///
    /// A sheet that cannot be read is logged and left out of the result.
    pub async fn run<S: RecordStore>(&self, records: &S) -> Result<Vec<PassReport>> {
        let sheets = self.options.sheets.clone();
        if sheets.is_empty() {
            return Err(WatchError::InvalidRange {
                start: sheets.start,
                end: sheets.end,
            });
        }

        let mut passes = Vec::new();
        for sheet_index in sheets {
            match self.run_sheet(records, sheet_index).await {
                Ok(pass) => passes.push(pass),
                Err(e) => warn!("Sheet {} skipped: {}", sheet_index, e),
            }
        }

        Ok(passes)
    }

    /// Check every row of one sheet, then mark the processed rows checked
    /// in a single call.
    pub async fn run_sheet<S: RecordStore>(
        &self,
        records: &S,
        sheet_index: usize,
    ) -> Result<PassReport> {
        let source_id = &self.options.source_id;
        info!("[***] Reading seeds from {} sheet {}", source_id, sheet_index);

        let start_time = Utc::now().timestamp();
        let rows = records.load_seed_rows(source_id, sheet_index)?;
        let (rows, blank): (Vec<SeedRow>, Vec<SeedRow>) =
            rows.into_iter().partition(|row| !row.url.trim().is_empty());
        for row in &blank {
            warn!("Row {} of sheet {} has no URL", row.row_index, sheet_index);
        }

        let seeds = self.check_seeds(rows).await?;

        let checked: Vec<usize> = seeds.iter().map(|s| s.row_index).collect();
        let date = Local::now().format("%Y-%m-%d").to_string();
        let rows_marked = match records.mark_rows_checked(source_id, sheet_index, &checked, &date)
        {
            Ok(()) => checked,
            Err(e) => {
                warn!("Could not mark rows of sheet {} checked: {}", sheet_index, e);
                Vec::new()
            }
        };

        let pass = PassReport {
            source_id: source_id.clone(),
            sheet_index,
            start_time,
            end_time: Utc::now().timestamp(),
            seeds,
            rows_marked,
            blank_rows: blank.len(),
        };
        info!(
            "Sheet {} done: {} changed, {} skipped",
            sheet_index,
            pass.count(Outcome::Changed),
            pass.skipped()
        );
        Ok(pass)
    }

    /// Spread `rows` over the worker pool. Reports come back in row order.
    async fn check_seeds(&self, rows: Vec<SeedRow>) -> Result<Vec<SeedReport>> {
        let total = rows.len();
        let workers = self.options.workers.clamp(1, total.max(1));
        let queue: Arc<Mutex<VecDeque<SeedRow>>> = Arc::new(Mutex::new(rows.into()));
        let results: Arc<Mutex<Vec<SeedReport>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));

        let mut worker_handles = Vec::new();
        for worker_id in 0..workers {
            let watcher = self.clone();
            let queue = queue.clone();
            let results = results.clone();

            let handle = tokio::spawn(async move {
                debug!("Worker {} started", worker_id);
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(row) = next else {
                        break;
                    };

                    let report = watcher.check_seed(&row).await;
                    results.lock().await.push(report);

                    let cooldown = watcher.options.cooldown;
                    if !cooldown.is_zero() && !queue.lock().await.is_empty() {
                        debug!("Worker {} cooling down for {:?}", worker_id, cooldown);
                        tokio::time::sleep(cooldown).await;
                    }
                }
                debug!("Worker {} finished", worker_id);
            });

            worker_handles.push(handle);
        }

        for handle in worker_handles {
            handle.await?;
        }

        let mut reports = std::mem::take(&mut *results.lock().await);
        reports.sort_by_key(|r| r.row_index);
        Ok(reports)
    }

    /// Check one seed row and everything hanging off it.
    pub async fn check_seed(&self, row: &SeedRow) -> SeedReport {
        let url = row.url.trim();
        let mut report = SeedReport::new(row.row_index, url);
        self.report_progress(format!("[{}] Working on {} ...", row.row_index, url));

        match report.kind {
            UrlKind::Document => self.check_document(url, &mut report).await,
            UrlKind::Page => self.check_page(url, &mut report).await,
        }

        report
    }

    async fn check_document(&self, url: &str, report: &mut SeedReport) {
        let pages = match self.fetch_document_pages(url).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Skipping document {}: {}", url, e);
                report.skip(url, e);
                return;
            }
        };

        debug!("{} has {} pages", url, pages.len());
        match self.detector.observe_document(url, &pages).await {
            Ok(outcome) => report.observed(url, outcome),
            Err(e) => {
                warn!("Could not record {}: {}", url, e);
                report.skip(url, e);
            }
        }
    }

    async fn fetch_document_pages(&self, url: &str) -> ScanResult<Vec<String>> {
        let bytes = self.fetcher.fetch_document(url).await?;
        self.fetcher.extract_pages(&bytes)
    }

    async fn check_page(&self, url: &str, report: &mut SeedReport) {
        // Dropped on every return below, which releases the renderer.
        let mut session = match self.renderer.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open a renderer for {}: {}", url, e);
                report.skip(url, e);
                return;
            }
        };

        if let Err(e) = self.navigate(&mut session, url).await {
            if e.is_fetch_failure() {
                warn!("Skipping {}: {}", url, e);
            } else {
                warn!("Render failure on {}: {}", url, e);
            }
            report.skip(url, e);
            return;
        }

        // Without a body there is nothing to observe and no links to follow.
        let body = match session.body_text() {
            Ok(body) => body,
            Err(e) => {
                debug!("Abandoning {}: {}", url, e);
                report.skip(url, e);
                return;
            }
        };
        self.observe_page(url, &body, report).await;

        let hrefs = match session.anchor_hrefs() {
            Ok(hrefs) => hrefs,
            Err(ScanError::StaleReference(msg)) => {
                warn!("[!] Stale page reference on {}: {}", url, msg);
                Vec::new()
            }
            Err(e) => {
                warn!("Could not enumerate links on {}: {}", url, e);
                Vec::new()
            }
        };

        let links = discover_links(url, &hrefs, self.options.fan_out);
        report.links_discovered = links.len();
        debug!("{} same-host links on {}", links.len(), url);

        for link in &links {
            self.report_progress(format!("  -> {}", link));

            if let Err(e) = self.navigate(&mut session, link).await {
                debug!("Skipping link {}: {}", link, e);
                report.skip(link, e);
                continue;
            }

            match self.body_text_with_retry(&mut session, link).await {
                Ok(body) => self.observe_page(link, &body, report).await,
                Err(e) => {
                    debug!("Skipping link {}: {}", link, e);
                    report.skip(link, e);
                }
            }
        }
    }

    async fn navigate(&self, session: &mut R::Session, url: &str) -> ScanResult<()> {
        let limit = self.options.render_timeout;
        match tokio::time::timeout(limit, session.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout(limit, url.to_string())),
        }
    }

    /// A blocking dialog gets dismissed once before giving up on the page.
    async fn body_text_with_retry(&self, session: &mut R::Session, url: &str) -> ScanResult<String> {
        match session.body_text() {
            Err(ScanError::BlockingDialog(_)) => {
                debug!("Dismissing dialog on {}", url);
                session.dismiss_dialog().await;
                session.body_text()
            }
            other => other,
        }
    }

    async fn observe_page(&self, url: &str, body: &str, report: &mut SeedReport) {
        match self.detector.observe_page(url, body).await {
            Ok(outcome) => report.observed(url, outcome),
            Err(e) => {
                warn!("Could not record {}: {}", url, e);
                report.skip(url, e);
            }
        }
    }

    fn report_progress(&self, message: String) {
        if let Some(ref callback) = self.progress {
            callback(message);
        }
    }
}
