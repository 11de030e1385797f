use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pagewatch_core::crawl::{WatchOptions, WatchProgressCallback, Watcher};
use pagewatch_core::data::{METADATA_COLUMNS, RecordStore, SeedBook, SeedRow};
use pagewatch_core::detect::{ChangeDetector, Outcome};
use pagewatch_core::notify::{LogNotifier, Notifier, WebhookNotifier};
use pagewatch_core::report::{
    PassReport, ReportFormat, generate_json_report, generate_text_report, save_report,
};
use pagewatch_core::snapshot::{CsvSnapshotLog, SnapshotLog, SnapshotStore};
use pagewatch_scanner::{HttpDocumentFetcher, HttpRenderer};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const SEED_BOOK_FILE: &str = "seeds.db";
pub const SNAPSHOT_LOG_FILE: &str = "snapshots.csv";

/// Files kept under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub dir: PathBuf,
    pub seed_book: PathBuf,
    pub snapshot_log: PathBuf,
}

impl DataPaths {
    /// Expands a leading `~` in `dir`.
    pub fn resolve(dir: &str) -> Self {
        let expanded = shellexpand::tilde(dir);
        let dir = PathBuf::from(expanded.as_ref());
        Self {
            seed_book: dir.join(SEED_BOOK_FILE),
            snapshot_log: dir.join(SNAPSHOT_LOG_FILE),
            dir,
        }
    }

    fn from_args(args: &ArgMatches, id: &str) -> Self {
        let dir = args
            .get_one::<String>(id)
            .map(String::as_str)
            .unwrap_or("~/.config/pagewatch/");
        Self::resolve(dir)
    }
}

/// A sheet read from a CSV file: its header row and its data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<SeedRow>,
}

/// Load a seed sheet from a CSV file with a header row.
///
/// The first column is the URL, the next four are metadata. Rows whose URL
/// cannot be parsed are kept blank so row positions stay aligned with the
/// file; blank rows are skipped when the sheet is run.
pub fn load_seed_rows_from_file(path: &Path) -> Result<SeedSheet, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("Failed to read seed file {}: {}", path.display(), e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("Failed to read header of {}: {}", path.display(), e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_index, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| format!("Failed to read row {} of {}: {}", row_index + 1, path.display(), e))?;

        let cell = record.get(0).unwrap_or("").trim();
        let url = if cell.is_empty() {
            String::new()
        } else {
            parse_url_line(cell).unwrap_or_default()
        };

        let mut metadata: [String; METADATA_COLUMNS] = Default::default();
        for (i, slot) in metadata.iter_mut().enumerate() {
            *slot = record.get(i + 1).unwrap_or("").to_string();
        }

        rows.push(SeedRow::new(row_index, url).with_metadata(metadata));
    }

    if rows.iter().all(|row| row.url.is_empty()) {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(SeedSheet { headers, rows })
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if Url::parse(line).is_ok() {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

/// Render passes in the requested format.
pub fn render_report(passes: &[PassReport], format: ReportFormat) -> Result<String, String> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(passes)),
        ReportFormat::Json => {
            generate_json_report(passes).map_err(|e| format!("Failed to build JSON report: {}", e))
        }
    }
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> String {
    print!("{} ", msg.bright_cyan().bold());
    let _ = io::stdout().flush();
    let mut response = String::new();
    if io::stdin().read_line(&mut response).is_err() {
        return String::new();
    }
    response.trim().to_lowercase()
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "✗".red().bold(), msg);
    std::process::exit(1);
}

fn open_seed_book(paths: &DataPaths) -> SeedBook {
    if !SeedBook::exists(&paths.seed_book) {
        fail(format!(
            "No seed book at {}. Run `pagewatch init` first.",
            paths.seed_book.display()
        ));
    }
    SeedBook::new(&paths.seed_book).unwrap_or_else(|e| fail(e))
}

pub fn handle_init(args: &ArgMatches) {
    print_divider();
    println!("{}", "  PAGEWATCH INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let paths = DataPaths::from_args(args, "PATH");
    let force = args.get_flag("force");

    println!(
        "{} Target: {}",
        "→".blue(),
        paths.dir.display().to_string().bright_white()
    );
    println!();

    let existing: Vec<&PathBuf> = [&paths.seed_book, &paths.snapshot_log]
        .into_iter()
        .filter(|p| p.exists())
        .collect();

    if !existing.is_empty() && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("Existing pagewatch data found:");
        for path in &existing {
            println!(
                "  {} {}",
                "•".yellow(),
                path.display().to_string().bright_white()
            );
        }
        println!();
        println!(
            "{}",
            "Overwriting discards every seed and every stored fingerprint.".yellow()
        );

        let response = print_prompt("Do you want to continue? [y/N]:");
        println!();

        if response != "y" && response != "yes" {
            println!("{} Initialization cancelled.", "✗".red().bold());
            return;
        }
    }

    if let Err(e) = fs::create_dir_all(&paths.dir) {
        fail(format!("Failed to create {}: {}", paths.dir.display(), e));
    }

    for path in &existing {
        match fs::remove_file(path) {
            Ok(()) => println!(
                "{} Removed {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            ),
            Err(e) => fail(format!("Failed to remove {}: {}", path.display(), e)),
        }
    }

    println!("{} Creating seed book...", "→".blue());
    if let Err(e) = SeedBook::new(&paths.seed_book) {
        fail(format!("Failed to create seed book: {}", e));
    }

    if let Err(e) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.snapshot_log)
    {
        fail(format!("Failed to create snapshot log: {}", e));
    }

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Seed book: {}",
        "✓".green().bold(),
        paths.seed_book.display().to_string().bright_white()
    );
    println!(
        "{} Snapshot log: {}",
        "✓".green().bold(),
        paths.snapshot_log.display().to_string().bright_white()
    );
    println!();
}

pub fn handle_seeds_import(args: &ArgMatches) {
    let paths = DataPaths::from_args(args, "data-dir");
    let Some(source_id) = args.get_one::<String>("source") else {
        fail("--source is required");
    };
    let Some(&sheet_index) = args.get_one::<usize>("sheet") else {
        fail("--sheet is required");
    };
    let Some(file) = args.get_one::<PathBuf>("file") else {
        fail("--file is required");
    };

    let sheet = load_seed_rows_from_file(file).unwrap_or_else(|e| fail(e));
    let book = open_seed_book(&paths);

    if let Err(e) = book.import_sheet(source_id, sheet_index, &sheet.headers, &sheet.rows) {
        fail(format!("Import failed: {}", e));
    }

    let blank = sheet.rows.iter().filter(|r| r.url.is_empty()).count();
    println!(
        "{} Imported {} rows into {} sheet {}",
        "✓".green().bold(),
        sheet.rows.len().to_string().cyan(),
        source_id.bright_white(),
        sheet_index
    );
    if blank > 0 {
        println!(
            "{} {} rows have no usable URL and will be skipped",
            "⚠".yellow(),
            blank
        );
    }
}

pub fn handle_seeds_list(args: &ArgMatches) {
    let paths = DataPaths::from_args(args, "data-dir");
    let Some(source_id) = args.get_one::<String>("source") else {
        fail("--source is required");
    };
    let book = open_seed_book(&paths);

    let sheets = match args.get_one::<usize>("sheet") {
        Some(&sheet) => vec![sheet],
        None => book.sheet_indices(source_id).unwrap_or_else(|e| fail(e)),
    };

    if sheets.is_empty() {
        println!("No sheets imported for {}", source_id.bright_white());
        return;
    }

    for sheet_index in sheets {
        let rows = book
            .load_seed_rows(source_id, sheet_index)
            .unwrap_or_else(|e| fail(e));

        println!();
        println!(
            "{} {} sheet {} ({} rows)",
            "##".bright_blue().bold(),
            source_id.bright_white(),
            sheet_index,
            rows.len()
        );

        for row in rows {
            let checked = book
                .checked_date(source_id, sheet_index, row.row_index)
                .ok()
                .flatten()
                .unwrap_or_else(|| "never".to_string());
            let url = if row.url.is_empty() {
                "(blank)".dimmed().to_string()
            } else {
                row.url.clone()
            };
            let label = row.metadata[0].trim();

            println!(
                "  {:>4} {} {} {}",
                row.row_index.to_string().cyan(),
                url,
                label.bright_black(),
                format!("[checked: {}]", checked).bright_black()
            );
        }
    }
}

/// Everything a pass needs apart from the notifier.
struct RunSetup {
    paths: DataPaths,
    options: WatchOptions,
    fetch_timeout: u64,
    recipients: Vec<String>,
    progress: Option<WatchProgressCallback>,
}

async fn run_passes<N: Notifier + 'static>(
    notifier: N,
    setup: RunSetup,
) -> Result<Vec<PassReport>, String> {
    let renderer = HttpRenderer::with_timeout(setup.options.render_timeout.as_secs());
    let fetcher = HttpDocumentFetcher::with_timeout(setup.fetch_timeout)
        .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

    let store = SnapshotStore::load(CsvSnapshotLog::new(&setup.paths.snapshot_log));
    let detector = ChangeDetector::new(store, notifier, setup.recipients).shared();

    let mut watcher = Watcher::new(renderer, fetcher, detector, setup.options);
    if let Some(progress) = setup.progress {
        watcher = watcher.with_progress_callback(progress);
    }

    let book = open_seed_book(&setup.paths);
    watcher.run(&book).await.map_err(|e| e.to_string())
}

pub async fn handle_run(args: &ArgMatches, quiet: bool) {
    let paths = DataPaths::from_args(args, "data-dir");
    let Some(source_id) = args.get_one::<String>("source") else {
        fail("--source is required");
    };
    let start = args.get_one::<usize>("start").copied().unwrap_or(0);
    let Some(&end) = args.get_one::<usize>("end") else {
        fail("--end is required");
    };
    if start >= end {
        fail(format!("--start ({}) must be below --end ({})", start, end));
    }

    let mut options = WatchOptions::new(source_id.clone(), start..end);
    options.workers = args.get_one::<usize>("workers").copied().unwrap_or(1);
    options.cooldown = Duration::from_secs(args.get_one::<u64>("cooldown").copied().unwrap_or(60));
    options.render_timeout =
        Duration::from_secs(args.get_one::<u64>("render-timeout").copied().unwrap_or(60));
    options.fan_out = args
        .get_one::<usize>("fan-out")
        .copied()
        .unwrap_or(options.fan_out);
    let fetch_timeout = args.get_one::<u64>("fetch-timeout").copied().unwrap_or(60);

    let recipients: Vec<String> = args
        .get_many::<String>("recipient")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let webhook = args.get_one::<Url>("webhook").cloned();
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args.get_one::<PathBuf>("output");

    if !quiet {
        println!(
            "\n{} Watching {} sheets {}..{}",
            "→".blue(),
            source_id.bright_white(),
            start,
            end
        );
        println!("Workers: {}", options.workers);
        println!("Cooldown: {}s", options.cooldown.as_secs());
        println!("Links per seed: {}", options.fan_out);
        match &webhook {
            Some(url) => println!("Alerts: {}", url),
            None => println!("Alerts: log only"),
        }
        println!();
    }

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };

    let progress_bar = spinner.clone();
    let progress: WatchProgressCallback = Arc::new(move |msg: String| {
        progress_bar.set_message(msg);
    });

    let setup = RunSetup {
        paths,
        options,
        fetch_timeout,
        recipients,
        progress: Some(progress),
    };

    let result = match webhook {
        Some(endpoint) => match WebhookNotifier::new(endpoint) {
            Ok(notifier) => run_passes(notifier, setup).await,
            Err(e) => Err(e.to_string()),
        },
        None => run_passes(LogNotifier, setup).await,
    };
    spinner.finish_and_clear();

    let passes = match result {
        Ok(passes) => passes,
        Err(e) => fail(format!("Watch failed: {}", e)),
    };

    let report = render_report(&passes, format).unwrap_or_else(|e| fail(e));
    match output {
        Some(path) => match save_report(&report, path) {
            Ok(()) => println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            ),
            Err(e) => fail(format!("Failed to save report: {}", e)),
        },
        None => print!("{}", report),
    }

    let changed: usize = passes.iter().map(|p| p.count(Outcome::Changed)).sum();
    let skipped: usize = passes.iter().map(|p| p.skipped()).sum();
    println!(
        "\n{} {} sheets done: {} changed, {} skipped",
        "✓".green().bold(),
        passes.len(),
        changed.to_string().red().bold(),
        skipped.to_string().yellow()
    );
}

pub fn handle_status(args: &ArgMatches) {
    let paths = DataPaths::from_args(args, "data-dir");

    let mut log = CsvSnapshotLog::new(&paths.snapshot_log);
    let records = match log.load() {
        Ok(records) => records.len(),
        Err(e) => {
            println!(
                "{} Snapshot log unreadable ({}); the next run starts without prior data.",
                "⚠".yellow().bold(),
                e
            );
            return;
        }
    };

    let store = SnapshotStore::load(log);

    if let Some(url) = args.get_one::<String>("url") {
        match store.get(url) {
            Some(value) => println!("{}\n{}", url.bright_white(), value),
            None => println!("{} {} is not tracked yet", "→".blue(), url.bright_white()),
        }
        return;
    }

    println!(
        "{} {}",
        "Snapshot log:".blue(),
        paths.snapshot_log.display().to_string().bright_white()
    );
    println!("  Records:      {}", records.to_string().cyan());
    println!("  Tracked URLs: {}", store.len().to_string().cyan());
}
