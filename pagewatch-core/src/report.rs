// Pass reports: what each seed row produced during one pass over a sheet

use crate::detect::Outcome;
use pagewatch_scanner::UrlKind;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlObservation {
    pub url: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedReport {
    pub row_index: usize,
    pub url: String,
    pub kind: UrlKind,
    pub links_discovered: usize,
    pub observations: Vec<UrlObservation>,
    pub skipped: Vec<SkippedUrl>,
}

impl SeedReport {
    pub fn new(row_index: usize, url: &str) -> Self {
        Self {
            row_index,
            url: url.to_string(),
            kind: UrlKind::classify(url),
            links_discovered: 0,
            observations: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn observed(&mut self, url: &str, outcome: Outcome) {
        self.observations.push(UrlObservation {
            url: url.to_string(),
            outcome,
        });
    }

    pub fn skip(&mut self, url: &str, reason: impl ToString) {
        self.skipped.push(SkippedUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.observations
            .iter()
            .filter(|o| o.outcome == outcome)
            .count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub source_id: String,
    pub sheet_index: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub seeds: Vec<SeedReport>,
    /// Rows annotated as checked in the record store.
    pub rows_marked: Vec<usize>,
    pub blank_rows: usize,
}

impl PassReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.seeds.iter().map(|s| s.count(outcome)).sum()
    }

    pub fn skipped(&self) -> usize {
        self.seeds.iter().map(|s| s.skipped.len()).sum()
    }

    pub fn changes(&self) -> impl Iterator<Item = &UrlObservation> {
        self.seeds
            .iter()
            .flat_map(|s| s.observations.iter())
            .filter(|o| o.outcome == Outcome::Changed)
    }
}

pub fn generate_text_report(passes: &[PassReport]) -> String {
    let mut report = String::new();

    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report.push_str("                    PAGEWATCH PASS REPORT\n");
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    for pass in passes {
        report.push_str(&format!("## {} sheet {}\n", pass.source_id, pass.sheet_index));
        report.push_str(&format!("  Started:    {}\n", format_timestamp(pass.start_time)));
        report.push_str(&format!(
            "  Duration:   {} seconds\n",
            pass.end_time - pass.start_time
        ));
        report.push_str(&format!("  Seeds:      {}\n", pass.seeds.len()));
        if pass.blank_rows > 0 {
            report.push_str(&format!("  Blank rows: {}\n", pass.blank_rows));
        }
        report.push_str(&format!("  Baseline:   {}\n", pass.count(Outcome::Baseline)));
        report.push_str(&format!("  Unchanged:  {}\n", pass.count(Outcome::Unchanged)));
        report.push_str(&format!("  Changed:    {}\n", pass.count(Outcome::Changed)));
        report.push_str(&format!("  Skipped:    {}\n", pass.skipped()));
        report.push_str(&format!("  Marked:     {} rows\n\n", pass.rows_marked.len()));

        let changes: Vec<_> = pass.changes().collect();
        if !changes.is_empty() {
            report.push_str("  Changed URLs:\n");
            for change in changes {
                report.push_str(&format!("    \x1b[31m✗\x1b[0m {}\n", change.url));
            }
            report.push('\n');
        }

        let skipped: Vec<_> = pass.seeds.iter().flat_map(|s| s.skipped.iter()).collect();
        if !skipped.is_empty() {
            report.push_str("  Skipped URLs:\n");
            for skip in skipped {
                report.push_str(&format!(
                    "    \x1b[33m⚠\x1b[0m {} \x1b[90m{}\x1b[0m\n",
                    skip.url, skip.reason
                ));
            }
            report.push('\n');
        }
    }

    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report
}

pub fn generate_json_report(passes: &[PassReport]) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "pagewatch",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "summary": {
                "passes": passes.len(),
                "baseline": passes.iter().map(|p| p.count(Outcome::Baseline)).sum::<usize>(),
                "unchanged": passes.iter().map(|p| p.count(Outcome::Unchanged)).sum::<usize>(),
                "changed": passes.iter().map(|p| p.count(Outcome::Changed)).sum::<usize>(),
                "skipped": passes.iter().map(|p| p.skipped()).sum::<usize>()
            },
            "passes": passes
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
