pub mod crawl;
pub mod data;
pub mod detect;
pub mod error;
pub mod fingerprint;
pub mod normalize;
pub mod notify;
pub mod report;
pub mod snapshot;

pub use crawl::{WatchOptions, WatchProgressCallback, Watcher};
pub use data::{RecordStore, SeedBook, SeedRow};
pub use detect::{ChangeDetector, Outcome};
pub use error::WatchError;
pub use fingerprint::{document_fingerprint, fingerprint, page_fingerprint};
pub use normalize::normalize;
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use report::{PassReport, ReportFormat, SeedReport};
pub use snapshot::{CsvSnapshotLog, MemorySnapshotLog, SnapshotLog, SnapshotRecord, SnapshotStore};
