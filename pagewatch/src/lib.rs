// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{DataPaths, SeedSheet, load_seed_rows_from_file, parse_url_line, render_report};

// Re-export the watch driver from pagewatch-core
pub use pagewatch_core::crawl::{WatchOptions, WatchProgressCallback, Watcher};
