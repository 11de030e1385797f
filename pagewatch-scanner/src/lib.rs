pub mod capability;
pub mod crawler;
pub mod discover;
pub mod document;
pub mod error;
pub mod result;

pub use capability::{DocumentFetcher, PageRenderer, RenderSession};
pub use crawler::{HttpRenderer, HttpSession};
pub use discover::{FAN_OUT_CAP, discover_links};
pub use document::HttpDocumentFetcher;
pub use error::ScanError;
pub use result::{RenderedPage, UrlKind};
