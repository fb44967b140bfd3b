//! PDF object graph access

pub mod content;
pub mod metadata;
pub mod pages;
pub mod resolve;
pub mod store;

// Re-export commonly used items
pub use content::get_content_bytes;
pub use metadata::{extract_metadata, PdfMetadata};
pub use pages::{collect_pages, get_page, leaf_count, page_count, PageNode};
pub use resolve::{follow_path, parse_path, resolve, resolve_reference, PathSegment};
pub use store::{DocumentStore, IndirectReference, ObjectStore, Trailer};
