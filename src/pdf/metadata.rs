//! Document-level summary information

use lopdf::Object;

use crate::error::Result;
use crate::pdf::pages::{leaf_count, page_count};
use crate::pdf::resolve::{resolve, resolve_reference};
use crate::pdf::store::ObjectStore;

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Page count declared by the page tree root
    pub page_count: usize,
    /// Leaf pages actually reachable from the page tree root
    pub reachable_pages: usize,
    /// Number of entries in the cross-reference table
    pub xref_size: u32,
    /// Whether the trailer declares encryption
    pub encrypted: bool,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
}

/// Summarise a document: page counts, trailer facts and Info strings
///
/// A broken `Info` dictionary only leaves title and author empty.
pub fn extract_metadata<S: ObjectStore + ?Sized>(store: &S) -> Result<PdfMetadata> {
    let page_count = page_count(store)?;
    let reachable_pages = leaf_count(store)?;
    if reachable_pages != page_count {
        log::warn!(
            "Page tree declares {} pages but {} are reachable",
            page_count,
            reachable_pages
        );
    }

    let trailer = store.trailer();
    let mut title = None;
    let mut author = None;

    if let Some(info_ref) = trailer.info {
        if let Ok(info) = resolve_reference(store, info_ref) {
            if let Object::Dictionary(info_dict) = info.as_ref() {
                title = text_entry(store, info_dict.get(b"Title").ok());
                author = text_entry(store, info_dict.get(b"Author").ok());
            }
        }
    }

    Ok(PdfMetadata {
        page_count,
        reachable_pages,
        xref_size: trailer.size,
        encrypted: trailer.encrypt.is_some(),
        title,
        author,
    })
}

fn text_entry<S: ObjectStore + ?Sized>(store: &S, entry: Option<&Object>) -> Option<String> {
    let value = resolve(store, entry?).ok()?;
    match value.as_ref() {
        Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}
