//! Object store over a parsed lopdf document
//!
//! lopdf handles header recognition, xref discovery and stream filters. The
//! store adds a session-wide memo cache on top, so that equal references
//! always come back as the same shared object.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// An (object number, generation) pair identifying an indirect object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndirectReference {
    pub object_number: u32,
    pub generation: u16,
}

impl IndirectReference {
    pub fn new(object_number: u32, generation: u16) -> Self {
        Self {
            object_number,
            generation,
        }
    }
}

impl From<ObjectId> for IndirectReference {
    fn from((object_number, generation): ObjectId) -> Self {
        Self::new(object_number, generation)
    }
}

impl From<IndirectReference> for ObjectId {
    fn from(reference: IndirectReference) -> Self {
        (reference.object_number, reference.generation)
    }
}

impl fmt::Display for IndirectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.object_number, self.generation)
    }
}

/// The document's terminal trailer
#[derive(Debug, Clone)]
pub struct Trailer {
    /// Number of entries in the cross-reference table
    pub size: u32,
    /// Reference to the document catalog
    pub root: IndirectReference,
    /// Byte offset of the previous xref section (not followed)
    pub prev: Option<i64>,
    /// Encryption dictionary, if the document declares one
    pub encrypt: Option<Object>,
    /// Reference to the document information dictionary
    pub info: Option<IndirectReference>,
    /// File identifiers
    pub id: Option<Vec<Vec<u8>>>,
}

impl Trailer {
    /// Read the trailer fields from a trailer dictionary
    ///
    /// `max_id` is used for `size` when the dictionary has no `Size` entry.
    pub fn from_dictionary(dict: &Dictionary, max_id: u32) -> Result<Self> {
        let root = match dict.get(b"Root") {
            Ok(Object::Reference(id)) => IndirectReference::from(*id),
            Ok(_) => {
                return Err(Error::InvalidStructure(
                    "Root in trailer is not a reference".to_string(),
                ))
            }
            Err(_) => return Err(Error::InvalidStructure("No Root in trailer".to_string())),
        };

        let size = match dict.get(b"Size") {
            Ok(Object::Integer(n)) if *n >= 0 => *n as u32,
            _ => max_id.saturating_add(1),
        };

        let prev = match dict.get(b"Prev") {
            Ok(Object::Integer(n)) => Some(*n),
            _ => None,
        };

        let info = match dict.get(b"Info") {
            Ok(Object::Reference(id)) => Some(IndirectReference::from(*id)),
            _ => None,
        };

        let id = match dict.get(b"ID") {
            Ok(Object::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Object::String(bytes, _) => Some(bytes.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        };

        Ok(Trailer {
            size,
            root,
            prev,
            encrypt: dict.get(b"Encrypt").ok().cloned(),
            info,
            id,
        })
    }
}

/// Source of indirect objects for one document-processing session
///
/// Implementations must be safe for concurrent reads: pages may be processed
/// on several worker threads at once.
pub trait ObjectStore: Send + Sync {
    /// Fetch the object stored under `reference`
    fn fetch(&self, reference: IndirectReference) -> Result<Arc<Object>>;

    /// The document trailer
    fn trailer(&self) -> &Trailer;

    /// Decoded bytes of a stream
    ///
    /// `reference` is the stream's own reference when it was reached through
    /// one, and lets implementations memoize the decoded bytes.
    fn decode_stream(
        &self,
        reference: Option<IndirectReference>,
        stream: &Stream,
    ) -> Result<Arc<[u8]>>;
}

/// [`ObjectStore`] backed by a fully loaded lopdf [`Document`]
pub struct DocumentStore {
    document: Document,
    trailer: Trailer,
    objects: RwLock<HashMap<IndirectReference, Arc<Object>>>,
    streams: RwLock<HashMap<IndirectReference, Arc<[u8]>>>,
}

impl DocumentStore {
    /// Wrap an already parsed document
    pub fn from_document(document: Document) -> Result<Self> {
        let trailer = Trailer::from_dictionary(&document.trailer, document.max_id)?;
        log::debug!(
            "Opened document with {} objects, root {}",
            document.objects.len(),
            trailer.root
        );

        Ok(Self {
            document,
            trailer,
            objects: RwLock::new(HashMap::new()),
            streams: RwLock::new(HashMap::new()),
        })
    }

    /// Parse a document from the full file content
    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        Self::from_document(Document::load_mem(bytes)?)
    }

    /// Parse a document from a file on disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        Self::from_document(Document::load(path)?)
    }

    /// The underlying lopdf document
    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl ObjectStore for DocumentStore {
    fn fetch(&self, reference: IndirectReference) -> Result<Arc<Object>> {
        if let Some(hit) = self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&reference)
        {
            return Ok(Arc::clone(hit));
        }

        let object = self
            .document
            .objects
            .get(&ObjectId::from(reference))
            .ok_or(Error::ObjectNotFound(reference))?;
        log::trace!("Cache miss for {}", reference);

        // Another reader may have filled the slot since the read lock was
        // released; keep whichever value got there first.
        let mut cache = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(
            cache
                .entry(reference)
                .or_insert_with(|| Arc::new(object.clone())),
        ))
    }

    fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    fn decode_stream(
        &self,
        reference: Option<IndirectReference>,
        stream: &Stream,
    ) -> Result<Arc<[u8]>> {
        if let Some(reference) = reference {
            if let Some(hit) = self
                .streams
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&reference)
            {
                return Ok(Arc::clone(hit));
            }
        }

        let bytes: Arc<[u8]> = if stream.dict.get(b"Filter").is_ok() {
            stream
                .decompressed_content()
                .map_err(|e| Error::Decode {
                    reference,
                    message: e.to_string(),
                })?
                .into()
        } else {
            stream.content.as_slice().into()
        };

        match reference {
            Some(reference) => {
                let mut cache = self.streams.write().unwrap_or_else(PoisonError::into_inner);
                Ok(Arc::clone(cache.entry(reference).or_insert(bytes)))
            }
            None => Ok(bytes),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn document_with_root() -> Document {
        let mut doc = Document::with_version("1.5");
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    #[test]
    fn test_reference_display_and_conversion() {
        let reference = IndirectReference::new(12, 0);
        assert_eq!(reference.to_string(), "12 0 R");
        assert_eq!(ObjectId::from(reference), (12, 0));
        assert_eq!(IndirectReference::from((3, 1)), IndirectReference::new(3, 1));
    }

    #[test]
    fn test_trailer_requires_root() {
        let result = Trailer::from_dictionary(&Dictionary::new(), 0);
        assert!(matches!(result, Err(Error::InvalidStructure(_))));

        let mut dict = Dictionary::new();
        dict.set("Root", Object::Integer(1));
        let result = Trailer::from_dictionary(&dict, 0);
        assert!(matches!(result, Err(Error::InvalidStructure(_))));
    }

    #[test]
    fn test_trailer_fields() {
        let mut dict = Dictionary::new();
        dict.set("Root", Object::Reference((1, 0)));
        dict.set("Info", Object::Reference((7, 0)));
        dict.set("Prev", Object::Integer(1024));
        dict.set(
            "ID",
            Object::Array(vec![
                Object::string_literal("abc"),
                Object::string_literal("def"),
            ]),
        );

        let trailer = Trailer::from_dictionary(&dict, 9).unwrap();
        assert_eq!(trailer.root, IndirectReference::new(1, 0));
        assert_eq!(trailer.info, Some(IndirectReference::new(7, 0)));
        assert_eq!(trailer.prev, Some(1024));
        assert_eq!(trailer.size, 10);
        assert_eq!(trailer.id, Some(vec![b"abc".to_vec(), b"def".to_vec()]));
        assert!(trailer.encrypt.is_none());
    }

    #[test]
    fn test_fetch_is_memoized() {
        let mut doc = document_with_root();
        let font_id = doc.add_object(dictionary! { "Type" => "Font" });
        let store = DocumentStore::from_document(doc).unwrap();

        let first = store.fetch(font_id.into()).unwrap();
        let second = store.fetch(font_id.into()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_fetch_missing_object() {
        let store = DocumentStore::from_document(document_with_root()).unwrap();
        let missing = IndirectReference::new(999, 0);

        match store.fetch(missing) {
            Err(Error::ObjectNotFound(reference)) => assert_eq!(reference, missing),
            other => panic!("expected ObjectNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unfiltered_stream() {
        let store = DocumentStore::from_document(document_with_root()).unwrap();
        let stream = Stream::new(Dictionary::new(), b"q\nQ".to_vec());

        let bytes = store.decode_stream(None, &stream).unwrap();
        assert_eq!(&bytes[..], b"q\nQ");
    }

    #[test]
    fn test_decode_unsupported_filter_is_decode_error() {
        let store = DocumentStore::from_document(document_with_root()).unwrap();
        let stream = Stream::new(
            dictionary! { "Filter" => "NoSuchDecode" },
            b"q\nQ".to_vec(),
        );

        let result = store.decode_stream(Some(IndirectReference::new(4, 0)), &stream);
        assert!(matches!(result, Err(Error::Decode { .. })));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = DocumentStore::load(Path::new("nonexistent.pdf"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
