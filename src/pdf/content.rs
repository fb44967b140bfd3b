//! Page content stream extraction

use lopdf::Object;

use crate::error::{Error, Result};
use crate::pdf::pages::PageNode;
use crate::pdf::resolve::resolve_reference;
use crate::pdf::store::{IndirectReference, ObjectStore};

/// Decoded content of a page
///
/// An array of streams is concatenated in order with nothing inserted
/// between parts, since stream boundaries fall on token boundaries. A page
/// without `Contents` has empty content.
pub fn get_content_bytes<S: ObjectStore + ?Sized>(store: &S, page: &PageNode) -> Result<Vec<u8>> {
    let Some(contents) = page.contents() else {
        return Ok(Vec::new());
    };

    let mut content = Vec::new();
    match contents {
        Object::Reference(id) => {
            let reference = IndirectReference::from(*id);
            let target = resolve_reference(store, reference)?;
            match target.as_ref() {
                Object::Array(parts) => {
                    for part in parts {
                        append_stream(store, part, &mut content)?;
                    }
                }
                _ => append_object(store, Some(reference), &target, &mut content)?,
            }
        }
        Object::Array(parts) => {
            for part in parts {
                append_stream(store, part, &mut content)?;
            }
        }
        Object::Null => {}
        _ => append_stream(store, contents, &mut content)?,
    }

    log::debug!("Page {} has {} bytes of content", page.number(), content.len());
    Ok(content)
}

fn append_stream<S: ObjectStore + ?Sized>(
    store: &S,
    part: &Object,
    content: &mut Vec<u8>,
) -> Result<()> {
    match part {
        Object::Reference(id) => {
            let reference = IndirectReference::from(*id);
            let object = resolve_reference(store, reference)?;
            append_object(store, Some(reference), &object, content)
        }
        other => append_object(store, None, other, content),
    }
}

fn append_object<S: ObjectStore + ?Sized>(
    store: &S,
    reference: Option<IndirectReference>,
    object: &Object,
    content: &mut Vec<u8>,
) -> Result<()> {
    match object {
        Object::Stream(stream) => {
            let bytes = store.decode_stream(reference, stream)?;
            content.extend_from_slice(&bytes);
            Ok(())
        }
        Object::Null => Ok(()),
        _ => Err(Error::PathNotFound {
            path: "Contents".to_string(),
            segment: "Contents".to_string(),
        }),
    }
}
