//! Reference resolution and path lookup through the object graph

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use lopdf::Object;

use crate::error::{Error, Result};
use crate::pdf::store::{IndirectReference, ObjectStore};

/// One step of a path through nested dictionaries and arrays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Dictionary key, without the leading slash
    Key(String),
    /// Zero-based array position
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Split a dotted path such as `Pages.Kids.0.Count` into segments
///
/// All-digit segments become array indices, everything else a dictionary key.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<usize>() {
            Ok(index) if part.bytes().all(|b| b.is_ascii_digit()) => PathSegment::Index(index),
            _ => PathSegment::Key(part.to_string()),
        })
        .collect()
}

fn join_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Follow a chain of indirect references to the first non-reference value
///
/// Fails with [`Error::CyclicReference`] if the chain comes back to a
/// reference it has already passed through.
pub fn resolve<S: ObjectStore + ?Sized>(store: &S, object: &Object) -> Result<Arc<Object>> {
    let first = match object {
        Object::Reference(id) => IndirectReference::from(*id),
        _ => return Ok(Arc::new(object.clone())),
    };
    resolve_reference(store, first)
}

/// [`resolve`] starting from a bare reference
pub fn resolve_reference<S: ObjectStore + ?Sized>(
    store: &S,
    reference: IndirectReference,
) -> Result<Arc<Object>> {
    let mut visited = HashSet::new();
    let mut next = reference;

    loop {
        if !visited.insert(next) {
            return Err(Error::CyclicReference(next));
        }

        let current = store.fetch(next)?;
        match current.as_ref() {
            Object::Reference(id) => next = IndirectReference::from(*id),
            _ => return Ok(current),
        }
    }
}

/// Resolve `root`, then look up and resolve each path segment in turn
///
/// Key segments address dictionaries (or a stream's dictionary), index
/// segments address arrays. A missing entry or a kind mismatch is
/// [`Error::PathNotFound`]; the lookup never yields `Null` in place of an
/// absent entry.
pub fn follow_path<S: ObjectStore + ?Sized>(
    store: &S,
    root: &Object,
    path: &[PathSegment],
) -> Result<Arc<Object>> {
    let mut current = resolve(store, root)?;

    for segment in path {
        let child = lookup(&current, segment).ok_or_else(|| Error::PathNotFound {
            path: join_path(path),
            segment: segment.to_string(),
        })?;
        current = resolve(store, child)?;
    }

    Ok(current)
}

fn lookup<'a>(object: &'a Object, segment: &PathSegment) -> Option<&'a Object> {
    match (object, segment) {
        (Object::Dictionary(dict), PathSegment::Key(key)) => dict.get(key.as_bytes()).ok(),
        (Object::Stream(stream), PathSegment::Key(key)) => stream.dict.get(key.as_bytes()).ok(),
        (Object::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}
