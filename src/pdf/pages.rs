//! Page tree traversal with attribute inheritance

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use lopdf::{Dictionary, Object};

use crate::error::{Error, Result};
use crate::pdf::resolve::{follow_path, parse_path, resolve, resolve_reference};
use crate::pdf::store::{IndirectReference, ObjectStore};

/// Page attributes a leaf may take from its ancestors
pub const INHERITABLE_ATTRIBUTES: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// A leaf of the page tree with its inherited attributes filled in
#[derive(Debug, Clone)]
pub struct PageNode {
    /// Zero-based position among the document's pages
    pub index: usize,
    /// The page's own reference, if it was reached through one
    pub reference: Option<IndirectReference>,
    /// The page dictionary exactly as stored
    pub dictionary: Dictionary,
    /// Effective `Resources` (own or nearest ancestor's)
    pub resources: Option<Object>,
    /// Effective `MediaBox`
    pub media_box: Option<Object>,
    /// Effective `CropBox`
    pub crop_box: Option<Object>,
    /// Effective `Rotate`
    pub rotate: Option<Object>,
}

impl PageNode {
    fn new(
        index: usize,
        reference: Option<IndirectReference>,
        dictionary: Dictionary,
        ancestors: &[&Dictionary],
    ) -> Self {
        let inherit = |key: &str| {
            std::iter::once(&dictionary)
                .chain(ancestors.iter().copied())
                .find_map(|node| node.get(key.as_bytes()).ok())
                .cloned()
        };

        let resources = inherit("Resources");
        let media_box = inherit("MediaBox");
        let crop_box = inherit("CropBox");
        let rotate = inherit("Rotate");

        Self {
            index,
            reference,
            dictionary,
            resources,
            media_box,
            crop_box,
            rotate,
        }
    }

    /// One-based page number, as reported to users
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// The page's `Contents` entry, if any
    pub fn contents(&self) -> Option<&Object> {
        self.dictionary.get(b"Contents").ok()
    }

    /// Look up an attribute, using the effective value for inheritable keys
    pub fn attribute(&self, key: &str) -> Option<&Object> {
        match key {
            "Resources" => self.resources.as_ref(),
            "MediaBox" => self.media_box.as_ref(),
            "CropBox" => self.crop_box.as_ref(),
            "Rotate" => self.rotate.as_ref(),
            _ => self.dictionary.get(key.as_bytes()).ok(),
        }
    }

    /// The page dictionary with inherited attributes merged in
    pub fn effective_dictionary(&self) -> Dictionary {
        let mut dict = self.dictionary.clone();
        for key in INHERITABLE_ATTRIBUTES {
            if let Some(value) = self.attribute(key) {
                dict.set(key, value.clone());
            }
        }
        dict
    }
}

fn root_object<S: ObjectStore + ?Sized>(store: &S) -> Object {
    Object::Reference(store.trailer().root.into())
}

/// Number of pages, read from the `Count` field of the page tree root
pub fn page_count<S: ObjectStore + ?Sized>(store: &S) -> Result<usize> {
    let count = follow_path(store, &root_object(store), &parse_path("Pages.Count"))?;

    match count.as_ref() {
        Object::Integer(n) => Ok((*n).max(0) as usize),
        _ => Err(Error::PathNotFound {
            path: "Pages.Count".to_string(),
            segment: "Count".to_string(),
        }),
    }
}

/// Resolve the page at `index` (zero-based, depth-first leaf order)
///
/// The walk stops at the requested page.
pub fn get_page<S: ObjectStore + ?Sized>(store: &S, index: usize) -> Result<PageNode> {
    let count = page_count(store)?;
    if index >= count {
        return Err(Error::PageIndexOutOfRange { index, count });
    }

    let found = walk_leaves(store, |ordinal, leaf| {
        if ordinal == index {
            ControlFlow::Break(leaf.map(|leaf| leaf.to_page(ordinal)))
        } else {
            ControlFlow::Continue(())
        }
    })?;

    found.unwrap_or_else(|| {
        log::warn!("Page tree declares {} pages but page {} is not reachable", count, index);
        Err(Error::PageIndexOutOfRange { index, count })
    })
}

/// The first `count` pages in one depth-first pass
///
/// Always returns `count` entries in page order. A node reached a second
/// time fails its own slot with [`Error::CyclicPageTree`] and the walk goes
/// on with its next sibling. If the walk itself breaks down (a missing node,
/// a node that is not a dictionary), the page at that point gets the error
/// and every later page fails with [`Error::InvalidStructure`]. Slots the
/// tree has no leaf for fail with [`Error::PageIndexOutOfRange`].
pub fn collect_pages<S: ObjectStore + ?Sized>(store: &S, count: usize) -> Vec<Result<PageNode>> {
    let mut pages = Vec::with_capacity(count);
    let walked = walk_leaves(store, |ordinal, leaf| {
        if ordinal >= count {
            return ControlFlow::Break(());
        }
        pages.push(leaf.map(|leaf| leaf.to_page(ordinal)));
        ControlFlow::Continue(())
    });

    let mut broken_at = None;
    if let Err(error) = walked {
        if pages.len() < count {
            log::warn!("Page tree walk stopped at page {}: {}", pages.len() + 1, error);
            broken_at = Some(pages.len() + 1);
            pages.push(Err(error));
        } else {
            log::debug!("Ignoring page tree error past page {}: {}", count, error);
        }
    } else if pages.len() < count {
        log::warn!("Page tree declares {} pages but {} are reachable", count, pages.len());
    }

    while pages.len() < count {
        let index = pages.len();
        pages.push(Err(match broken_at {
            Some(page) => Error::InvalidStructure(format!(
                "page {} is unreachable, the page tree is broken at page {}",
                index + 1,
                page
            )),
            None => Error::PageIndexOutOfRange { index, count },
        }));
    }

    pages
}

/// Number of leaf pages actually reachable from the page tree root
///
/// Unlike a scan, a node reached twice fails the whole count.
pub fn leaf_count<S: ObjectStore + ?Sized>(store: &S) -> Result<usize> {
    let mut leaves = 0;
    let cyclic = walk_leaves(store, |_, leaf| match leaf {
        Ok(_) => {
            leaves += 1;
            ControlFlow::Continue(())
        }
        Err(error) => ControlFlow::Break(error),
    })?;

    match cyclic {
        Some(error) => Err(error),
        None => Ok(leaves),
    }
}

/// A leaf as seen by [`walk_leaves`], borrowed from the walk's stack
struct Leaf<'a> {
    reference: Option<IndirectReference>,
    dict: &'a Dictionary,
    /// Ancestor dictionaries, nearest first
    ancestors: &'a [&'a Dictionary],
}

impl Leaf<'_> {
    fn to_page(&self, index: usize) -> PageNode {
        PageNode::new(index, self.reference, self.dict.clone(), self.ancestors)
    }
}

/// An intermediate node on the walk's stack
struct Frame {
    node: Arc<Object>,
    kids: Option<Arc<Object>>,
    next_kid: usize,
}

impl Frame {
    fn dict(&self) -> Option<&Dictionary> {
        self.node.as_dict().ok()
    }

    fn next_kid(&mut self) -> Option<Object> {
        let kid = self.kids.as_deref()?.as_array().ok()?.get(self.next_kid).cloned();
        self.next_kid += 1;
        kid
    }
}

fn is_leaf(dict: &Dictionary) -> bool {
    match dict.get(b"Type") {
        Ok(Object::Name(name)) if name == b"Page" => true,
        Ok(Object::Name(name)) if name == b"Pages" => false,
        _ => dict.get(b"Kids").is_err(),
    }
}

fn node_dictionary(object: &Object, reference: Option<IndirectReference>) -> Result<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Ok(dict),
        _ => Err(Error::InvalidStructure(match reference {
            Some(r) => format!("page tree node {} is not a dictionary", r),
            None => "page tree node is not a dictionary".to_string(),
        })),
    }
}

/// The resolved `Kids` array of an intermediate node
fn kids_of<S: ObjectStore + ?Sized>(store: &S, dict: &Dictionary) -> Result<Option<Arc<Object>>> {
    let Ok(kids) = dict.get(b"Kids") else {
        return Ok(None);
    };

    let kids = resolve(store, kids)?;
    match kids.as_ref() {
        Object::Array(_) => Ok(Some(kids)),
        _ => Err(Error::PathNotFound {
            path: "Kids".to_string(),
            segment: "Kids".to_string(),
        }),
    }
}

/// Depth-first walk over the leaves of the page tree
///
/// `visit` receives each leaf slot's ordinal with the leaf, or with
/// [`Error::CyclicPageTree`] when the kid in that slot was already reached;
/// such a kid is not descended into. The walk uses an explicit stack. Other
/// structural failures end the walk with `Err`.
fn walk_leaves<S, T>(
    store: &S,
    mut visit: impl FnMut(usize, Result<Leaf<'_>>) -> ControlFlow<T>,
) -> Result<Option<T>>
where
    S: ObjectStore + ?Sized,
{
    let pages = match resolve(store, &root_object(store))?.as_ref() {
        Object::Dictionary(catalog) => catalog.get(b"Pages").ok().cloned(),
        _ => return Err(Error::InvalidStructure("Catalog is not a dictionary".to_string())),
    }
    .ok_or_else(|| Error::PathNotFound {
        path: "Pages".to_string(),
        segment: "Pages".to_string(),
    })?;

    let mut visited: HashSet<IndirectReference> = HashSet::new();
    let (root_reference, root) = fetch_node(store, &pages)?;
    if let Some(reference) = root_reference {
        visited.insert(reference);
    }
    let root_dict = node_dictionary(&root, root_reference)?;

    if is_leaf(root_dict) {
        let leaf = Leaf {
            reference: root_reference,
            dict: root_dict,
            ancestors: &[],
        };
        return Ok(match visit(0, Ok(leaf)) {
            ControlFlow::Break(found) => Some(found),
            ControlFlow::Continue(()) => None,
        });
    }

    let kids = kids_of(store, root_dict)?;
    let mut stack = vec![Frame {
        node: root,
        kids,
        next_kid: 0,
    }];
    let mut ordinal = 0;

    while let Some(top) = stack.last_mut() {
        let Some(kid) = top.next_kid() else {
            stack.pop();
            continue;
        };

        if let Object::Reference(id) = &kid {
            let reference = IndirectReference::from(*id);
            if !visited.insert(reference) {
                let repeated = Err(Error::CyclicPageTree(reference));
                if let ControlFlow::Break(found) = visit(ordinal, repeated) {
                    return Ok(Some(found));
                }
                ordinal += 1;
                continue;
            }
        }

        let (reference, node) = fetch_node(store, &kid)?;
        let dict = node_dictionary(&node, reference)?;

        if is_leaf(dict) {
            let ancestors: Vec<&Dictionary> = stack.iter().rev().filter_map(Frame::dict).collect();
            let leaf = Leaf {
                reference,
                dict,
                ancestors: &ancestors,
            };
            if let ControlFlow::Break(found) = visit(ordinal, Ok(leaf)) {
                return Ok(Some(found));
            }
            ordinal += 1;
        } else {
            let kids = kids_of(store, dict)?;
            stack.push(Frame {
                node,
                kids,
                next_kid: 0,
            });
        }
    }

    log::debug!("Page tree walk visited {} leaves", ordinal);
    Ok(None)
}

fn fetch_node<S: ObjectStore + ?Sized>(
    store: &S,
    object: &Object,
) -> Result<(Option<IndirectReference>, Arc<Object>)> {
    match object {
        Object::Reference(id) => {
            let reference = IndirectReference::from(*id);
            Ok((Some(reference), resolve_reference(store, reference)?))
        }
        other => Ok((None, Arc::new(other.clone()))),
    }
}
