//! Append source documents to a base document
//!
//! The base document is the merge destination, so its catalog, trailer and
//! Info dictionary (title, author) survive untouched.

use crate::error::PdfError;
use crate::source::{open_document, SourceDocument};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"Resources", b"CropBox", b"Rotate"];

/// Guards against cyclic Parent chains in malformed files
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub page_count: u32,
}

/// Append `sources` after the pages of `base`, in the given order
///
/// The algorithm:
/// 1. With no sources, return the base bytes untouched
/// 2. Load the base document as the destination
/// 3. For each source document:
///    a. Copy inherited page attributes down onto its pages
///    b. Import all objects with IDs shifted past the destination's max ID
///    c. Append its pages, in original order, to the destination page list
/// 4. Rebuild the destination page tree as a flat list and re-parent pages
/// 5. Drop unreachable objects, compress and serialize
pub fn merge_into_base(
    base: &[u8],
    sources: Vec<SourceDocument>,
) -> Result<MergedDocument, PdfError> {
    let mut dest = open_document(base)?;

    if sources.is_empty() {
        let page_count = dest.get_pages().len() as u32;
        return Ok(MergedDocument {
            bytes: base.to_vec(),
            page_count,
        });
    }

    let mut dest_page_refs = get_page_references(&dest);
    flatten_inherited_attributes(&mut dest, &dest_page_refs);
    let mut dest_max_id = dest.max_id;

    for source in sources {
        let SourceDocument { label, mut doc, .. } = source;
        let source_max_id = doc.max_id;
        let source_pages = get_page_references(&doc);
        flatten_inherited_attributes(&mut doc, &source_pages);

        // Source IDs are shifted past everything already in the destination
        let id_offset = dest_max_id;

        let mut remapped_objects = BTreeMap::new();
        for (old_id, object) in doc.objects.into_iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            remapped_objects.insert(new_id, remap_object_refs(object, id_offset));
        }
        dest.objects.extend(remapped_objects);

        for old_page_ref in &source_pages {
            dest_page_refs.push((old_page_ref.0 + id_offset, old_page_ref.1));
        }

        dest_max_id = (source_max_id + id_offset).max(dest_max_id);
        debug!(%label, pages = source_pages.len(), "Appended source document");
    }

    dest.max_id = dest_max_id;
    update_page_tree(&mut dest, &dest_page_refs)?;

    dest.prune_objects();
    dest.compress();

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| PdfError::OperationError(format!("Failed to save merged PDF: {}", e)))?;

    Ok(MergedDocument {
        bytes: buffer,
        page_count: dest_page_refs.len() as u32,
    })
}

/// Get all page object references from a document, in page order
fn get_page_references(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Copy inheritable attributes from ancestor page-tree nodes onto each page
fn flatten_inherited_attributes(doc: &mut Document, pages: &[ObjectId]) {
    for &page_id in pages {
        let inherited = collect_inherited(doc, page_id);
        if inherited.is_empty() {
            continue;
        }
        if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
            for (key, value) in inherited {
                page.set(key, value);
            }
        }
    }
}

fn collect_inherited(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let mut missing: Vec<&[u8]> = INHERITABLE.iter().copied().filter(|k| !page.has(k)).collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((key.to_vec(), value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    found
}

/// Shift every object reference inside `obj` by `offset`
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference((num, generation)) => Object::Reference((num + offset, generation)),
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            remap_dictionary(&mut dict, offset);
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            remap_dictionary(&mut stream.dict, offset);
            Object::Stream(stream)
        }
        other => other,
    }
}

fn remap_dictionary(dict: &mut lopdf::Dictionary, offset: u32) {
    for (_, value) in dict.iter_mut() {
        let taken = std::mem::replace(value, Object::Null);
        *value = remap_object_refs(taken, offset);
    }
}

/// Replace the root page node's Kids with `page_refs` and re-parent every page
fn update_page_tree(doc: &mut Document, page_refs: &[ObjectId]) -> Result<(), PdfError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfError::OperationError("No Root in trailer".into()))?;

    let pages_id = doc
        .get_dictionary(catalog_id)
        .map_err(|_| PdfError::OperationError("Catalog not found".into()))?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| PdfError::OperationError("No Pages in catalog".into()))?;

    if let Some(Object::Dictionary(ref mut pages_dict)) = doc.objects.get_mut(&pages_id) {
        let kids = page_refs
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
    } else {
        return Err(PdfError::OperationError("Invalid pages dictionary".into()));
    }

    for &page_id in page_refs {
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(&page_id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    Ok(())
}
