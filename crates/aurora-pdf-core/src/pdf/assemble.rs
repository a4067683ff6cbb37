//! Building a new document out of pages copied from loaded documents.
//!
//! Only the objects reachable from the selected pages are copied, each under
//! a fresh id in the output, and the page dictionaries are re-parented under
//! a single flat page tree. Inherited attributes are copied onto each page
//! first, since the original intermediate `Pages` nodes are not carried over.

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use tracing::debug;

use super::document::{DocumentHandle, resolved_page_dict};
use crate::error::{Error, Result};

/// Objects that belong to the source's document structure rather than to a
/// page. References to them are dropped from copied objects.
const STRUCTURAL_TYPES: [&[u8]; 5] = [b"Catalog", b"Pages", b"Page", b"Outlines", b"Outline"];

/// An output document under construction.
pub struct PageAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl PageAssembler {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub const fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Append every page of `source` in its existing order.
    pub fn append_all(&mut self, source: &DocumentHandle) -> Result<()> {
        let indices: Vec<usize> = source.page_indices().collect();
        self.append_pages(source, &indices)
    }

    /// Append the given pages of `source`, in the given order.
    ///
    /// An index may repeat; each occurrence becomes its own page object that
    /// shares content and resources with the others. The source is only read,
    /// so one loaded document can feed any number of assemblers.
    pub fn append_pages(&mut self, source: &DocumentHandle, indices: &[usize]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }

        // Resolve every page before touching the output so a bad index leaves it unchanged
        let src = source.document();
        let mut pages = Vec::with_capacity(indices.len());
        for &index in indices {
            let mut dict = resolved_page_dict(src, source.page_id(index)?)?;
            dict.remove(b"Parent");
            pages.push(dict);
        }

        let mut remap = HashMap::new();
        let mut pending = Vec::new();
        for dict in &pages {
            collect_references(dict.iter().map(|(_, o)| o), &mut pending);
        }
        while let Some(old_id) = pending.pop() {
            if remap.contains_key(&old_id) {
                continue;
            }
            let Some(object) = src.objects.get(&old_id) else {
                continue;
            };
            if is_structural(object) {
                continue;
            }
            remap.insert(old_id, self.doc.new_object_id());
            collect_references(std::iter::once(object), &mut pending);
        }

        for (old_id, new_id) in &remap {
            if let Some(object) = src.objects.get(old_id) {
                let mut object = object.clone();
                remap_references(&mut object, &remap);
                self.doc.objects.insert(*new_id, object);
            }
        }

        for dict in pages {
            let mut page = Object::Dictionary(dict);
            remap_references(&mut page, &remap);
            if let Object::Dictionary(dict) = &mut page {
                dict.set("Parent", Object::Reference(self.pages_id));
            }
            self.kids.push(self.doc.add_object(page));
        }

        debug!(
            "Appended {} pages from {} ({} objects copied, output now {} pages)",
            indices.len(),
            source.name(),
            remap.len(),
            self.kids.len()
        );
        Ok(())
    }

    /// Write the page tree and catalog, drop unreachable objects and serialize.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.kids.is_empty() {
            return Err(Error::PdfSave("output document has no pages".to_string()));
        }

        let count = i64::try_from(self.kids.len())
            .map_err(|_| Error::PdfSave("too many pages".to_string()))?;
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();

        let pages = Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(count)),
        ]);
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(self.pages_id)),
        ]));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| Error::PdfSave(format!("Failed to save assembled PDF: {e}")))?;
        Ok(output)
    }
}

impl Default for PageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_structural(object: &Object) -> bool {
    object
        .type_name()
        .is_ok_and(|name| STRUCTURAL_TYPES.contains(&name))
}

fn collect_references<'a>(objects: impl Iterator<Item = &'a Object>, out: &mut Vec<ObjectId>) {
    for object in objects {
        match object {
            Object::Reference(id) => out.push(*id),
            Object::Array(items) => collect_references(&mut items.iter() as &mut dyn Iterator<Item = &Object>, out),
            Object::Dictionary(dict) => collect_references(&mut dict.iter().map(|(_, o)| o) as &mut dyn Iterator<Item = &Object>, out),
            Object::Stream(stream) => collect_references(&mut stream.dict.iter().map(|(_, o)| o) as &mut dyn Iterator<Item = &Object>, out),
            _ => {}
        }
    }
}

/// Point references at their copies; references that were not copied become null.
fn remap_references(object: &mut Object, remap: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            let replacement = remap.get(id).map_or(Object::Null, |&new_id| Object::Reference(new_id));
            *object = replacement;
        }
        Object::Array(items) => items.iter_mut().for_each(|o| remap_references(o, remap)),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, o)| remap_references(o, remap)),
        Object::Stream(stream) => stream.dict.iter_mut().for_each(|(_, o)| remap_references(o, remap)),
        _ => {}
    }
}
