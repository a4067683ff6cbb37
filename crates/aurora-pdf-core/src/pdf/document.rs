use lopdf::{Dictionary, Document, Object, ObjectId};

use super::page_index::PageIndex;
use crate::error::{Error, Result};
use crate::intake::SourceFile;

/// Page attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against cyclic `/Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// A parsed PDF owned by a single pipeline invocation.
///
/// Handles are never shared: every pipeline loads its own, mutates it, and
/// drops it when the pipeline ends.
pub struct DocumentHandle {
    doc: Document,
    /// Page object ids in page order
    pages: Vec<ObjectId>,
    name: String,
}

impl DocumentHandle {
    /// Parse a PDF from bytes.
    pub fn load(bytes: &[u8], name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let doc = Document::load_mem(bytes).map_err(|e| Error::UnreadableDocument {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        Ok(Self { doc, pages, name })
    }

    /// Parse a validated source file.
    pub fn from_source(file: &SourceFile) -> Result<Self> {
        Self::load(file.bytes(), file.name())
    }

    pub const fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All page indices in document order.
    pub const fn page_indices(&self) -> std::ops::Range<usize> {
        0..self.pages.len()
    }

    pub const fn document(&self) -> &Document {
        &self.doc
    }

    /// Give up the handle and keep the parsed document.
    pub fn into_document(self) -> Document {
        self.doc
    }

    pub(crate) fn page_id(&self, index: usize) -> Result<ObjectId> {
        let index = PageIndex::try_from_index(index, self.pages.len())?;
        Ok(self.pages[index.as_usize()])
    }

    /// Effective rotation of a page in degrees, normalised to 0, 90, 180 or 270.
    pub fn rotation(&self, index: usize) -> Result<i64> {
        let page = resolved_page_dict(&self.doc, self.page_id(index)?)?;
        let rotate = page
            .get(b"Rotate")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        Ok(rotate.rem_euclid(360))
    }

    /// Set a page's rotation. The angle must be a multiple of 90.
    pub fn set_rotation(&mut self, index: usize, degrees: i64) -> Result<()> {
        if degrees % 90 != 0 {
            return Err(Error::InvalidRotation(degrees));
        }
        let page_id = self.page_id(index)?;
        let page = self
            .doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| Error::PageTree(format!("page {}: {e}", index + 1)))?;
        page.set("Rotate", Object::Integer(degrees.rem_euclid(360)));
        Ok(())
    }

    /// Decoded content stream bytes of a page.
    pub fn page_content(&self, index: usize) -> Result<Vec<u8>> {
        let page_id = self.page_id(index)?;
        self.doc
            .get_page_content(page_id)
            .map_err(|e| Error::PageTree(format!("page {}: {e}", index + 1)))
    }

    pub(crate) fn page_dict_mut(&mut self, index: usize) -> Result<&mut Dictionary> {
        let page_id = self.page_id(index)?;
        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| Error::PageTree(format!("page {}: {e}", index + 1)))
    }

    pub(crate) const fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Serialize the document in place, keeping page count and order.
    pub fn save(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| Error::PdfSave(format!("Failed to save {}: {e}", self.name)))?;
        Ok(output)
    }
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("name", &self.name)
            .field("page_count", &self.pages.len())
            .finish_non_exhaustive()
    }
}

/// A page dictionary with inherited attributes copied in from its ancestors.
pub(crate) fn resolved_page_dict(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut page = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::PageTree(format!("page object {page_id:?}: {e}")))?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return Err(Error::PageTree("page tree is too deep or cyclic".to_string()));
        }

        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };

        for key in INHERITABLE_KEYS {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key, value.clone());
            }
        }

        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}
