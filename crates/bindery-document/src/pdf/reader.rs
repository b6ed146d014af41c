// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open intermediate PDFs, enumerate pages, and copy selected
// pages (with every object they reference) into another document using the
// `lopdf` crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bindery_core::error::{BinderyError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, instrument, warn};

use super::writer::{OutputDocument, WriteOptions};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// US Letter, used when neither the page nor its ancestors declare a media box.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Reads an existing PDF and exposes its pages in document order.
pub struct PdfReader {
    document: Document,
    source_path: Option<PathBuf>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = Document::load(path).map_err(|err| {
            BinderyError::PdfError(format!("failed to open {}: {}", path.display(), err))
        })?;
        debug!(pages = document.get_pages().len(), "PDF loaded");
        Ok(Self {
            document,
            source_path: Some(path.to_path_buf()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            BinderyError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;
        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page object ids in page order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        // get_pages() is keyed by 1-based page number, so values come out in order.
        self.document.get_pages().into_values().collect()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Effective media box of a page (inherited if necessary).
    pub fn media_box(&self, page_id: ObjectId) -> [f32; 4] {
        inherited_attribute(&self.document, page_id, b"MediaBox")
            .and_then(|obj| rect(&self.document, obj))
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    // -- Extraction -----------------------------------------------------------

    /// Write the pages at the given 0-based `indices` to `dest` as a new PDF.
    #[instrument(skip_all, fields(selected = indices.len(), dest = %dest.display()))]
    pub fn extract_pages(&self, indices: &[usize], dest: &Path) -> Result<usize> {
        let ids = self.page_ids();
        let mut selected = Vec::with_capacity(indices.len());
        for &index in indices {
            let id = ids.get(index).copied().ok_or_else(|| {
                BinderyError::PdfError(format!(
                    "page {} out of range (document has {} pages)",
                    index + 1,
                    ids.len()
                ))
            })?;
            selected.push(id);
        }

        let mut output = OutputDocument::new();
        output.append_pages(self, &selected)?;
        let written = output.page_count();
        output.write(dest, &WriteOptions::default())?;
        info!(pages = written, "pages extracted");
        Ok(written)
    }
}

/// Copies pages and their object graphs from one document into another.
///
/// References are cloned once and shared afterwards, so resources used by
/// several pages are not duplicated and reference cycles terminate.
pub(crate) struct PageCloner<'a> {
    source: &'a Document,
    memo: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCloner<'a> {
    pub(crate) fn new(source: &'a Document) -> Self {
        Self {
            source,
            memo: HashMap::new(),
        }
    }

    /// Clone page `page_id` into `target` under the page-tree node `parent`.
    ///
    /// Inherited attributes are resolved onto the cloned page so it no longer
    /// depends on the source page tree.
    pub(crate) fn clone_page(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
        parent: ObjectId,
    ) -> Result<ObjectId> {
        let page = self.source.get_dictionary(page_id).map_err(|err| {
            BinderyError::PdfError(format!("cannot read page object {:?}: {}", page_id, err))
        })?;

        // Register the page before descending so back-references (e.g.
        // annotation /P entries) resolve to the new page.
        let new_id = target.new_object_id();
        self.memo.insert(page_id, new_id);

        let mut dict = self.clone_dictionary(target, page)?;
        for key in INHERITABLE {
            if dict.has(key) {
                continue;
            }
            if let Some(value) = inherited_attribute(self.source, page_id, key) {
                let cloned = self.clone_object(target, value)?;
                dict.set(key.to_vec(), cloned);
            }
        }
        if !dict.has(b"MediaBox") {
            dict.set("MediaBox", rect_object(DEFAULT_MEDIA_BOX));
        }
        dict.set("Type", Object::Name(b"Page".to_vec()));
        dict.set("Parent", Object::Reference(parent));

        target.objects.insert(new_id, Object::Dictionary(dict));
        Ok(new_id)
    }

    fn clone_reference(&mut self, target: &mut Document, id: ObjectId) -> Result<Object> {
        if let Some(&existing) = self.memo.get(&id) {
            return Ok(Object::Reference(existing));
        }
        let referenced = match self.source.get_object(id) {
            Ok(obj) => obj,
            Err(err) => {
                warn!(?id, %err, "cannot resolve reference, using Null");
                return Ok(Object::Null);
            }
        };
        let new_id = target.new_object_id();
        self.memo.insert(id, new_id);
        let cloned = self.clone_object(target, referenced)?;
        target.objects.insert(new_id, cloned);
        Ok(Object::Reference(new_id))
    }

    fn clone_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Result<Dictionary> {
        let mut new_dict = Dictionary::new();
        for (key, value) in dict.iter() {
            // The page-tree parent is re-linked by the caller.
            if key == b"Parent" {
                continue;
            }
            let cloned = self.clone_object(target, value)?;
            new_dict.set(key.clone(), cloned);
        }
        Ok(new_dict)
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Result<Object> {
        match object {
            Object::Reference(id) => self.clone_reference(target, *id),
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.clone_dictionary(target, dict)?)),
            Object::Array(items) => {
                let mut cloned = Vec::with_capacity(items.len());
                for item in items {
                    cloned.push(self.clone_object(target, item)?);
                }
                Ok(Object::Array(cloned))
            }
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(target, &stream.dict)?;
                let mut copy = Stream::new(dict, stream.content.clone());
                copy.allows_compression = stream.allows_compression;
                Ok(Object::Stream(copy))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Look up `key` on a page, walking up the `/Parent` chain when absent.
pub(crate) fn inherited_attribute<'d>(
    doc: &'d Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'d Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    // Bounded walk; malformed files can contain parent cycles.
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Read a numeric value, following one level of indirection.
pub(crate) fn number(doc: &Document, obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        },
        _ => None,
    }
}

/// Read a `[llx lly urx ury]` rectangle, normalising corner order.
pub(crate) fn rect(doc: &Document, obj: &Object) -> Option<[f32; 4]> {
    let array = match obj {
        Object::Array(items) => items,
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
        _ => return None,
    };
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = number(doc, item)?;
    }
    let [x0, y0, x1, y1] = values;
    Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
}

pub(crate) fn rect_object(r: [f32; 4]) -> Object {
    Object::Array(r.iter().map(|v| Object::Real(*v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{SamplePage, sample_pdf};

    #[test]
    fn pages_in_document_order() {
        let bytes = sample_pdf(&[SamplePage::letter("one"), SamplePage::letter("two")]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert_eq!(reader.page_ids().len(), 2);
        assert!(reader.source_path().is_none());
    }

    #[test]
    fn media_box_is_inherited_from_page_tree() {
        let bytes = sample_pdf(&[SamplePage::letter("inherits")]);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = reader.page_ids()[0];
        assert_eq!(reader.media_box(page), [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn extract_selected_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pages: Vec<SamplePage> = (1..=5).map(|n| SamplePage::a4(&format!("p{n}"))).collect();
        let reader = PdfReader::from_bytes(&sample_pdf(&pages)).unwrap();

        let dest = dir.path().join("subset.pdf");
        assert_eq!(reader.extract_pages(&[1, 3], &dest).unwrap(), 2);

        let subset = PdfReader::open(&dest).unwrap();
        assert_eq!(subset.page_count(), 2);
        // The A4 media box lives on the source page itself.
        let first = subset.page_ids()[0];
        let [_, _, w, h] = subset.media_box(first);
        assert!((w - 595.0).abs() < 1.0 && (h - 842.0).abs() < 1.0);
    }

    #[test]
    fn extract_rejects_out_of_range_index() {
        let dir = tempfile::tempdir().unwrap();
        let reader = PdfReader::from_bytes(&sample_pdf(&[SamplePage::letter("x")])).unwrap();
        let err = reader
            .extract_pages(&[4], &dir.path().join("bad.pdf"))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn garbage_is_a_pdf_error() {
        assert!(matches!(
            PdfReader::from_bytes(b"not a pdf"),
            Err(BinderyError::PdfError(_))
        ));
    }
}
