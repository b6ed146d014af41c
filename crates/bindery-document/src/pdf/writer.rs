// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer: assemble pages cloned from intermediates into a fresh output
// document and serialise it with the run's finishing options.
//
// `Document::with_version` produces an empty object table, so the catalog and
// page-tree root are created here; the page-tree node is filled in when the
// document is written, once every page is known.

use std::io::Write;
use std::path::Path;

use bindery_core::RunConfig;
use bindery_core::error::{BinderyError, Result};
use lopdf::{
    Dictionary, Document, EncryptionState, EncryptionVersion, Object, ObjectId, Permissions,
    StringFormat, dictionary,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use super::reader::{PageCloner, PdfReader};

/// Finishing options applied when an output document is written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Omit the document information dictionary and XMP metadata.
    pub clear_metadata: bool,
    /// Flate-compress every stream that allows it.
    pub compress: bool,
    /// Encrypt with this password (user and owner) when set.
    pub password: Option<String>,
}

impl WriteOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            clear_metadata: config.clear_metadata,
            compress: config.compress,
            password: config.password().map(str::to_string),
        }
    }
}

/// An output PDF under construction.
pub struct OutputDocument {
    document: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl Default for OutputDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDocument {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        Self {
            document,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Append copies of `page_ids` (pages of `source`), in order.
    ///
    /// Objects shared between the given pages are copied once.
    pub fn append_pages(&mut self, source: &PdfReader, page_ids: &[ObjectId]) -> Result<Vec<ObjectId>> {
        let mut cloner = PageCloner::new(source.document());
        let mut appended = Vec::with_capacity(page_ids.len());
        for &page_id in page_ids {
            let new_id = cloner.clone_page(&mut self.document, page_id, self.pages_id)?;
            self.kids.push(new_id);
            appended.push(new_id);
        }
        debug!(appended = appended.len(), total = self.kids.len(), "pages appended");
        Ok(appended)
    }

    /// Append every page of `source`.
    pub fn append_all(&mut self, source: &PdfReader) -> Result<Vec<ObjectId>> {
        self.append_pages(source, &source.page_ids())
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    /// Page object ids in output order.
    pub fn page_ids(&self) -> &[ObjectId] {
        &self.kids
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Finalise the object graph and serialise it with `options` applied.
    pub fn to_bytes(mut self, options: &WriteOptions) -> Result<Vec<u8>> {
        self.finalize(options)?;
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            BinderyError::PdfError(format!("failed to serialise output PDF: {}", err))
        })?;
        Ok(output)
    }

    /// Write to `dest` atomically.
    ///
    /// The PDF is serialised to a temporary file in the destination directory
    /// and then renamed over `dest`, so `dest` only ever holds a complete file.
    #[instrument(skip_all, fields(dest = %dest.display(), pages = self.kids.len()))]
    pub fn write(self, dest: &Path, options: &WriteOptions) -> Result<()> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let bytes = self.to_bytes(options)?;

        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(dest).map_err(|err| BinderyError::Io(err.error))?;

        info!(bytes = bytes.len(), "output written");
        Ok(())
    }

    fn finalize(&mut self, options: &WriteOptions) -> Result<()> {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        let count = kids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        if options.clear_metadata {
            self.document.trailer.remove(b"Info");
            if let Ok(catalog) = self.document.catalog_mut() {
                catalog.remove(b"Metadata");
            }
        } else {
            let info_id = self.document.add_object(info_dictionary());
            self.document.trailer.set("Info", info_id);
        }

        if options.compress {
            self.document.compress();
        }

        if let Some(password) = options.password.as_deref() {
            self.encrypt(password)?;
        }
        Ok(())
    }

    /// RC4-128 encryption with identical user and owner passwords.
    fn encrypt(&mut self, password: &str) -> Result<()> {
        // The standard security handler derives its key from the file ID.
        let file_id = uuid::Uuid::new_v4().as_bytes().to_vec();
        self.document.trailer.set(
            "ID",
            Object::Array(vec![
                Object::String(file_id.clone(), StringFormat::Hexadecimal),
                Object::String(file_id, StringFormat::Hexadecimal),
            ]),
        );

        let state = {
            let version = EncryptionVersion::V2 {
                document: &self.document,
                owner_password: password,
                user_password: password,
                key_length: 128,
                permissions: Permissions::all(),
            };
            EncryptionState::try_from(version).map_err(|err| {
                BinderyError::PdfError(format!("failed to prepare encryption: {}", err))
            })?
        };
        self.document
            .encrypt(&state)
            .map_err(|err| BinderyError::PdfError(format!("failed to encrypt output: {}", err)))?;
        debug!("output encrypted");
        Ok(())
    }
}

fn info_dictionary() -> Dictionary {
    let now = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
    dictionary! {
        "Producer" => Object::string_literal(concat!("Bindery ", env!("CARGO_PKG_VERSION"))),
        "CreationDate" => Object::string_literal(now.clone()),
        "ModDate" => Object::string_literal(now),
    }
}
