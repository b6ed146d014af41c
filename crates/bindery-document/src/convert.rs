// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source document → intermediate PDF conversion.
//
// One converter per document kind, selected through a lookup table. Every
// converter writes into the run's workspace directory; the registry turns any
// failure into a per-document conversion error so a bad file is skipped
// rather than aborting the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use bindery_core::config::RunConfig;
use bindery_core::error::{BinderyError, Result};
use bindery_core::types::{DocumentKind, SourceDocument};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::pdf::reader::PdfReader;

/// An intermediate PDF written by a converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedPdf {
    pub path: PathBuf,
    /// Sheet this PDF was rendered from (spreadsheets only).
    pub sheet: Option<String>,
}

impl ConvertedPdf {
    pub fn new(path: PathBuf) -> Self {
        Self { path, sheet: None }
    }
}

/// Converts one kind of source document into intermediate PDFs.
pub trait DocumentConverter: Send + Sync {
    /// Convert `doc`, writing intermediates under `workspace`.
    ///
    /// Returns one PDF, or one per selected sheet for spreadsheets.
    fn convert(&self, doc: &SourceDocument, workspace: &Path, config: &RunConfig) -> Result<Vec<ConvertedPdf>>;
}

/// A unique file path inside the workspace.
fn workspace_file(workspace: &Path, stem: &str) -> PathBuf {
    workspace.join(format!("{}-{}.pdf", Uuid::new_v4().simple(), stem))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Lookup table from document kind to converter.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<DocumentKind, Arc<dyn DocumentConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// PDF passthrough, image rendering, and `soffice` for office formats.
    pub fn standard() -> Self {
        Self::with_office(OfficeConverter::default())
    }

    /// Like [`standard`](Self::standard) with a specific office converter.
    pub fn with_office(office: OfficeConverter) -> Self {
        let office = Arc::new(office);
        let mut registry = Self::new();
        registry.register(DocumentKind::Pdf, Arc::new(PdfPassthrough));
        registry.register(DocumentKind::Image, Arc::new(ImageConverter));
        registry.register(DocumentKind::Word, office.clone());
        registry.register(DocumentKind::PowerPoint, office.clone());
        registry.register(DocumentKind::Excel, office);
        registry
    }

    pub fn register(&mut self, kind: DocumentKind, converter: Arc<dyn DocumentConverter>) {
        self.converters.insert(kind, converter);
    }

    pub fn supports(&self, kind: DocumentKind) -> bool {
        self.converters.contains_key(&kind)
    }

    /// Convert `doc`. Every failure is reported as a per-document error.
    #[instrument(skip_all, fields(path = %doc.path.display(), kind = %doc.kind))]
    pub fn convert(&self, doc: &SourceDocument, workspace: &Path, config: &RunConfig) -> Result<Vec<ConvertedPdf>> {
        let converter = self
            .converters
            .get(&doc.kind)
            .ok_or_else(|| BinderyError::NoConverter(doc.kind.label().to_string()))?;

        let outputs = converter.convert(doc, workspace, config).map_err(|err| match err {
            BinderyError::Conversion { .. } => err,
            other => BinderyError::Conversion {
                path: doc.path.clone(),
                reason: other.to_string(),
            },
        })?;
        if outputs.is_empty() {
            return Err(BinderyError::Conversion {
                path: doc.path.clone(),
                reason: "converter produced no PDF".into(),
            });
        }
        debug!(outputs = outputs.len(), "document converted");
        Ok(outputs)
    }
}

// ---------------------------------------------------------------------------
// PDF
// ---------------------------------------------------------------------------

/// Re-serialises a source PDF into the workspace, validating it on the way.
pub struct PdfPassthrough;

impl DocumentConverter for PdfPassthrough {
    fn convert(&self, doc: &SourceDocument, workspace: &Path, _config: &RunConfig) -> Result<Vec<ConvertedPdf>> {
        let reader = PdfReader::open(&doc.path)?;
        let all: Vec<usize> = (0..reader.page_count()).collect();
        let dest = workspace_file(workspace, "source");
        reader.extract_pages(&all, &dest)?;
        Ok(vec![ConvertedPdf::new(dest)])
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Places an image on a single page of its own size (72 dpi, one pixel per point).
pub struct ImageConverter;

impl ImageConverter {
    /// Render image bytes to a one-page PDF.
    pub fn render(image_bytes: &[u8], title: &str) -> Result<Vec<u8>> {
        let decoded = ::image::load_from_memory(image_bytes).map_err(|err| {
            BinderyError::ImageError(format!("failed to decode image: {}", err))
        })?;
        let (width, height) = (decoded.width() as usize, decoded.height() as usize);
        let raw = RawImage {
            pixels: RawImageData::U8(decoded.to_rgb8().into_raw()),
            width,
            height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };

        let mut doc = PdfDocument::new(title);
        let xobject_id = doc.add_image(&raw);

        let dpi: f32 = 72.0;
        let page_w = Mm(width as f32 * 25.4 / dpi);
        let page_h = Mm(height as f32 * 25.4 / dpi);
        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(dpi),
                rotate: None,
            },
        }];
        doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(width, height, warnings = warnings.len(), "image page rendered");
        Ok(output)
    }
}

impl DocumentConverter for ImageConverter {
    fn convert(&self, doc: &SourceDocument, workspace: &Path, _config: &RunConfig) -> Result<Vec<ConvertedPdf>> {
        let bytes = std::fs::read(&doc.path)?;
        let pdf = Self::render(&bytes, &doc.stem())?;
        let dest = workspace_file(workspace, "image");
        std::fs::write(&dest, pdf)?;
        Ok(vec![ConvertedPdf::new(dest)])
    }
}

// ---------------------------------------------------------------------------
// Office documents
// ---------------------------------------------------------------------------

/// Export filter that renders every spreadsheet sheet onto exactly one page.
const SINGLE_PAGE_SHEETS: &str =
    r#"pdf:calc_pdf_Export:{"SinglePageSheets":{"type":"boolean","value":"true"}}"#;

/// Converts Word, PowerPoint and Excel files with a headless office suite.
///
/// Spreadsheets with a known sheet list are exported one sheet per page and
/// then split, yielding one PDF per selected sheet.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    program: String,
}

impl Default for OfficeConverter {
    fn default() -> Self {
        Self::new("soffice")
    }
}

impl OfficeConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the office suite, returning the PDF it wrote.
    fn export(&self, source: &Path, workspace: &Path, filter: &str) -> Result<PathBuf> {
        let outdir = workspace.join(Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&outdir)?;

        let output = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg(filter)
            .arg("--outdir")
            .arg(&outdir)
            .arg(source)
            .output()
            .map_err(|err| BinderyError::Conversion {
                path: source.to_path_buf(),
                reason: format!("cannot run {}: {}", self.program, err),
            })?;
        if !output.status.success() {
            return Err(BinderyError::Conversion {
                path: source.to_path_buf(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pdf = outdir.join(format!("{stem}.pdf"));
        if !pdf.is_file() {
            return Err(BinderyError::Conversion {
                path: source.to_path_buf(),
                reason: format!("{} produced no PDF", self.program),
            });
        }
        Ok(pdf)
    }

    fn convert_workbook(&self, doc: &SourceDocument, workspace: &Path, config: &RunConfig) -> Result<Vec<ConvertedPdf>> {
        let selected = doc.selected_sheets();
        let one_page_per_sheet = !doc.sheets.is_empty() || config.excel_fit_width || config.excel_fit_height;
        let filter = if one_page_per_sheet { SINGLE_PAGE_SHEETS } else { "pdf" };
        let pdf = self.export(&doc.path, workspace, filter)?;

        if doc.sheets.is_empty() {
            return Ok(vec![ConvertedPdf::new(pdf)]);
        }

        let reader = PdfReader::open(&pdf)?;
        if reader.page_count() != doc.sheets.len() {
            warn!(
                pages = reader.page_count(),
                sheets = doc.sheets.len(),
                "sheet count does not match exported pages, keeping workbook whole"
            );
            return Ok(vec![ConvertedPdf::new(pdf)]);
        }

        let mut outputs = Vec::with_capacity(selected.len());
        for name in selected {
            let Some(index) = doc.sheets.iter().position(|s| *s == name) else {
                warn!(sheet = %name, "selected sheet not in workbook, skipped");
                continue;
            };
            let dest = workspace_file(workspace, "sheet");
            reader.extract_pages(&[index], &dest)?;
            outputs.push(ConvertedPdf {
                path: dest,
                sheet: Some(name),
            });
        }
        if outputs.is_empty() {
            return Err(BinderyError::Conversion {
                path: doc.path.clone(),
                reason: format!("range '{}' names no sheet of the workbook", doc.range),
            });
        }
        info!(sheets = outputs.len(), "workbook split into sheets");
        Ok(outputs)
    }
}

impl DocumentConverter for OfficeConverter {
    fn convert(&self, doc: &SourceDocument, workspace: &Path, config: &RunConfig) -> Result<Vec<ConvertedPdf>> {
        match doc.kind {
            DocumentKind::Excel => self.convert_workbook(doc, workspace, config),
            DocumentKind::Word | DocumentKind::PowerPoint => {
                Ok(vec![ConvertedPdf::new(self.export(&doc.path, workspace, "pdf")?)])
            }
            DocumentKind::Pdf | DocumentKind::Image => Err(BinderyError::NoConverter(format!(
                "office suite cannot convert {}",
                doc.kind
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_numbered_pdf;

    #[test]
    fn pdf_passthrough_copies_into_workspace() {
        let src = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let path = src.path().join("report.pdf");
        write_numbered_pdf(&path, 3).unwrap();

        let doc = SourceDocument::from_path(&path).unwrap();
        let outputs = ConverterRegistry::standard()
            .convert(&doc, ws.path(), &RunConfig::default())
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].path.starts_with(ws.path()));
        assert_eq!(PdfReader::open(&outputs[0].path).unwrap().page_count(), 3);
    }

    #[test]
    fn image_becomes_one_page_of_native_size() {
        let img = ::image::RgbImage::from_pixel(144, 72, ::image::Rgb([10, 20, 30]));
        let mut png = std::io::Cursor::new(Vec::new());
        ::image::DynamicImage::ImageRgb8(img)
            .write_to(&mut png, ::image::ImageFormat::Png)
            .unwrap();

        let pdf = ImageConverter::render(png.get_ref(), "scan").unwrap();
        let reader = PdfReader::from_bytes(&pdf).unwrap();
        assert_eq!(reader.page_count(), 1);
        let [llx, lly, urx, ury] = reader.media_box(reader.page_ids()[0]);
        assert!(((urx - llx) - 144.0).abs() < 1.0, "width {}", urx - llx);
        assert!(((ury - lly) - 72.0).abs() < 1.0, "height {}", ury - lly);
    }

    #[test]
    fn broken_input_is_a_document_scoped_failure() {
        let src = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let path = src.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-garbage").unwrap();

        let doc = SourceDocument::from_path(&path).unwrap();
        let err = ConverterRegistry::standard()
            .convert(&doc, ws.path(), &RunConfig::default())
            .unwrap_err();
        assert!(matches!(err, BinderyError::Conversion { .. }));
        assert_eq!(err.scope(), bindery_core::FailureScope::Document);
    }

    #[test]
    fn missing_office_program_fails_softly() {
        let src = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let path = src.path().join("letter.docx");
        std::fs::write(&path, b"PK").unwrap();

        let registry = ConverterRegistry::with_office(OfficeConverter::new("bindery-no-such-office-suite"));
        let doc = SourceDocument::from_path(&path).unwrap();
        let err = registry.convert(&doc, ws.path(), &RunConfig::default()).unwrap_err();
        assert!(err.to_string().contains("cannot run"), "{err}");
    }

    #[test]
    fn unregistered_kind_is_reported() {
        let ws = tempfile::tempdir().unwrap();
        let doc = SourceDocument::from_path("/tmp/x.png").unwrap();
        let err = ConverterRegistry::new()
            .convert(&doc, ws.path(), &RunConfig::default())
            .unwrap_err();
        assert!(matches!(err, BinderyError::NoConverter(_)));
    }
}
