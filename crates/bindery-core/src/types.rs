// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bindery finalization pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use crate::error::{BinderyError, Result};

/// Range expressions that mean "every page" (or "every sheet").
pub const ALL_PAGES_SENTINELS: &[&str] = &["All Pages", "全ページ"];

/// Range expression stored on newly added documents.
pub const ALL_PAGES: &str = "All Pages";

/// Whether a range expression selects everything (empty or a sentinel).
pub fn is_all_pages(expr: &str) -> bool {
    let trimmed = expr.trim();
    trimmed.is_empty() || ALL_PAGES_SENTINELS.contains(&trimmed)
}

/// Supported source document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentKind {
    Word,
    PowerPoint,
    Excel,
    Pdf,
    Image,
}

impl DocumentKind {
    /// All kinds, in the order the converter registry is populated.
    pub const ALL: [DocumentKind; 5] = [
        DocumentKind::Word,
        DocumentKind::PowerPoint,
        DocumentKind::Excel,
        DocumentKind::Pdf,
        DocumentKind::Image,
    ];

    /// Infer document kind from file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "doc" | "docx" => Some(Self::Word),
            "xls" | "xlsx" | "xlsm" => Some(Self::Excel),
            "ppt" | "pptx" => Some(Self::PowerPoint),
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            _ => None,
        }
    }

    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Word => "Word",
            Self::PowerPoint => "PowerPoint",
            Self::Excel => "Excel",
            Self::Pdf => "PDF",
            Self::Image => "Image",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One user-added input file awaiting conversion. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub kind: DocumentKind,
    /// Page range for paged documents, comma-separated sheet names for Excel.
    pub range: String,
    /// Sheet names of a workbook, in workbook order (Excel only).
    #[serde(default)]
    pub sheets: Vec<String>,
}

impl SourceDocument {
    /// Build a document from a path, inferring its kind from the extension.
    ///
    /// Returns `None` for unsupported extensions.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(DocumentKind::from_extension)?;
        Some(Self {
            path,
            kind,
            range: ALL_PAGES.to_string(),
            sheets: Vec::new(),
        })
    }

    /// File name without extension (the `{name}` tag).
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Name of the directory containing the file (the `{parent}` tag).
    pub fn parent_name(&self) -> String {
        self.path
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory containing the file.
    pub fn directory(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Fill `sheets` from the workbook on disk (Excel only).
    ///
    /// An unreadable workbook keeps an empty list and is converted whole.
    pub fn discover_sheets(&mut self) {
        if self.kind != DocumentKind::Excel {
            return;
        }
        match crate::workbook::visible_sheets(&self.path) {
            Ok(sheets) => self.sheets = sheets,
            Err(err) => warn!(path = %self.path.display(), %err, "sheet names unavailable"),
        }
    }

    /// Sheets selected by the range expression (Excel only).
    ///
    /// The all-pages sentinel selects every known sheet.
    pub fn selected_sheets(&self) -> Vec<String> {
        if is_all_pages(&self.range) {
            return self.sheets.clone();
        }
        self.range
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Ordered list of documents in one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentList {
    documents: Vec<SourceDocument>,
}

impl DocumentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document. Returns `false` if its path is already listed.
    pub fn add(&mut self, doc: SourceDocument) -> bool {
        if self.documents.iter().any(|d| d.path == doc.path) {
            debug!(path = %doc.path.display(), "document already listed");
            return false;
        }
        self.documents.push(doc);
        true
    }

    /// Add a path if its extension is supported. Returns `true` if added.
    ///
    /// Workbooks get their visible sheet names read on the way in.
    pub fn add_path(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.documents.iter().any(|d| d.path == path) {
            debug!(path = %path.display(), "document already listed");
            return false;
        }
        match SourceDocument::from_path(&path) {
            Some(mut doc) => {
                doc.discover_sheets();
                self.add(doc)
            }
            None => {
                debug!(path = %path.display(), "unsupported file type ignored");
                false
            }
        }
    }

    /// Add every supported file in `dir` (non-recursive, sorted by name).
    ///
    /// Returns how many documents were added.
    pub fn add_folder(&mut self, dir: &Path) -> Result<usize> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| match entry {
                Ok(e) => Some(e.path()),
                Err(err) => {
                    warn!(%err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect();
        entries.sort();
        Ok(entries.into_iter().filter(|p| self.add_path(p.clone())).count())
    }

    /// Swap the document at `index` with its predecessor.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.documents.len() {
            return false;
        }
        self.documents.swap(index, index - 1);
        true
    }

    /// Swap the document at `index` with its successor.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.documents.len() {
            return false;
        }
        self.documents.swap(index, index + 1);
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<SourceDocument> {
        (index < self.documents.len()).then(|| self.documents.remove(index))
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }

    /// Replace the range expression (or sheet selection) of one document.
    pub fn set_range(&mut self, index: usize, range: impl Into<String>) -> Result<()> {
        let doc = self
            .documents
            .get_mut(index)
            .ok_or_else(|| BinderyError::Config(format!("no document at index {index}")))?;
        doc.range = range.into();
        Ok(())
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// One intermediate PDF produced from a source document (one per sheet for
/// spreadsheets), already filtered by the document's range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionUnit {
    pub pdf_path: PathBuf,
    /// Index of the owning document in the job's document slice.
    pub source_index: usize,
    pub sheet: Option<String>,
    /// 1-based position of the owning document in the job (the `{fseq}` tag).
    pub file_seq: usize,
    /// Page count after range filtering.
    pub page_count: usize,
}

/// Where a watermark is drawn on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WatermarkPosition {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "diag")]
    DiagonalCenter,
    #[serde(rename = "large")]
    LargeCenter,
    #[serde(rename = "tl")]
    TopLeft,
    #[serde(rename = "tc")]
    TopCenter,
    #[serde(rename = "tr")]
    TopRight,
    #[serde(rename = "bl")]
    BottomLeft,
    #[serde(rename = "bc")]
    BottomCenter,
    #[serde(rename = "br")]
    BottomRight,
}

/// Vertical anchor of a compass position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    Top,
    Middle,
    Bottom,
}

/// Horizontal anchor of a compass position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAnchor {
    Left,
    Center,
    Right,
}

impl WatermarkPosition {
    /// Two-character id (`tl`, `bc`, ...) or the named ids `none`, `diag`, `large`.
    pub fn id(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DiagonalCenter => "diag",
            Self::LargeCenter => "large",
            Self::TopLeft => "tl",
            Self::TopCenter => "tc",
            Self::TopRight => "tr",
            Self::BottomLeft => "bl",
            Self::BottomCenter => "bc",
            Self::BottomRight => "br",
        }
    }

    /// Anchors for compass positions; `None` for the centred/diagonal modes.
    pub fn compass(&self) -> Option<(VerticalAnchor, HorizontalAnchor)> {
        use HorizontalAnchor::*;
        use VerticalAnchor::*;
        match self {
            Self::TopLeft => Some((Top, Left)),
            Self::TopCenter => Some((Top, Center)),
            Self::TopRight => Some((Top, Right)),
            Self::BottomLeft => Some((Bottom, Left)),
            Self::BottomCenter => Some((Bottom, Center)),
            Self::BottomRight => Some((Bottom, Right)),
            Self::None | Self::DiagonalCenter | Self::LargeCenter => None,
        }
    }
}

/// Where the page number is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageNumberPosition {
    #[default]
    #[serde(rename = "bc")]
    BottomCenter,
    #[serde(rename = "br")]
    BottomRight,
}

/// An sRGB colour, serialised as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    /// Parse a 6-hex-digit colour token, with or without a leading `#`.
    pub fn from_hex(token: &str) -> Result<Self> {
        let hex = token.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(BinderyError::Config(format!("invalid colour '{token}'")));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| BinderyError::Config(format!("invalid colour '{token}'")))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Channels scaled to `[0, 1]`.
    pub fn to_unit(&self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Rgb::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("DOCX"), Some(DocumentKind::Word));
        assert_eq!(DocumentKind::from_extension("xlsm"), Some(DocumentKind::Excel));
        assert_eq!(DocumentKind::from_extension("jpeg"), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_extension("txt"), None);
    }

    #[test]
    fn new_document_selects_all_pages() {
        let doc = SourceDocument::from_path("/work/reports/Q3.pdf").unwrap();
        assert_eq!(doc.kind, DocumentKind::Pdf);
        assert!(is_all_pages(&doc.range));
        assert_eq!(doc.stem(), "Q3");
        assert_eq!(doc.parent_name(), "reports");
    }

    #[test]
    fn list_deduplicates_by_path() {
        let mut list = DocumentList::new();
        assert!(list.add_path("/a/one.docx"));
        assert!(!list.add_path("/a/one.docx"));
        assert!(!list.add_path("/a/notes.txt"));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn added_workbooks_list_their_visible_sheets() {
        let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let mut list = DocumentList::new();
        assert_eq!(list.add_folder(&fixtures).unwrap(), 1);
        let book = &list.documents()[0];
        assert_eq!(book.kind, DocumentKind::Excel);
        assert_eq!(book.sheets, ["Q1", "Q2"]);
        assert_eq!(book.selected_sheets(), ["Q1", "Q2"]);
    }

    #[test]
    fn missing_workbook_keeps_no_sheets() {
        let mut list = DocumentList::new();
        assert!(list.add_path("/nowhere/book.xlsx"));
        assert!(list.documents()[0].sheets.is_empty());
    }

    #[test]
    fn list_reorders_and_removes() {
        let mut list = DocumentList::new();
        list.add_path("/a/1.pdf");
        list.add_path("/a/2.pdf");
        list.add_path("/a/3.pdf");

        assert!(list.move_up(2));
        assert!(!list.move_up(0));
        assert!(!list.move_down(2));
        let names: Vec<String> = list.documents().iter().map(|d| d.stem()).collect();
        assert_eq!(names, ["1", "3", "2"]);

        assert_eq!(list.remove(0).map(|d| d.stem()), Some("1".to_string()));
        assert!(list.remove(5).is_none());
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn add_folder_picks_supported_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.xlsx", "skip.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut list = DocumentList::new();
        assert_eq!(list.add_folder(dir.path()).unwrap(), 2);
        let kinds: Vec<DocumentKind> = list.documents().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, [DocumentKind::Excel, DocumentKind::Pdf]);
    }

    #[test]
    fn sheet_selection() {
        let mut doc = SourceDocument::from_path("/a/book.xlsx").unwrap();
        doc.sheets = vec!["Summary".into(), "Data".into()];
        assert_eq!(doc.selected_sheets(), ["Summary", "Data"]);
        doc.range = " Data , ".into();
        assert_eq!(doc.selected_sheets(), ["Data"]);
    }

    #[test]
    fn sentinels() {
        assert!(is_all_pages(""));
        assert!(is_all_pages("  All Pages "));
        assert!(is_all_pages("全ページ"));
        assert!(!is_all_pages("1-3"));
    }

    #[test]
    fn compass_positions() {
        assert_eq!(
            WatermarkPosition::TopRight.compass(),
            Some((VerticalAnchor::Top, HorizontalAnchor::Right))
        );
        assert_eq!(WatermarkPosition::DiagonalCenter.compass(), None);
        assert_eq!(WatermarkPosition::BottomCenter.id(), "bc");
    }

    #[test]
    fn colour_parsing() {
        let c = Rgb::from_hex("#C0C0C0").unwrap();
        assert_eq!(c, Rgb { r: 192, g: 192, b: 192 });
        assert_eq!(c.to_hex(), "#C0C0C0");
        let [r, _, _] = Rgb::from_hex("ff0000").unwrap().to_unit();
        assert_eq!(r, 1.0);
        assert!(Rgb::from_hex("#abc").is_err());
        assert!(Rgb::from_hex("#zzzzzz").is_err());
    }

    #[test]
    fn position_serde_uses_short_ids() {
        let json = serde_json::to_string(&WatermarkPosition::DiagonalCenter).unwrap();
        assert_eq!(json, "\"diag\"");
        let pos: PageNumberPosition = serde_json::from_str("\"br\"").unwrap();
        assert_eq!(pos, PageNumberPosition::BottomRight);
    }
}
