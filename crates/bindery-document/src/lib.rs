// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bindery-document: PDF handling for the Bindery finalization pipeline.
//
// Provides page-range parsing, page assembly into output documents (with
// metadata clearing, compression and encryption), watermark and page-number
// overlays with font resolution, and the per-kind document converters that
// produce intermediate PDFs.

pub mod convert;
pub mod overlay;
pub mod pdf;
pub mod range;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use convert::{ConvertedPdf, ConverterRegistry, DocumentConverter};
pub use overlay::font::{FontHandle, FontLibrary, FontResolver};
pub use overlay::{OverlayRenderer, OverlaySession, PageOverlay, StampedWatermark};
pub use pdf::reader::PdfReader;
pub use pdf::writer::{OutputDocument, WriteOptions};
pub use range::parse_page_spec;
