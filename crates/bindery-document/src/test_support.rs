// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic PDFs for tests and benchmarks.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

/// One page of a synthetic document.
#[derive(Debug, Clone)]
pub struct SamplePage {
    pub label: String,
    /// Page-level media box; `None` inherits US Letter from the page tree.
    pub media_box: Option<[f32; 4]>,
    pub rotate: Option<i64>,
}

impl SamplePage {
    /// A Letter page that inherits its media box from the page tree.
    pub fn letter(label: &str) -> Self {
        Self {
            label: label.to_string(),
            media_box: None,
            rotate: None,
        }
    }

    /// An A4 page with its own media box.
    pub fn a4(label: &str) -> Self {
        Self {
            label: label.to_string(),
            media_box: Some([0.0, 0.0, 595.0, 842.0]),
            rotate: None,
        }
    }

    pub fn rotated(mut self, degrees: i64) -> Self {
        self.rotate = Some(degrees);
        self
    }
}

/// Build a PDF with one Helvetica label per page.
///
/// Media box and resources sit on the page-tree root so pages exercise
/// attribute inheritance.
pub fn sample_pdf(pages: &[SamplePage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(24)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                Operation::new("Tj", vec![Object::string_literal(page.label.clone())]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().unwrap_or_default();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));
        let mut dict = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if let Some(rect) = page.media_box {
            dict.set(
                "MediaBox",
                Object::Array(rect.iter().map(|v| Object::Real(*v)).collect()),
            );
        }
        if let Some(rotate) = page.rotate {
            dict.set("Rotate", Object::Integer(rotate));
        }
        kids.push(Object::Reference(doc.add_object(dict)));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = doc.save_to(&mut bytes);
    bytes
}

/// `sample_pdf` with `count` Letter pages labelled `Page 1`, `Page 2`, ...
pub fn numbered_pdf(count: usize) -> Vec<u8> {
    let pages: Vec<SamplePage> = (1..=count)
        .map(|n| SamplePage::letter(&format!("Page {n}")))
        .collect();
    sample_pdf(&pages)
}

/// Write `numbered_pdf(count)` to `path`.
pub fn write_numbered_pdf(path: &Path, count: usize) -> std::io::Result<()> {
    std::fs::write(path, numbered_pdf(count))
}
