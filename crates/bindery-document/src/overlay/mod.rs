// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Watermark and page-number overlays.
//
// Each stamped page gets a Form XObject whose bounding box is the page's
// media box (the transparent canvas). The page's original content is wrapped
// in `q`/`Q` and the XObject is drawn after it. Page rotation is baked into
// the content first, so overlay coordinates are always in the upright frame.

pub mod font;

use std::collections::BTreeMap;
use std::sync::Arc;

use bindery_core::config::WatermarkSpec;
use bindery_core::error::{BinderyError, Result};
use bindery_core::types::{HorizontalAnchor, PageNumberPosition, VerticalAnchor, WatermarkPosition};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, trace, warn};

use crate::pdf::reader::{number, rect, rect_object};
use font::{EmbeddedFont, FontResolver};

/// Distance from the page edge for compass-positioned watermarks.
pub const MARGIN: f32 = 20.0;
/// Page-number font size.
pub const PAGE_NUMBER_SIZE: f32 = 10.5;
/// Baseline height of the page number above the bottom edge.
pub const PAGE_NUMBER_BASELINE: f32 = 24.0;

const OVERLAY_XOBJECT: &str = "BndOverlay";

/// A watermark slot with its text already resolved for one page.
#[derive(Debug, Clone)]
pub struct StampedWatermark<'a> {
    pub spec: &'a WatermarkSpec,
    pub text: String,
}

impl StampedWatermark<'_> {
    fn is_visible(&self) -> bool {
        self.spec.position != WatermarkPosition::None && !self.text.is_empty()
    }
}

/// Everything drawn on one page.
#[derive(Debug, Clone, Default)]
pub struct PageOverlay<'a> {
    pub watermarks: Vec<StampedWatermark<'a>>,
    /// Resolved page-number text, if page numbering is on. It is drawn in
    /// the first watermark slot's font.
    pub page_number: Option<String>,
    pub page_number_position: PageNumberPosition,
}

impl PageOverlay<'_> {
    /// Whether nothing would be drawn.
    pub fn is_empty(&self) -> bool {
        !self.watermarks.iter().any(StampedWatermark::is_visible)
            && self.page_number.as_deref().is_none_or(str::is_empty)
    }
}

/// Text origin (baseline start) for a watermark in an upright `width` x
/// `height` frame.
///
/// For the diagonal mode the origin is relative to the rotated frame centred
/// on the page.
pub fn watermark_origin(
    position: WatermarkPosition,
    width: f32,
    height: f32,
    text_width: f32,
    size: f32,
) -> (f32, f32) {
    match position {
        WatermarkPosition::DiagonalCenter => (-text_width / 2.0, 0.0),
        WatermarkPosition::LargeCenter | WatermarkPosition::None => {
            ((width - text_width) / 2.0, height / 2.0)
        }
        _ => {
            let (vertical, horizontal) = position
                .compass()
                .unwrap_or((VerticalAnchor::Middle, HorizontalAnchor::Center));
            let x = match horizontal {
                HorizontalAnchor::Left => MARGIN,
                HorizontalAnchor::Right => width - text_width - MARGIN,
                HorizontalAnchor::Center => (width - text_width) / 2.0,
            };
            let y = match vertical {
                VerticalAnchor::Top => height - size - MARGIN,
                VerticalAnchor::Bottom => MARGIN,
                VerticalAnchor::Middle => height / 2.0,
            };
            (x, y)
        }
    }
}

/// Baseline start of the page number.
pub fn page_number_origin(position: PageNumberPosition, width: f32, text_width: f32) -> (f32, f32) {
    let x = match position {
        PageNumberPosition::BottomCenter => (width - text_width) / 2.0,
        PageNumberPosition::BottomRight => width - text_width - MARGIN,
    };
    (x, PAGE_NUMBER_BASELINE)
}

/// Stamps overlays using fonts from a shared resolver.
#[derive(Clone)]
pub struct OverlayRenderer {
    fonts: Arc<dyn FontResolver>,
}

impl OverlayRenderer {
    pub fn new(fonts: Arc<dyn FontResolver>) -> Self {
        Self { fonts }
    }

    /// Start stamping pages of one output document.
    pub fn session(&self) -> OverlaySession<'_> {
        OverlaySession {
            renderer: self,
            fonts: BTreeMap::new(),
            stamped: 0,
        }
    }
}

/// Per-document stamping state: fonts embedded so far.
///
/// Call [`OverlaySession::finish`] before the document is written.
pub struct OverlaySession<'r> {
    renderer: &'r OverlayRenderer,
    fonts: BTreeMap<String, EmbeddedFont>,
    stamped: usize,
}

/// The upright drawing frame of a page after rotation is baked.
struct PageFrame {
    width: f32,
    height: f32,
    origin: (f32, f32),
    /// Operations that open the wrapped original content.
    prologue: Vec<Operation>,
}

impl OverlaySession<'_> {
    /// Draw `overlay` onto page `page_id` of `doc`.
    ///
    /// Returns `false` and leaves the page untouched when there is nothing to
    /// draw.
    pub fn stamp(&mut self, doc: &mut Document, page_id: ObjectId, overlay: &PageOverlay<'_>) -> Result<bool> {
        if overlay.is_empty() {
            trace!(?page_id, "nothing to stamp");
            return Ok(false);
        }

        let frame = bake_rotation(doc, page_id)?;
        let mut fonts_used = BTreeMap::new();
        let mut states = Dictionary::new();
        let mut ops = Vec::new();

        for (slot, watermark) in overlay.watermarks.iter().enumerate() {
            if !watermark.is_visible() {
                continue;
            }
            let state = format!("BndGS{}", slot + 1);
            let alpha = watermark.spec.alpha.clamp(0.0, 1.0);
            states.set(
                state.clone(),
                dictionary! {
                    "Type" => "ExtGState",
                    "ca" => Object::Real(alpha),
                    "CA" => Object::Real(alpha),
                },
            );
            let font = self.font(doc, &watermark.spec.font);
            fonts_used.insert(font.resource().to_string(), font.object_id());
            ops.extend(watermark_ops(font, watermark, &state, frame.width, frame.height));
        }

        if let Some(text) = overlay.page_number.as_deref().filter(|t| !t.is_empty()) {
            let token = overlay.watermarks.first().map_or("", |w| w.spec.font.as_str());
            let font = self.font(doc, token);
            fonts_used.insert(font.resource().to_string(), font.object_id());
            let text_width = font.text_width(text, PAGE_NUMBER_SIZE);
            let (x, y) = page_number_origin(overlay.page_number_position, frame.width, text_width);
            ops.extend([
                Operation::new("q", vec![]),
                Operation::new("rg", vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)]),
            ]);
            ops.extend(text_ops(font, text, PAGE_NUMBER_SIZE, x, y));
            ops.push(Operation::new("Q", vec![]));
        }

        let mut font_dict = Dictionary::new();
        for (resource, id) in fonts_used {
            font_dict.set(resource, Object::Reference(id));
        }
        let canvas = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect_object([0.0, 0.0, frame.width, frame.height]),
                "Resources" => dictionary! {
                    "Font" => font_dict,
                    "ExtGState" => states,
                },
            },
            encode(ops)?,
        );
        let canvas_id = doc.add_object(canvas);

        let name = attach_xobject(doc, page_id, canvas_id)?;
        let (ox, oy) = frame.origin;
        let epilogue = vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(1.0),
                    Object::Real(0.0),
                    Object::Real(0.0),
                    Object::Real(1.0),
                    Object::Real(ox),
                    Object::Real(oy),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ];
        wrap_contents(doc, page_id, frame.prologue, epilogue)?;

        self.stamped += 1;
        Ok(true)
    }

    /// Pages stamped so far.
    pub fn stamped(&self) -> usize {
        self.stamped
    }

    /// Write the embedded font programs. Must run before serialising `doc`.
    pub fn finish(self, doc: &mut Document) {
        let fonts = self.fonts.len();
        for (_, font) in self.fonts {
            font.finish(doc);
        }
        debug!(pages = self.stamped, fonts, "overlay session finished");
    }

    fn font(&mut self, doc: &mut Document, token: &str) -> &mut EmbeddedFont {
        let next = self.fonts.len() + 1;
        let resolver = &self.renderer.fonts;
        self.fonts.entry(token.to_string()).or_insert_with(|| {
            let handle = resolver.resolve(token);
            debug!(token, font = handle.name(), "font registered for output");
            EmbeddedFont::new(doc, handle, format!("BndF{next}"))
        })
    }
}

fn watermark_ops(
    font: &mut EmbeddedFont,
    watermark: &StampedWatermark<'_>,
    state: &str,
    width: f32,
    height: f32,
) -> Vec<Operation> {
    let spec = watermark.spec;
    let text = watermark.text.as_str();
    let text_width = font.text_width(text, spec.size);
    let [r, g, b] = spec.color.to_unit();

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(state.as_bytes().to_vec())]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
    ];
    if spec.position == WatermarkPosition::DiagonalCenter {
        let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();
        ops.push(Operation::new(
            "cm",
            vec![
                Object::Real(cos),
                Object::Real(sin),
                Object::Real(-sin),
                Object::Real(cos),
                Object::Real(width / 2.0),
                Object::Real(height / 2.0),
            ],
        ));
    }
    let (x, y) = watermark_origin(spec.position, width, height, text_width, spec.size);
    ops.extend(text_ops(font, text, spec.size, x, y));
    ops.push(Operation::new("Q", vec![]));
    ops
}

fn text_ops(font: &mut EmbeddedFont, text: &str, size: f32, x: f32, y: f32) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.resource().as_bytes().to_vec()), Object::Real(size)],
        ),
        Operation::new(
            "Tm",
            vec![
                Object::Real(1.0),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(1.0),
                Object::Real(x),
                Object::Real(y),
            ],
        ),
        Operation::new("Tj", vec![font.encode(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn encode(operations: Vec<Operation>) -> Result<Vec<u8>> {
    Content { operations }
        .encode()
        .map_err(|err| BinderyError::PdfError(format!("failed to encode overlay content: {}", err)))
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_dictionary_mut(page_id)
        .map_err(|err| BinderyError::PdfError(format!("page {:?} is not a dictionary: {}", page_id, err)))
}

/// Fold `/Rotate` into the content stream and return the upright frame.
///
/// A rotated page gets a media box at the origin with width and height
/// swapped for quarter turns, and its `/Rotate` and `/CropBox` removed.
fn bake_rotation(doc: &mut Document, page_id: ObjectId) -> Result<PageFrame> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| BinderyError::PdfError(format!("page {:?} is not a dictionary: {}", page_id, err)))?;
    let [llx, lly, urx, ury] = page
        .get(b"MediaBox")
        .ok()
        .and_then(|obj| rect(doc, obj))
        .unwrap_or([0.0, 0.0, 612.0, 792.0]);
    let rotation = page
        .get(b"Rotate")
        .ok()
        .and_then(|obj| number(doc, obj))
        .map(|deg| (deg.round() as i64).rem_euclid(360))
        .unwrap_or(0);
    let (w, h) = (urx - llx, ury - lly);

    let mut prologue = vec![Operation::new("q", vec![])];
    let (matrix, width, height) = match rotation {
        0 => {
            return Ok(PageFrame {
                width: w,
                height: h,
                origin: (llx, lly),
                prologue,
            });
        }
        90 => ([0.0, -1.0, 1.0, 0.0, 0.0, w], h, w),
        180 => ([-1.0, 0.0, 0.0, -1.0, w, h], w, h),
        270 => ([0.0, 1.0, -1.0, 0.0, h, 0.0], h, w),
        other => {
            warn!(?page_id, rotation = other, "rotation is not a quarter turn, ignored");
            return Ok(PageFrame {
                width: w,
                height: h,
                origin: (llx, lly),
                prologue,
            });
        }
    };

    prologue.push(Operation::new(
        "cm",
        matrix.iter().map(|v| Object::Real(*v)).collect(),
    ));
    prologue.push(Operation::new(
        "cm",
        vec![
            Object::Real(1.0),
            Object::Real(0.0),
            Object::Real(0.0),
            Object::Real(1.0),
            Object::Real(-llx),
            Object::Real(-lly),
        ],
    ));

    let page = page_dict_mut(doc, page_id)?;
    page.set("MediaBox", rect_object([0.0, 0.0, width, height]));
    page.remove(b"Rotate");
    page.remove(b"CropBox");
    debug!(?page_id, rotation, "page rotation baked into content");

    Ok(PageFrame {
        width,
        height,
        origin: (0.0, 0.0),
        prologue,
    })
}

/// Register `canvas_id` in the page's own XObject resources and return its name.
///
/// Resource dictionaries shared with other pages are copied onto the page
/// first, so each page names only its own overlay.
fn attach_xobject(doc: &mut Document, page_id: ObjectId, canvas_id: ObjectId) -> Result<String> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| BinderyError::PdfError(format!("page {:?} is not a dictionary: {}", page_id, err)))?;
    let mut resources = resolve_dict(doc, page.get(b"Resources").ok());
    let mut xobjects = resolve_dict(doc, resources.get(b"XObject").ok());

    let mut name = OVERLAY_XOBJECT.to_string();
    let mut suffix = 1;
    while xobjects.has(name.as_bytes()) {
        suffix += 1;
        name = format!("{OVERLAY_XOBJECT}{suffix}");
    }
    xobjects.set(name.clone(), Object::Reference(canvas_id));
    resources.set("XObject", xobjects);

    page_dict_mut(doc, page_id)?.set("Resources", resources);
    Ok(name)
}

/// A dictionary value (direct or referenced) as an owned copy.
fn resolve_dict(doc: &Document, value: Option<&Object>) -> Dictionary {
    match value {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map(Clone::clone)
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    }
}

/// Replace the page's contents with `prologue`, the original streams, then `epilogue`.
fn wrap_contents(
    doc: &mut Document,
    page_id: ObjectId,
    prologue: Vec<Operation>,
    epilogue: Vec<Operation>,
) -> Result<()> {
    let original: Vec<Object> = {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|err| BinderyError::PdfError(format!("page {:?} is not a dictionary: {}", page_id, err)))?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Stream(stream)) => vec![Object::Stream(stream.clone())],
            _ => Vec::new(),
        }
    };
    // Direct streams are invalid in /Contents arrays; lift them out.
    let mut contents = Vec::with_capacity(original.len() + 2);
    contents.push(Object::Reference(doc.add_object(Stream::new(Dictionary::new(), encode(prologue)?))));
    for item in original {
        match item {
            Object::Stream(stream) => contents.push(Object::Reference(doc.add_object(stream))),
            other => contents.push(other),
        }
    }
    contents.push(Object::Reference(doc.add_object(Stream::new(Dictionary::new(), encode(epilogue)?))));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::font::FontLibrary;
    use crate::pdf::reader::PdfReader;
    use crate::pdf::writer::{OutputDocument, WriteOptions};
    use crate::test_support::{SamplePage, sample_pdf};
    use bindery_core::types::Rgb;

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(Arc::new(FontLibrary::new()))
    }

    fn output_with(pages: &[SamplePage]) -> OutputDocument {
        let reader = PdfReader::from_bytes(&sample_pdf(pages)).unwrap();
        let mut out = OutputDocument::new();
        out.append_all(&reader).unwrap();
        out
    }

    fn diag(text: &str) -> WatermarkSpec {
        WatermarkSpec {
            text: text.into(),
            position: WatermarkPosition::DiagonalCenter,
            color: Rgb { r: 255, g: 0, b: 0 },
            ..WatermarkSpec::default()
        }
    }

    fn page_content(doc: &Document, page_id: ObjectId) -> String {
        let bytes = doc.get_page_content(page_id).unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn empty_overlay_leaves_output_byte_identical() {
        let options = WriteOptions {
            clear_metadata: true,
            ..WriteOptions::default()
        };
        let untouched = output_with(&[SamplePage::letter("a")]).to_bytes(&options).unwrap();

        let mut out = output_with(&[SamplePage::letter("a")]);
        let page = out.page_ids()[0];
        let spec = WatermarkSpec {
            text: "hidden".into(),
            ..WatermarkSpec::default()
        };
        let overlay = PageOverlay {
            watermarks: vec![StampedWatermark { spec: &spec, text: "hidden".into() }],
            ..PageOverlay::default()
        };
        let renderer = renderer();
        let mut session = renderer.session();
        assert!(!session.stamp(out.document_mut(), page, &overlay).unwrap());
        session.finish(out.document_mut());

        assert_eq!(out.to_bytes(&options).unwrap(), untouched);
    }

    #[test]
    fn diagonal_watermark_draws_a_form_xobject() {
        let mut out = output_with(&[SamplePage::letter("a")]);
        let page = out.page_ids()[0];
        let spec = diag("CONFIDENTIAL");
        let overlay = PageOverlay {
            watermarks: vec![StampedWatermark { spec: &spec, text: "CONFIDENTIAL".into() }],
            ..PageOverlay::default()
        };
        let renderer = renderer();
        let mut session = renderer.session();
        assert!(session.stamp(out.document_mut(), page, &overlay).unwrap());
        session.finish(out.document_mut());

        let doc = out.document();
        let content = page_content(doc, page);
        assert!(content.contains("/BndOverlay Do"), "{content}");
        // Original content is kept, wrapped in its own graphics state.
        assert!(content.starts_with('q'));
        assert!(content.contains("BT"));

        let resources = doc.get_dictionary(page).unwrap().get(b"Resources").unwrap();
        let xobjects = resources.as_dict().unwrap().get(b"XObject").unwrap().as_dict().unwrap();
        let canvas_id = xobjects.get(b"BndOverlay").unwrap().as_reference().unwrap();
        let canvas = doc.get_object(canvas_id).unwrap().as_stream().unwrap();
        let bbox = canvas.dict.get(b"BBox").unwrap().as_array().unwrap();
        assert_eq!(rect(doc, &Object::Array(bbox.clone())), Some([0.0, 0.0, 612.0, 792.0]));
        let drawn = String::from_utf8_lossy(&canvas.content).into_owned();
        assert!(drawn.contains("/BndGS1 gs"), "{drawn}");
        assert!(drawn.contains("Tj"));
    }

    #[test]
    fn quarter_turn_is_baked_into_content() {
        let mut out = output_with(&[SamplePage::a4("turned").rotated(90)]);
        let page = out.page_ids()[0];
        let overlay = PageOverlay {
            page_number: Some("- 1 / 1 -".into()),
            ..PageOverlay::default()
        };
        let renderer = renderer();
        let mut session = renderer.session();
        session.stamp(out.document_mut(), page, &overlay).unwrap();
        session.finish(out.document_mut());

        let doc = out.document();
        let dict = doc.get_dictionary(page).unwrap();
        assert!(dict.get(b"Rotate").is_err());
        let media = rect(doc, dict.get(b"MediaBox").unwrap()).unwrap();
        assert_eq!(media, [0.0, 0.0, 842.0, 595.0]);
    }

    #[test]
    fn shared_resources_are_not_mutated() {
        let mut out = output_with(&[SamplePage::letter("a"), SamplePage::letter("b")]);
        let first = out.page_ids()[0];
        let second = out.page_ids()[1];
        let overlay = PageOverlay {
            page_number: Some("1".into()),
            ..PageOverlay::default()
        };
        let renderer = renderer();
        let mut session = renderer.session();
        session.stamp(out.document_mut(), first, &overlay).unwrap();
        session.finish(out.document_mut());

        let doc = out.document();
        let second_resources = resolve_dict(doc, doc.get_dictionary(second).unwrap().get(b"Resources").ok());
        assert!(!second_resources.has(b"XObject"));
    }

    #[test]
    fn compass_placement() {
        use WatermarkPosition::*;
        let (w, h, tw, size) = (600.0, 800.0, 100.0, 30.0);
        assert_eq!(watermark_origin(TopLeft, w, h, tw, size), (20.0, 750.0));
        assert_eq!(watermark_origin(TopRight, w, h, tw, size), (480.0, 750.0));
        assert_eq!(watermark_origin(TopCenter, w, h, tw, size), (250.0, 750.0));
        assert_eq!(watermark_origin(BottomLeft, w, h, tw, size), (20.0, 20.0));
        assert_eq!(watermark_origin(BottomRight, w, h, tw, size), (480.0, 20.0));
        assert_eq!(watermark_origin(LargeCenter, w, h, tw, size), (250.0, 400.0));
        assert_eq!(watermark_origin(DiagonalCenter, w, h, tw, size), (-50.0, 0.0));
    }

    #[test]
    fn page_number_placement() {
        assert_eq!(page_number_origin(PageNumberPosition::BottomCenter, 600.0, 40.0), (280.0, 24.0));
        assert_eq!(page_number_origin(PageNumberPosition::BottomRight, 600.0, 40.0), (540.0, 24.0));
    }

    #[test]
    fn fonts_are_shared_across_pages_of_a_session() {
        let mut out = output_with(&[SamplePage::letter("a"), SamplePage::letter("b")]);
        let pages = out.page_ids().to_vec();
        let spec = diag("DRAFT");
        let renderer = renderer();
        let mut session = renderer.session();
        for page in &pages {
            let overlay = PageOverlay {
                watermarks: vec![StampedWatermark { spec: &spec, text: "DRAFT".into() }],
                page_number: Some("x".into()),
                ..PageOverlay::default()
            };
            session.stamp(out.document_mut(), *page, &overlay).unwrap();
        }
        assert_eq!(session.stamped(), 2);
        // Watermark font "" and page-number font "" are the same token.
        assert_eq!(session.fonts.len(), 1);
        session.finish(out.document_mut());
    }

    /// Hands out Helvetica and remembers every token asked for.
    #[derive(Default)]
    struct RecordingResolver {
        tokens: std::sync::Mutex<Vec<String>>,
    }

    impl FontResolver for RecordingResolver {
        fn resolve(&self, token: &str) -> font::FontHandle {
            self.tokens.lock().unwrap().push(token.to_string());
            font::FontHandle::Builtin
        }
    }

    #[test]
    fn page_number_uses_the_watermark_font() {
        let mut out = output_with(&[SamplePage::letter("a")]);
        let page = out.page_ids()[0];
        let resolver = Arc::new(RecordingResolver::default());
        let renderer = OverlayRenderer::new(resolver.clone());
        let mut spec = diag("");
        spec.font = "Mincho".into();
        let mut session = renderer.session();
        let overlay = PageOverlay {
            watermarks: vec![StampedWatermark { spec: &spec, text: String::new() }],
            page_number: Some("第1頁".into()),
            ..PageOverlay::default()
        };

        assert!(session.stamp(out.document_mut(), page, &overlay).unwrap());
        assert_eq!(*resolver.tokens.lock().unwrap(), ["Mincho"]);
        session.finish(out.document_mut());
    }
}
