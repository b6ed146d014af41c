// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Font resolution and embedding for overlays.
//
// A font token resolves to either the built-in Helvetica (WinAnsi, no
// embedding) or a TrueType font parsed with `ab_glyph`. TrueType fonts are
// embedded as Type0/CIDFontType2 with Identity-H encoding, so any glyph the
// font carries can be drawn; the width array and ToUnicode map list only the
// glyphs an output document actually used.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ab_glyph::{Font, FontArc, GlyphId};
use bindery_core::error::{BinderyError, Result};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, warn};

/// Token that always selects the built-in font.
pub const BUILTIN_FONT: &str = "Helvetica";

/// Resolves a font token to something the overlay can draw with.
///
/// Implementations never fail: an unusable font degrades to a fallback.
pub trait FontResolver: Send + Sync {
    fn resolve(&self, token: &str) -> FontHandle;
}

/// A resolved font.
#[derive(Clone)]
pub enum FontHandle {
    /// Standard-14 Helvetica with WinAnsi encoding. Non-Latin text is
    /// replaced by `?`.
    Builtin,
    TrueType(Arc<TrueTypeFont>),
}

impl fmt::Debug for FontHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str("Builtin(Helvetica)"),
            Self::TrueType(font) => write!(f, "TrueType({})", font.base_name),
        }
    }
}

impl FontHandle {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin => BUILTIN_FONT,
            Self::TrueType(font) => &font.base_name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin)
    }

    /// Advance width of `text` at `size` points.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        match self {
            Self::Builtin => helvetica_width(text, size),
            Self::TrueType(font) => font.text_width(text, size),
        }
    }
}

// ---------------------------------------------------------------------------
// TrueType
// ---------------------------------------------------------------------------

/// A parsed TrueType face and the bytes to embed for it.
pub struct TrueTypeFont {
    base_name: String,
    data: Arc<Vec<u8>>,
    font: FontArc,
}

impl TrueTypeFont {
    /// Load face `index` from a `.ttf` or `.ttc` file.
    pub fn load(path: &Path, index: u32) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|err| {
            BinderyError::Font(format!("cannot read {}: {}", path.display(), err))
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Embedded".to_string());
        let name = if index > 0 { format!("{stem}-{index}") } else { stem };
        Self::from_bytes(&name, raw, index)
    }

    /// Parse font bytes. Collections (`ttcf`) are reduced to face `index`.
    pub fn from_bytes(name: &str, raw: Vec<u8>, index: u32) -> Result<Self> {
        let data = if raw.starts_with(b"ttcf") {
            extract_collection_face(&raw, index)?
        } else if index != 0 {
            return Err(BinderyError::Font(format!(
                "{name}: face index {index} requested from a single-face font"
            )));
        } else {
            raw
        };
        if data.starts_with(b"OTTO") {
            return Err(BinderyError::Font(format!(
                "{name}: CFF-flavoured OpenType cannot be embedded as TrueType"
            )));
        }
        let font = FontArc::try_from_vec(data.clone())
            .map_err(|err| BinderyError::Font(format!("{name}: {err}")))?;
        Ok(Self {
            base_name: pdf_name(name),
            data: Arc::new(data),
            font,
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    fn units_per_em(&self) -> f32 {
        self.font.units_per_em().unwrap_or(1000.0)
    }

    pub(crate) fn glyph(&self, c: char) -> u16 {
        self.font.glyph_id(c).0
    }

    /// Advance of glyph `gid` in text-space units (1/1000 em).
    pub(crate) fn advance(&self, gid: u16) -> f32 {
        self.font.h_advance_unscaled(GlyphId(gid)) * 1000.0 / self.units_per_em()
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: f32 = text.chars().map(|c| self.advance(self.glyph(c))).sum();
        units * size / 1000.0
    }

    fn ascent(&self) -> f32 {
        self.font.ascent_unscaled() * 1000.0 / self.units_per_em()
    }

    fn descent(&self) -> f32 {
        self.font.descent_unscaled() * 1000.0 / self.units_per_em()
    }
}

/// Rebuild face `index` of a TrueType collection as a standalone sfnt.
fn extract_collection_face(data: &[u8], index: u32) -> Result<Vec<u8>> {
    let bad = |what: &str| BinderyError::Font(format!("malformed font collection: {what}"));
    let read_u32 = |at: usize| -> Result<u32> {
        data.get(at..at + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| bad("truncated"))
    };
    let read_u16 = |at: usize| -> Result<u16> {
        data.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| bad("truncated"))
    };

    let faces = read_u32(8)?;
    if index >= faces {
        return Err(BinderyError::Font(format!(
            "face index {index} out of range (collection has {faces} faces)"
        )));
    }
    let face = read_u32(12 + 4 * index as usize)? as usize;
    let num_tables = read_u16(face + 4)? as usize;

    let header_len = 12 + 16 * num_tables;
    let mut out = Vec::with_capacity(header_len);
    out.extend_from_slice(data.get(face..face + 12).ok_or_else(|| bad("face header"))?);

    let mut bodies = Vec::new();
    let mut offset = header_len;
    for table in 0..num_tables {
        let record = face + 12 + 16 * table;
        let tag = data.get(record..record + 8).ok_or_else(|| bad("table record"))?;
        let src = read_u32(record + 8)? as usize;
        let len = read_u32(record + 12)? as usize;
        let body = data.get(src..src + len).ok_or_else(|| bad("table body"))?;

        out.extend_from_slice(tag);
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(len as u32).to_be_bytes());

        let padded = (len + 3) & !3;
        bodies.extend_from_slice(body);
        bodies.resize(bodies.len() + (padded - len), 0);
        offset += padded;
    }
    out.extend_from_slice(&bodies);
    Ok(out)
}

/// Restrict a file stem to characters valid in a PDF name without escaping.
fn pdf_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Font tokens mapped to font files, with a Unicode fallback.
///
/// Tokens are file stems (case-insensitive) or direct paths; `name#2`
/// selects face 2 of a collection. Resolution order is requested font,
/// fallback font, built-in Helvetica.
#[derive(Default)]
pub struct FontLibrary {
    fonts: HashMap<String, PathBuf>,
    fallback: Option<PathBuf>,
    cache: Mutex<HashMap<String, FontHandle>>,
}

impl FontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: &str, path: impl Into<PathBuf>) {
        self.fonts.insert(token.to_lowercase(), path.into());
    }

    pub fn set_fallback(&mut self, path: impl Into<PathBuf>) {
        self.fallback = Some(path.into());
    }

    pub fn with_fallback(mut self, path: impl Into<PathBuf>) -> Self {
        self.set_fallback(path);
        self
    }

    /// Register every `.ttf`/`.ttc` file in `dir` under its file stem.
    pub fn scan_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut added = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_font = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "ttf" | "ttc"));
            if !is_font {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let stem = stem.to_string();
                self.register(&stem, path);
                added += 1;
            }
        }
        info!(dir = %dir.display(), added, "font directory scanned");
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    fn load_requested(&self, token: &str) -> Result<FontHandle> {
        let (name, index) = match token.rsplit_once('#') {
            Some((name, index)) => {
                let index = index
                    .parse::<u32>()
                    .map_err(|_| BinderyError::Font(format!("bad face index in '{token}'")))?;
                (name, index)
            }
            None => (token, 0),
        };
        let path = match self.fonts.get(&name.to_lowercase()) {
            Some(path) => path.clone(),
            None if Path::new(name).is_file() => PathBuf::from(name),
            None => return Err(BinderyError::Font(format!("font '{name}' is not registered"))),
        };
        let font = TrueTypeFont::load(&path, index)?;
        Ok(FontHandle::TrueType(Arc::new(font)))
    }

    fn resolve_uncached(&self, token: &str) -> FontHandle {
        if token.eq_ignore_ascii_case(BUILTIN_FONT) {
            return FontHandle::Builtin;
        }
        if !token.is_empty() {
            match self.load_requested(token) {
                Ok(handle) => return handle,
                Err(err) => warn!(token, %err, "requested font unavailable, trying fallback"),
            }
        }
        match &self.fallback {
            Some(path) => match TrueTypeFont::load(path, 0) {
                Ok(font) => return FontHandle::TrueType(Arc::new(font)),
                Err(err) => warn!(%err, "fallback font unusable, using Helvetica"),
            },
            None if !token.is_empty() => warn!(token, "no fallback font configured, using Helvetica"),
            None => debug!("no font requested, using Helvetica"),
        }
        FontHandle::Builtin
    }
}

impl FontResolver for FontLibrary {
    fn resolve(&self, token: &str) -> FontHandle {
        let token = token.trim();
        if let Ok(cache) = self.cache.lock() {
            if let Some(handle) = cache.get(token) {
                return handle.clone();
            }
        }
        let handle = self.resolve_uncached(token);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(token.to_string(), handle.clone());
        }
        handle
    }
}

// ---------------------------------------------------------------------------
// Helvetica
// ---------------------------------------------------------------------------

/// Helvetica advance widths for U+0020..=U+007E (AFM units).
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n..z
    334, 260, 334, 584, // {..~
];

const HELVETICA_DEFAULT_WIDTH: u16 = 556;

fn helvetica_char_width(c: char) -> u16 {
    match c {
        ' '..='~' => HELVETICA_ASCII[c as usize - 0x20],
        _ => HELVETICA_DEFAULT_WIDTH,
    }
}

fn helvetica_width(text: &str, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(helvetica_char_width(c))).sum();
    units as f32 * size / 1000.0
}

/// Encode `text` as WinAnsi bytes; unmappable characters become `?`.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// A font registered in one output document.
///
/// TrueType objects are reserved on creation and written by [`finish`],
/// after every page has recorded the glyphs it uses.
///
/// [`finish`]: EmbeddedFont::finish
pub(crate) struct EmbeddedFont {
    handle: FontHandle,
    resource: String,
    object_id: ObjectId,
    used: BTreeMap<u16, char>,
}

impl EmbeddedFont {
    pub(crate) fn new(doc: &mut Document, handle: FontHandle, resource: String) -> Self {
        let object_id = match &handle {
            FontHandle::Builtin => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => BUILTIN_FONT,
                "Encoding" => "WinAnsiEncoding",
            }),
            FontHandle::TrueType(_) => doc.new_object_id(),
        };
        Self {
            handle,
            resource,
            object_id,
            used: BTreeMap::new(),
        }
    }

    pub(crate) fn resource(&self) -> &str {
        &self.resource
    }

    pub(crate) fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub(crate) fn text_width(&self, text: &str, size: f32) -> f32 {
        self.handle.text_width(text, size)
    }

    /// Encode `text` for a `Tj` operand, recording used glyphs.
    pub(crate) fn encode(&mut self, text: &str) -> Object {
        let bytes = match &self.handle {
            FontHandle::Builtin => encode_win_ansi(text),
            FontHandle::TrueType(font) => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    let gid = font.glyph(c);
                    self.used.entry(gid).or_insert(c);
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                bytes
            }
        };
        Object::String(bytes, StringFormat::Hexadecimal)
    }

    /// Write the font objects for everything encoded so far.
    pub(crate) fn finish(self, doc: &mut Document) {
        let FontHandle::TrueType(font) = &self.handle else {
            return;
        };
        let name = font.base_name().to_string();

        let file = Stream::new(
            dictionary! { "Length1" => font.data.len() as i64 },
            (*font.data).clone(),
        );
        let file_id = doc.add_object(file);

        let ascent = font.ascent();
        let descent = font.descent();
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(name.clone().into_bytes()),
            "Flags" => 4,
            "FontBBox" => vec![
                Object::Integer(0),
                Object::Integer(descent.round() as i64),
                Object::Integer(1000),
                Object::Integer(ascent.round() as i64),
            ],
            "ItalicAngle" => 0,
            "Ascent" => ascent.round() as i64,
            "Descent" => descent.round() as i64,
            "CapHeight" => ascent.round() as i64,
            "StemV" => 80,
            "FontFile2" => file_id,
        });

        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for &gid in self.used.keys() {
            widths.push(Object::Integer(i64::from(gid)));
            widths.push(Object::Array(vec![Object::Integer(
                font.advance(gid).round() as i64,
            )]));
        }

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(
            lopdf::Dictionary::new(),
            to_unicode_cmap(&self.used).into_bytes(),
        ));

        doc.objects.insert(
            self.object_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => Object::Name(name.into_bytes()),
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(cid_font_id)],
                "ToUnicode" => to_unicode_id,
            }),
        );
        debug!(glyphs = self.used.len(), "TrueType font embedded");
    }
}

/// ToUnicode CMap mapping 2-byte glyph codes back to text.
fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = used.iter().collect();
    // bfchar blocks hold at most 100 entries.
    for block in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", block.len()));
        for (gid, c) in block {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            cmap.push_str(&format!("<{gid:04X}> <{hex}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_metrics() {
        let width = FontHandle::Builtin.text_width("Hello", 10.0);
        assert!((width - 22.78).abs() < 1e-3, "{width}");
        assert_eq!(helvetica_char_width('@'), 1015);
        assert_eq!(helvetica_char_width('~'), 584);
        assert_eq!(helvetica_char_width('日'), HELVETICA_DEFAULT_WIDTH);
    }

    #[test]
    fn win_ansi_replaces_unmappable_text() {
        assert_eq!(encode_win_ansi("é€x"), [0xE9, 0x80, b'x']);
        assert_eq!(encode_win_ansi("社外秘"), b"???");
    }

    #[test]
    fn unknown_font_without_fallback_is_helvetica() {
        let library = FontLibrary::new();
        assert!(library.resolve("NoSuchFont").is_builtin());
        assert!(library.resolve("").is_builtin());
        assert!(library.resolve("helvetica").is_builtin());
    }

    #[test]
    fn broken_fallback_degrades_to_helvetica() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("fallback.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let library = FontLibrary::new().with_fallback(&bogus);
        assert!(library.resolve("Missing").is_builtin());
    }

    #[test]
    fn cff_fonts_are_rejected() {
        let err = TrueTypeFont::from_bytes("Cff", b"OTTO\0\0\0\0".to_vec(), 0).err();
        assert!(matches!(err, Some(BinderyError::Font(msg)) if msg.contains("CFF")));
    }

    #[test]
    fn face_index_needs_a_collection() {
        assert!(TrueTypeFont::from_bytes("Single", vec![0, 1, 0, 0], 1).is_err());
    }

    #[test]
    fn scan_registers_font_files_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Gothic.ttf", "Mincho.TTC", "readme.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let mut library = FontLibrary::new();
        assert_eq!(library.scan_dir(dir.path()).unwrap(), 2);
        assert_eq!(library.len(), 2);
        // Registered but unparsable: falls through to Helvetica.
        assert!(library.resolve("gothic").is_builtin());
    }

    #[test]
    fn collection_face_is_rebuilt_standalone() {
        // 'ttcf' header with two faces; face 1 has a single 4-byte table.
        let mut ttc = Vec::new();
        ttc.extend_from_slice(b"ttcf");
        ttc.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        ttc.extend_from_slice(&2u32.to_be_bytes());
        ttc.extend_from_slice(&20u32.to_be_bytes()); // face 0 (unused)
        ttc.extend_from_slice(&20u32.to_be_bytes()); // face 1
        // face directory at 20
        ttc.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        ttc.extend_from_slice(&1u16.to_be_bytes());
        ttc.extend_from_slice(&[0, 16, 0, 0, 0, 0]);
        ttc.extend_from_slice(b"name");
        ttc.extend_from_slice(&0u32.to_be_bytes());
        ttc.extend_from_slice(&48u32.to_be_bytes()); // table offset
        ttc.extend_from_slice(&3u32.to_be_bytes()); // table length
        ttc.extend_from_slice(&[7, 8, 9]);

        let face = extract_collection_face(&ttc, 1).unwrap();
        assert_eq!(&face[0..4], &0x0001_0000u32.to_be_bytes());
        assert_eq!(&face[12..16], b"name");
        // Table now follows the 28-byte header, padded to 4 bytes.
        assert_eq!(&face[20..24], &28u32.to_be_bytes());
        assert_eq!(&face[28..], &[7, 8, 9, 0]);

        assert!(extract_collection_face(&ttc, 2).is_err());
    }

    #[test]
    fn cmap_lists_used_glyphs() {
        let used: BTreeMap<u16, char> = [(0x0024, 'A'), (0x1234, '社')].into();
        let cmap = to_unicode_cmap(&used);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0024> <0041>"));
        assert!(cmap.contains("<1234> <793E>"));
    }
}
