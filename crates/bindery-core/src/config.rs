// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run configuration, split/merge mode settings, and the persisted config file
// with named presets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{BinderyError, Result};
use crate::types::{DocumentKind, PageNumberPosition, Rgb, WatermarkPosition};

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.json";

/// One watermark slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSpec {
    /// Text template; may contain naming tags.
    pub text: String,
    pub position: WatermarkPosition,
    /// Font token handed to the font resolver (empty = resolver default).
    pub font: String,
    /// Font size in points.
    pub size: f32,
    pub color: Rgb,
    /// Fill opacity in `[0, 1]`.
    pub alpha: f32,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            text: String::new(),
            position: WatermarkPosition::None,
            font: String::new(),
            size: 60.0,
            color: Rgb {
                r: 0xC0,
                g: 0xC0,
                b: 0xC0,
            },
            alpha: 0.3,
        }
    }
}

impl WatermarkSpec {
    /// Whether this slot draws anything.
    pub fn is_active(&self) -> bool {
        self.position != WatermarkPosition::None && !self.text.is_empty()
    }
}

/// Page-number overlay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageNumberSpec {
    pub enabled: bool,
    /// Template containing `{n}` and `{total}`, plus any naming tag.
    pub format: String,
    pub position: PageNumberPosition,
}

impl Default for PageNumberSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            format: "- {n} / {total} -".to_string(),
            position: PageNumberPosition::BottomCenter,
        }
    }
}

/// Where output files are written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "path", rename_all = "kebab-case")]
pub enum OutputLocation {
    /// Next to each source document.
    #[default]
    AlongsideSource,
    /// A fixed directory for every output.
    Directory(PathBuf),
}

/// How one document's pages are grouped when merge-all is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutputMode {
    /// One file for the whole document (all of its sheets).
    WholeDocument,
    /// One file per page.
    PerPage,
    /// One file per sheet (Excel only).
    PerSheet,
}

/// Merge/split flags.
///
/// Only the toggle methods mutate the flags, and each toggle clears the
/// flags it conflicts with, so at most one of merge-all, page-split,
/// Excel sheet-split, Excel page-split is active for a given kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    merge_all: bool,
    split_word_pages: bool,
    split_powerpoint_pages: bool,
    split_pdf_pages: bool,
    split_excel_sheets: bool,
    split_excel_pages: bool,
}

impl SplitSettings {
    pub fn merge_all(&self) -> bool {
        self.merge_all
    }

    pub fn split_excel_sheets(&self) -> bool {
        self.split_excel_sheets
    }

    /// Whether page-split is on for `kind`.
    pub fn split_pages(&self, kind: DocumentKind) -> bool {
        match kind {
            DocumentKind::Word => self.split_word_pages,
            DocumentKind::PowerPoint => self.split_powerpoint_pages,
            DocumentKind::Pdf => self.split_pdf_pages,
            DocumentKind::Excel => self.split_excel_pages,
            DocumentKind::Image => false,
        }
    }

    /// Enabling merge-all turns every split flag off.
    pub fn set_merge_all(&mut self, on: bool) {
        self.merge_all = on;
        if on {
            self.split_word_pages = false;
            self.split_powerpoint_pages = false;
            self.split_pdf_pages = false;
            self.split_excel_sheets = false;
            self.split_excel_pages = false;
        }
    }

    /// Enabling a page-split turns merge-all off.
    pub fn set_split_pages(&mut self, kind: DocumentKind, on: bool) {
        match kind {
            DocumentKind::Word => self.split_word_pages = on,
            DocumentKind::PowerPoint => self.split_powerpoint_pages = on,
            DocumentKind::Pdf => self.split_pdf_pages = on,
            DocumentKind::Excel => return self.set_excel_page_split(on),
            DocumentKind::Image => {
                debug!("page split has no meaning for images, ignored");
                return;
            }
        }
        if on {
            self.merge_all = false;
        }
    }

    /// Enabling sheet-split turns merge-all and Excel page-split off.
    pub fn set_excel_sheet_split(&mut self, on: bool) {
        self.split_excel_sheets = on;
        if on {
            self.merge_all = false;
            self.split_excel_pages = false;
        }
    }

    /// Enabling Excel page-split turns merge-all and sheet-split off.
    pub fn set_excel_page_split(&mut self, on: bool) {
        self.split_excel_pages = on;
        if on {
            self.merge_all = false;
            self.split_excel_sheets = false;
        }
    }

    /// Output grouping for one document when merge-all is off.
    pub fn mode_for(&self, kind: DocumentKind) -> DocumentOutputMode {
        if self.split_pages(kind) {
            DocumentOutputMode::PerPage
        } else if kind == DocumentKind::Excel && self.split_excel_sheets {
            DocumentOutputMode::PerSheet
        } else {
            DocumentOutputMode::WholeDocument
        }
    }

    /// Resolve conflicting flags read from disk; merge-all wins, then sheet-split.
    pub fn normalize(&mut self) {
        if self.merge_all {
            self.set_merge_all(true);
        } else if self.split_excel_sheets {
            self.set_excel_sheet_split(true);
        }
    }
}

/// Immutable snapshot of everything one finalization run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub naming_template: String,
    pub output: OutputLocation,
    pub watermarks: [WatermarkSpec; 2],
    pub page_number: PageNumberSpec,
    pub split: SplitSettings,
    /// Encrypt outputs with this password when non-empty.
    pub password: String,
    pub clear_metadata: bool,
    pub compress: bool,
    /// Converter hint: fit each Excel sheet to one page wide.
    pub excel_fit_width: bool,
    /// Converter hint: fit each Excel sheet to one page tall.
    pub excel_fit_height: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            naming_template: "{name}".to_string(),
            output: OutputLocation::default(),
            watermarks: [WatermarkSpec::default(), WatermarkSpec::default()],
            page_number: PageNumberSpec::default(),
            split: SplitSettings::default(),
            password: String::new(),
            clear_metadata: false,
            compress: false,
            excel_fit_width: false,
            excel_fit_height: false,
        }
    }
}

impl RunConfig {
    /// Whether any page needs an overlay at all.
    pub fn has_overlay(&self) -> bool {
        self.page_number.enabled || self.watermarks.iter().any(WatermarkSpec::is_active)
    }

    pub fn password(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (slot, wm) in self.watermarks.iter().enumerate() {
            if !(0.0..=1.0).contains(&wm.alpha) {
                return Err(BinderyError::Config(format!(
                    "watermark {} alpha {} outside [0, 1]",
                    slot + 1,
                    wm.alpha
                )));
            }
            if wm.is_active() && wm.size <= 0.0 {
                return Err(BinderyError::Config(format!(
                    "watermark {} size must be positive",
                    slot + 1
                )));
            }
        }
        if self.naming_template.trim().is_empty() {
            return Err(BinderyError::Config("naming template is empty".into()));
        }
        Ok(())
    }
}

/// Persisted configuration: the current settings plus named presets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub current: RunConfig,
    pub presets: BTreeMap<String, RunConfig>,
}

impl ConfigFile {
    /// Default location: `<config dir>/bindery/config.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bindery")
            .join(CONFIG_FILE)
    }

    /// Load from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) => {
                debug!(path = %path.display(), %err, "no config file, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str::<ConfigFile>(&data) {
            Ok(mut file) => {
                file.current.split.normalize();
                for preset in file.presets.values_mut() {
                    preset.split.normalize();
                }
                info!(path = %path.display(), presets = file.presets.len(), "config loaded");
                file
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "config file corrupt, using defaults");
                Self::default()
            }
        }
    }

    /// Write as pretty JSON, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Store the current settings under `name`, replacing any existing preset.
    pub fn save_preset(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BinderyError::Config("preset name is empty".into()));
        }
        self.presets.insert(name.to_string(), self.current.clone());
        Ok(())
    }

    /// Make preset `name` the current settings.
    pub fn load_preset(&mut self, name: &str) -> Result<()> {
        let preset = self
            .presets
            .get(name)
            .ok_or_else(|| BinderyError::Config(format!("unknown preset '{name}'")))?;
        self.current = preset.clone();
        info!(preset = name, "preset loaded");
        Ok(())
    }

    pub fn delete_preset(&mut self, name: &str) -> bool {
        self.presets.remove(name).is_some()
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }
}
