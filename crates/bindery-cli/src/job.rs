// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job files: the ordered document list of one run, as JSON.
//
//   { "documents": [ { "path": "a.docx", "range": "1-3" },
//                    { "path": "b.xlsx", "sheets": ["Q1", "Q2"] } ] }
//
// Relative paths are resolved against the job file's directory. Workbooks
// without an explicit sheet list have their visible sheets read from disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bindery_core::types::{DocumentList, SourceDocument};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct JobFile {
    documents: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    path: PathBuf,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    sheets: Vec<String>,
}

/// Read a job file into an ordered, de-duplicated document list.
pub fn load_job(path: &Path) -> Result<DocumentList> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading job file {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_job(&raw, base).with_context(|| format!("in job file {}", path.display()))
}

fn parse_job(raw: &str, base: &Path) -> Result<DocumentList> {
    let job: JobFile = serde_json::from_str(raw)?;
    let mut list = DocumentList::new();
    for entry in job.documents {
        let path = if entry.path.is_absolute() {
            entry.path
        } else {
            base.join(entry.path)
        };
        let Some(mut doc) = SourceDocument::from_path(&path) else {
            bail!("unsupported document type: {}", path.display());
        };
        if let Some(range) = entry.range {
            doc.range = range;
        }
        if entry.sheets.is_empty() {
            doc.discover_sheets();
        } else {
            doc.sheets = entry.sheets;
        }
        if !list.add(doc) {
            debug!(path = %path.display(), "duplicate document ignored");
        }
    }
    Ok(list)
}
