// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Workbook inspection: sheet names read straight from the file, without an
// office suite.

use std::path::Path;

use calamine::{Reader, SheetVisible, open_workbook_auto};
use tracing::debug;

use crate::error::{BinderyError, Result};

/// Names of the visible sheets of a workbook, in workbook order.
///
/// Hidden and very-hidden sheets are left out.
pub fn visible_sheets(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path).map_err(|err| BinderyError::Conversion {
        path: path.to_path_buf(),
        reason: format!("cannot read workbook: {err}"),
    })?;
    let sheets: Vec<String> = workbook
        .sheets_metadata()
        .iter()
        .filter(|sheet| sheet.visible == SheetVisible::Visible)
        .map(|sheet| sheet.name.clone())
        .collect();
    debug!(path = %path.display(), sheets = sheets.len(), "workbook sheets read");
    Ok(sheets)
}
