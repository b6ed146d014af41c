// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output planning: groups conversion units into the files to be written.

use bindery_core::config::{DocumentOutputMode, SplitSettings};
use bindery_core::types::{ConversionUnit, SourceDocument};
use tracing::debug;

/// One slice of a conversion unit placed into an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPart {
    /// Index into the planned conversion-unit slice.
    pub unit: usize,
    /// A single 0-based page, or `None` for every page of the unit.
    pub page: Option<usize>,
}

/// How page numbers run through an output file.
///
/// Page `i` (0-based) of the file is numbered `offset + i + 1` of `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumbering {
    pub offset: usize,
    pub total: usize,
}

/// Exactly one final PDF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    pub parts: Vec<UnitPart>,
    /// Document providing `{name}`, `{parent}` and the alongside-source directory.
    pub source_index: usize,
    pub file_seq: usize,
    /// `{pseq}`: page or sheet counter within the document.
    pub page_seq: usize,
    pub sheet: Option<String>,
    /// Pages in this file (`{ptotal}`).
    pub page_count: usize,
    pub numbering: PageNumbering,
}

pub struct OutputPlanner;

impl OutputPlanner {
    /// Plan the output files for `units`, which must be in document order.
    ///
    /// `documents` is indexed by [`ConversionUnit::source_index`].
    pub fn plan(documents: &[SourceDocument], units: &[ConversionUnit], split: &SplitSettings) -> Vec<OutputUnit> {
        if units.is_empty() {
            return Vec::new();
        }
        let planned = if split.merge_all() {
            vec![Self::merge_all(units)]
        } else {
            Self::per_document(documents, units, split)
        };
        debug!(units = units.len(), outputs = planned.len(), "output planned");
        planned
    }

    fn merge_all(units: &[ConversionUnit]) -> OutputUnit {
        let first = &units[0];
        let pages = units.iter().map(|u| u.page_count).sum();
        OutputUnit {
            parts: (0..units.len()).map(|unit| UnitPart { unit, page: None }).collect(),
            source_index: first.source_index,
            file_seq: first.file_seq,
            page_seq: 1,
            sheet: first.sheet.clone(),
            page_count: pages,
            numbering: PageNumbering { offset: 0, total: pages },
        }
    }

    fn per_document(documents: &[SourceDocument], units: &[ConversionUnit], split: &SplitSettings) -> Vec<OutputUnit> {
        let mut planned = Vec::new();
        let mut start = 0;

        while start < units.len() {
            let source_index = units[start].source_index;
            let end = units[start..]
                .iter()
                .position(|u| u.source_index != source_index)
                .map_or(units.len(), |n| start + n);
            let group = start..end;
            let Some(doc) = documents.get(source_index) else {
                start = end;
                continue;
            };
            let doc_pages: usize = units[group.clone()].iter().map(|u| u.page_count).sum();

            match split.mode_for(doc.kind) {
                DocumentOutputMode::PerPage => {
                    let mut page_seq = 0;
                    for unit in group {
                        let u = &units[unit];
                        for page in 0..u.page_count {
                            page_seq += 1;
                            planned.push(OutputUnit {
                                parts: vec![UnitPart { unit, page: Some(page) }],
                                source_index,
                                file_seq: u.file_seq,
                                page_seq,
                                sheet: u.sheet.clone(),
                                page_count: 1,
                                numbering: PageNumbering {
                                    offset: page_seq - 1,
                                    total: doc_pages,
                                },
                            });
                        }
                    }
                }
                DocumentOutputMode::PerSheet => {
                    for (n, unit) in group.enumerate() {
                        let u = &units[unit];
                        planned.push(OutputUnit {
                            parts: vec![UnitPart { unit, page: None }],
                            source_index,
                            file_seq: u.file_seq,
                            page_seq: n + 1,
                            sheet: u.sheet.clone(),
                            page_count: u.page_count,
                            numbering: PageNumbering {
                                offset: 0,
                                total: u.page_count,
                            },
                        });
                    }
                }
                DocumentOutputMode::WholeDocument => {
                    let first = &units[start];
                    planned.push(OutputUnit {
                        parts: group.map(|unit| UnitPart { unit, page: None }).collect(),
                        source_index,
                        file_seq: first.file_seq,
                        page_seq: 1,
                        sheet: first.sheet.clone(),
                        page_count: doc_pages,
                        numbering: PageNumbering {
                            offset: 0,
                            total: doc_pages,
                        },
                    });
                }
            }
            start = end;
        }
        planned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_core::types::DocumentKind;
    use std::path::PathBuf;

    fn doc(name: &str) -> SourceDocument {
        SourceDocument::from_path(format!("/in/{name}")).unwrap()
    }

    fn unit(source_index: usize, sheet: Option<&str>, pages: usize) -> ConversionUnit {
        ConversionUnit {
            pdf_path: PathBuf::from(format!("/tmp/{source_index}-{sheet:?}.pdf")),
            source_index,
            sheet: sheet.map(str::to_string),
            file_seq: source_index + 1,
            page_count: pages,
        }
    }

    fn job() -> (Vec<SourceDocument>, Vec<ConversionUnit>) {
        let docs = vec![doc("a.docx"), doc("b.xlsx"), doc("c.pdf")];
        let units = vec![
            unit(0, None, 3),
            unit(1, Some("Q1"), 2),
            unit(1, Some("Q2"), 1),
            unit(2, None, 2),
        ];
        (docs, units)
    }

    #[test]
    fn default_mode_is_one_file_per_document() {
        let (docs, units) = job();
        let plan = OutputPlanner::plan(&docs, &units, &SplitSettings::default());
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.iter().map(|o| o.source_index).collect::<Vec<_>>(), [0, 1, 2]);
        let workbook = &plan[1];
        assert_eq!(workbook.parts.len(), 2);
        assert_eq!(workbook.page_count, 3);
        assert_eq!(workbook.sheet.as_deref(), Some("Q1"));
        assert_eq!(workbook.numbering, PageNumbering { offset: 0, total: 3 });
    }

    #[test]
    fn merge_all_is_a_single_file() {
        let (docs, units) = job();
        let mut split = SplitSettings::default();
        split.set_merge_all(true);
        let plan = OutputPlanner::plan(&docs, &units, &split);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].parts.len(), 4);
        assert_eq!(plan[0].page_count, 8);
        assert_eq!(plan[0].numbering, PageNumbering { offset: 0, total: 8 });
    }

    #[test]
    fn page_split_numbers_against_the_document() {
        let (docs, units) = job();
        let mut split = SplitSettings::default();
        split.set_split_pages(DocumentKind::Word, true);
        let plan = OutputPlanner::plan(&docs, &units, &split);

        // 3 Word pages, the workbook, the PDF.
        assert_eq!(plan.len(), 5);
        for (i, out) in plan[..3].iter().enumerate() {
            assert_eq!(out.parts, [UnitPart { unit: 0, page: Some(i) }]);
            assert_eq!(out.page_seq, i + 1);
            assert_eq!(out.page_count, 1);
            assert_eq!(out.numbering, PageNumbering { offset: i, total: 3 });
        }
        assert_eq!(plan[3].source_index, 1);
        assert_eq!(plan[4].source_index, 2);
    }

    #[test]
    fn sheet_split_emits_one_file_per_sheet() {
        let (docs, units) = job();
        let mut split = SplitSettings::default();
        split.set_excel_sheet_split(true);
        let plan = OutputPlanner::plan(&docs, &units, &split);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[1].sheet.as_deref(), Some("Q1"));
        assert_eq!(plan[2].sheet.as_deref(), Some("Q2"));
        assert_eq!(plan[2].page_seq, 2);
        assert_eq!(plan[2].numbering, PageNumbering { offset: 0, total: 1 });
    }

    #[test]
    fn excel_page_split_spans_sheets() {
        let (docs, units) = job();
        let mut split = SplitSettings::default();
        split.set_excel_page_split(true);
        let plan = OutputPlanner::plan(&docs, &units, &split);
        let sheets: Vec<_> = plan
            .iter()
            .filter(|o| o.source_index == 1)
            .map(|o| (o.sheet.clone().unwrap(), o.page_seq, o.numbering.offset))
            .collect();
        assert_eq!(
            sheets,
            [
                (String::from("Q1"), 1, 0),
                (String::from("Q1"), 2, 1),
                (String::from("Q2"), 3, 2)
            ]
        );
    }

    #[test]
    fn nothing_to_plan() {
        let (docs, _) = job();
        assert!(OutputPlanner::plan(&docs, &[], &SplitSettings::default()).is_empty());
    }
}
