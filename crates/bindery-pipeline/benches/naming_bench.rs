// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the bindery-pipeline crate: template expansion,
// file-name sanitizing and output planning for a large page-split job.

use bindery_core::config::SplitSettings;
use bindery_core::types::{ConversionUnit, DocumentKind, SourceDocument};
use bindery_pipeline::{NamingContext, OutputPlanner, resolve_template, sanitize_name};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

fn bench_templates(c: &mut Criterion) {
    let mut ctx = NamingContext::new("Quarterly Report");
    ctx.sheet = "Summary".into();
    ctx.parent = "finance".into();
    ctx.global_seq = 42;
    ctx.page_seq = 7;

    c.bench_function("resolve_template (every tag)", |b| {
        b.iter(|| {
            resolve_template(
                black_box("{parent}/{name}_{sheet}_{seq}_{fseq}_{pseq}of{ptotal}_{username}_{date:yyyymmdd-HHMMSS}"),
                &ctx,
            )
        });
    });

    c.bench_function("resolve_template (no tags)", |b| {
        b.iter(|| resolve_template(black_box("plain output name"), &ctx));
    });

    c.bench_function("sanitize_name", |b| {
        b.iter(|| sanitize_name(black_box(r#"a\b/c:d*e?f"g<h>i|j and some more text"#)));
    });
}

/// 200 Word documents of 25 pages each, split per page.
fn bench_planning(c: &mut Criterion) {
    let documents: Vec<SourceDocument> = (0..200)
        .filter_map(|n| SourceDocument::from_path(format!("/in/doc{n}.docx")))
        .collect();
    let units: Vec<ConversionUnit> = (0..documents.len())
        .map(|n| ConversionUnit {
            pdf_path: format!("/tmp/{n}.pdf").into(),
            source_index: n,
            sheet: None,
            file_seq: n + 1,
            page_count: 25,
        })
        .collect();
    let mut split = SplitSettings::default();
    split.set_split_pages(DocumentKind::Word, true);

    c.bench_function("plan page split (5000 outputs)", |b| {
        b.iter(|| OutputPlanner::plan(black_box(&documents), black_box(&units), &split));
    });
}

criterion_group!(benches, bench_templates, bench_planning);
criterion_main!(benches);
