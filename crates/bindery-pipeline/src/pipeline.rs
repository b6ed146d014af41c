// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The finalization pipeline.
//
// convert -> range filter -> plan -> name -> resolve destination ->
// overlay + write, run sequentially on the calling thread. Intermediates
// live in a temporary workspace that is removed on every exit path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bindery_core::config::{OutputLocation, RunConfig};
use bindery_core::error::{BinderyError, FailureScope, Result};
use bindery_core::types::{ConversionUnit, DocumentKind, SourceDocument};
use bindery_document::{
    ConverterRegistry, FontResolver, OutputDocument, OverlayRenderer, PageOverlay, PdfReader, StampedWatermark,
    WriteOptions, parse_page_spec,
};
use tempfile::TempDir;
use tracing::{error, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::confirm::CollisionConfirmer;
use crate::destination::{DestinationResolver, sanitize_name};
use crate::events::{EventSink, RunSummary};
use crate::naming::{NamingContext, resolve_template};
use crate::planner::{OutputPlanner, OutputUnit, PageNumbering};

/// External collaborators the pipeline calls out to.
#[derive(Clone)]
pub struct PipelineServices {
    pub converters: ConverterRegistry,
    pub fonts: Arc<dyn FontResolver>,
    pub confirmer: Arc<dyn CollisionConfirmer>,
}

pub struct FinalizationPipeline {
    config: Arc<RunConfig>,
    converters: ConverterRegistry,
    renderer: OverlayRenderer,
    destinations: DestinationResolver,
    events: EventSink,
    cancel: CancellationToken,
    workspace_root: Option<PathBuf>,
}

/// How a run ended early.
enum Stop {
    Cancelled,
    Fatal(BinderyError),
}

impl From<BinderyError> for Stop {
    fn from(err: BinderyError) -> Self {
        Stop::Fatal(err)
    }
}

impl FinalizationPipeline {
    pub fn new(config: Arc<RunConfig>, services: PipelineServices, events: EventSink, cancel: CancellationToken) -> Self {
        Self {
            config,
            converters: services.converters,
            renderer: OverlayRenderer::new(services.fonts),
            destinations: DestinationResolver::new(services.confirmer),
            events,
            cancel,
            workspace_root: None,
        }
    }

    /// Create run workspaces under `dir` instead of the system temp directory.
    pub fn with_workspace_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(dir.into());
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Finalize `documents`. Never fails: skips, cancellation and fatal
    /// errors are all reported in the summary.
    pub fn run(&self, documents: &[SourceDocument]) -> RunSummary {
        let mut summary = RunSummary::default();
        match self.run_inner(documents, &mut summary) {
            Ok(()) => {
                self.events.log(format!(
                    "Finished: {} file(s) written, {} document(s) skipped",
                    summary.written.len(),
                    summary.skipped_documents
                ));
            }
            Err(Stop::Cancelled) => {
                summary.cancelled = true;
                self.events
                    .log(format!("Cancelled after {} file(s)", summary.written.len()));
            }
            Err(Stop::Fatal(err)) => {
                error!(%err, "finalization aborted");
                self.events.log(format!("Error: {err}"));
                summary.fatal = Some(err.to_string());
            }
        }
        summary
    }

    fn run_inner(&self, documents: &[SourceDocument], summary: &mut RunSummary) -> std::result::Result<(), Stop> {
        let workspace = self.workspace("bindery-").map_err(BinderyError::from)?;

        // Phase 1: convert and range-filter each document.
        self.events.label("Converting");
        let mut units = Vec::new();
        for (index, doc) in documents.iter().enumerate() {
            self.check_cancelled()?;
            self.events.progress(index, documents.len());
            self.events.log(format!("Converting {}", doc.path.display()));
            match self.prepare(doc, index, workspace.path()) {
                Ok(prepared) => units.extend(prepared),
                Err(err) if err.scope() == FailureScope::Document => {
                    warn!(path = %doc.path.display(), %err, "document skipped");
                    self.events.log(format!("Skipped {}: {err}", doc.path.display()));
                    summary.skipped_documents += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.events.progress(documents.len(), documents.len());

        // Phase 2: plan and write.
        let plan = OutputPlanner::plan(documents, &units, &self.config.split);
        let last_use = last_uses(&plan);
        self.events.label("Writing");
        let mut readers = HashMap::new();
        let mut seq = 0;
        for (n, output) in plan.iter().enumerate() {
            self.check_cancelled()?;
            self.events.progress(n, plan.len());
            let written = self.write_unit(documents, &units, output, &mut seq, &mut readers);
            for part in &output.parts {
                if last_use.get(&part.unit) == Some(&n) {
                    readers.remove(&part.unit);
                }
            }
            match written {
                Ok(path) => {
                    self.events.log(format!("Wrote {}", path.display()));
                    summary.written.push(path);
                }
                Err(err) if err.scope() == FailureScope::Unit => {
                    self.events.log(format!("Skipped: {err}"));
                    summary.skipped_units += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.events.progress(plan.len(), plan.len());
        close_workspace(workspace);
        Ok(())
    }

    fn workspace(&self, prefix: &str) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.workspace_root {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    fn check_cancelled(&self) -> std::result::Result<(), Stop> {
        if self.cancel.is_cancelled() {
            info!("run cancelled");
            Err(Stop::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Convert one document and apply its range expression.
    #[instrument(skip_all, fields(path = %doc.path.display()))]
    fn prepare(&self, doc: &SourceDocument, index: usize, workspace: &Path) -> Result<Vec<ConversionUnit>> {
        let converted = self.converters.convert(doc, workspace, &self.config)?;
        let as_conversion = |err: BinderyError| match err {
            BinderyError::PdfError(reason) => BinderyError::Conversion {
                path: doc.path.clone(),
                reason,
            },
            other => other,
        };

        let mut units = Vec::with_capacity(converted.len());
        for (n, pdf) in converted.into_iter().enumerate() {
            let reader = PdfReader::open(&pdf.path).map_err(as_conversion)?;
            let total = reader.page_count();
            // Excel ranges name sheets; the converter already applied them.
            let (pdf_path, page_count) = if doc.kind == DocumentKind::Excel {
                (pdf.path, total)
            } else {
                let selected = parse_page_spec(&doc.range, total);
                if selected.len() == total {
                    (pdf.path, total)
                } else if selected.is_empty() {
                    (pdf.path, 0)
                } else {
                    let filtered = workspace.join(format!("{index}-{n}-range.pdf"));
                    let pages = reader.extract_pages(&selected, &filtered).map_err(as_conversion)?;
                    (filtered, pages)
                }
            };
            if page_count == 0 {
                continue;
            }
            units.push(ConversionUnit {
                pdf_path,
                source_index: index,
                sheet: pdf.sheet,
                file_seq: index + 1,
                page_count,
            });
        }

        if units.is_empty() {
            return Err(BinderyError::EmptyRange {
                path: doc.path.clone(),
                range: doc.range.clone(),
            });
        }
        Ok(units)
    }

    fn naming_context(&self, documents: &[SourceDocument], output: &OutputUnit, seq: usize) -> NamingContext {
        let doc = &documents[output.source_index];
        let mut ctx = NamingContext::new(doc.stem());
        ctx.sheet = output.sheet.clone().unwrap_or_default();
        ctx.parent = doc.parent_name();
        ctx.global_seq = seq;
        ctx.file_seq = output.file_seq;
        ctx.page_seq = output.page_seq;
        ctx.total_files = documents.len();
        ctx.total_pages = output.page_count;
        ctx
    }

    fn base_dir(&self, doc: &SourceDocument) -> PathBuf {
        match &self.config.output {
            OutputLocation::AlongsideSource => doc.directory(),
            OutputLocation::Directory(dir) => dir.clone(),
        }
    }

    /// Name, place, assemble, stamp and write one output file.
    ///
    /// `seq` counts resolved destinations; an aborted unit leaves it alone.
    fn write_unit(
        &self,
        documents: &[SourceDocument],
        units: &[ConversionUnit],
        output: &OutputUnit,
        seq: &mut usize,
        readers: &mut HashMap<usize, PdfReader>,
    ) -> Result<PathBuf> {
        let ctx = self.naming_context(documents, output, *seq + 1);
        let name = resolve_template(&self.config.naming_template, &ctx);
        let base = self.base_dir(&documents[output.source_index]);
        let dest = self
            .destinations
            .resolve(&name, &base)?
            .ok_or_else(|| BinderyError::DestinationAborted(base.join(format!("{}.pdf", sanitize_name(&name)))))?;
        *seq += 1;

        let mut assembled = OutputDocument::new();
        for part in &output.parts {
            let reader = cached_reader(readers, units, part.unit)?;
            match part.page {
                Some(page) => {
                    let id = reader.page_ids().get(page).copied().ok_or_else(|| {
                        BinderyError::PdfError(format!("planned page {} missing from intermediate", page + 1))
                    })?;
                    assembled.append_pages(reader, &[id])?;
                }
                None => {
                    assembled.append_all(reader)?;
                }
            }
        }

        if self.config.has_overlay() {
            self.stamp_pages(&mut assembled, &ctx, output.numbering)?;
        }
        assembled.write(&dest, &WriteOptions::from_config(&self.config))?;
        Ok(dest)
    }

    /// Stamp every page. In overlay text `{seq}`/`{pseq}` are the page
    /// number and `{ptotal}` the numbering total.
    fn stamp_pages(&self, assembled: &mut OutputDocument, ctx: &NamingContext, numbering: PageNumbering) -> Result<()> {
        let mut session = self.renderer.session();
        let page_ids = assembled.page_ids().to_vec();
        for (i, page_id) in page_ids.into_iter().enumerate() {
            let n = numbering.offset + i + 1;
            let mut page_ctx = ctx.clone();
            page_ctx.global_seq = n;
            page_ctx.page_seq = n;
            page_ctx.total_pages = numbering.total;
            let overlay = self.page_overlay(&page_ctx, n, numbering.total);
            session.stamp(assembled.document_mut(), page_id, &overlay)?;
        }
        session.finish(assembled.document_mut());
        Ok(())
    }

    fn page_overlay(&self, ctx: &NamingContext, n: usize, total: usize) -> PageOverlay<'_> {
        let watermarks = self
            .config
            .watermarks
            .iter()
            .map(|spec| StampedWatermark {
                spec,
                text: resolve_template(&spec.text, ctx),
            })
            .collect();
        let spec = &self.config.page_number;
        let page_number = spec.enabled.then(|| {
            let numbered = spec
                .format
                .replace("{n}", &n.to_string())
                .replace("{total}", &total.to_string());
            resolve_template(&numbered, ctx)
        });
        PageOverlay {
            watermarks,
            page_number,
            page_number_position: spec.position,
        }
    }

    /// Render the first selected page of `doc` with the current overlays
    /// (sheet `Preview`, page 1 of 1) to `out_path`.
    #[instrument(skip_all, fields(path = %doc.path.display(), out = %out_path.display()))]
    pub fn preview(&self, doc: &SourceDocument, out_path: &Path) -> Result<()> {
        let workspace = self.workspace("bindery-preview-")?;
        let units = self.prepare(doc, 0, workspace.path())?;
        let first = units.first().ok_or_else(|| BinderyError::EmptyRange {
            path: doc.path.clone(),
            range: doc.range.clone(),
        })?;
        let reader = PdfReader::open(&first.pdf_path)?;
        let page = reader
            .page_ids()
            .first()
            .copied()
            .ok_or_else(|| BinderyError::PdfError("intermediate has no pages".into()))?;

        let mut assembled = OutputDocument::new();
        assembled.append_pages(&reader, &[page])?;

        let mut ctx = NamingContext::new(doc.stem());
        ctx.sheet = "Preview".to_string();
        ctx.parent = doc.parent_name();
        ctx.total_files = 1;
        self.stamp_pages(&mut assembled, &ctx, PageNumbering { offset: 0, total: 1 })?;

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        assembled.write(out_path, &WriteOptions::default())?;
        close_workspace(workspace);
        info!("preview written");
        Ok(())
    }
}

/// Plan index of the last output file reading each conversion unit.
fn last_uses(plan: &[OutputUnit]) -> HashMap<usize, usize> {
    let mut last = HashMap::new();
    for (n, output) in plan.iter().enumerate() {
        for part in &output.parts {
            last.insert(part.unit, n);
        }
    }
    last
}

fn cached_reader<'c>(
    readers: &'c mut HashMap<usize, PdfReader>,
    units: &[ConversionUnit],
    index: usize,
) -> Result<&'c PdfReader> {
    if !readers.contains_key(&index) {
        let unit = units
            .get(index)
            .ok_or_else(|| BinderyError::PdfError(format!("planned unit {index} does not exist")))?;
        readers.insert(index, PdfReader::open(&unit.pdf_path)?);
    }
    readers
        .get(&index)
        .ok_or_else(|| BinderyError::PdfError(format!("unit {index} not loaded")))
}

/// Remove the workspace, logging rather than failing on cleanup errors.
/// Early returns rely on `TempDir`'s drop instead.
fn close_workspace(workspace: TempDir) {
    let path = workspace.path().to_path_buf();
    if let Err(err) = workspace.close() {
        warn!(path = %path.display(), %err, "workspace cleanup failed");
    }
}
