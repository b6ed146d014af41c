// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background run worker.
//
// One finalization run at a time executes on a dedicated thread. The caller
// keeps a `RunHandle` to drain events, cancel, and join.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use bindery_core::config::RunConfig;
use bindery_core::error::{BinderyError, Result};
use bindery_core::types::SourceDocument;
use crossbeam_channel::Receiver;
use tracing::{error, info};

use crate::cancel::CancellationToken;
use crate::events::{EventSink, PipelineEvent, RunSummary};
use crate::pipeline::{FinalizationPipeline, PipelineServices};

/// Starts runs and rejects overlapping ones.
pub struct JobRunner {
    services: PipelineServices,
    processing: Arc<AtomicBool>,
}

/// Clears the processing flag however the worker exits.
struct ProcessingGuard(Arc<AtomicBool>);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl JobRunner {
    pub fn new(services: PipelineServices) -> Self {
        Self {
            services,
            processing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Snapshot `config` and `documents` and finalize them on a worker thread.
    pub fn start(&self, config: RunConfig, documents: Vec<SourceDocument>) -> Result<RunHandle> {
        config.validate()?;
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BinderyError::AlreadyRunning);
        }
        let guard = ProcessingGuard(self.processing.clone());

        let (events, rx) = EventSink::channel();
        let cancel = CancellationToken::new();
        let pipeline = FinalizationPipeline::new(Arc::new(config), self.services.clone(), events.clone(), cancel.clone());

        info!(documents = documents.len(), "starting finalization run");
        let thread = thread::Builder::new()
            .name("bindery-worker".into())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| pipeline.run(&documents)));
                let summary = outcome.unwrap_or_else(|_| {
                    error!("finalization worker panicked");
                    events.log("Error: worker panicked");
                    RunSummary {
                        fatal: Some("worker panicked".into()),
                        ..RunSummary::default()
                    }
                });
                // Release the trigger before announcing the end.
                drop(guard);
                events.finished(summary.clone());
                summary
            })
            .map_err(BinderyError::Io)?;

        Ok(RunHandle {
            events: rx,
            cancel,
            thread,
        })
    }
}

/// Caller's side of one run.
pub struct RunHandle {
    events: Receiver<PipelineEvent>,
    cancel: CancellationToken,
    thread: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Ask the worker to stop at the next document or output unit.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and return its summary.
    pub fn join(self) -> RunSummary {
        self.thread.join().unwrap_or_else(|_| RunSummary {
            fatal: Some("worker panicked".into()),
            ..RunSummary::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{CollisionConfirmer, CollisionDecision};
    use bindery_core::config::OutputLocation;
    use bindery_core::types::DocumentKind;
    use bindery_document::test_support::write_numbered_pdf;
    use bindery_document::{ConvertedPdf, ConverterRegistry, DocumentConverter, FontLibrary};
    use crossbeam_channel::{Sender, bounded};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// Blocks inside `convert` until the test releases it.
    struct GatedConverter {
        entered: Sender<()>,
        release: Mutex<Receiver<()>>,
    }

    impl DocumentConverter for GatedConverter {
        fn convert(&self, doc: &SourceDocument, workspace: &Path, _config: &RunConfig) -> Result<Vec<ConvertedPdf>> {
            let _ = self.entered.send(());
            let _ = self.release.lock().unwrap().recv();
            let path = workspace.join(format!("{}.pdf", doc.stem()));
            write_numbered_pdf(&path, 1)?;
            Ok(vec![ConvertedPdf::new(path)])
        }
    }

    struct Abort;

    impl CollisionConfirmer for Abort {
        fn confirm(&self, _path: &Path, _message: &str) -> CollisionDecision {
            CollisionDecision::Abort
        }
    }

    fn gated_runner() -> (JobRunner, crossbeam_channel::Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = bounded(8);
        let (release_tx, release_rx) = bounded(8);
        let converter = Arc::new(GatedConverter {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        });
        let mut converters = ConverterRegistry::new();
        converters.register(DocumentKind::Word, converter);
        let runner = JobRunner::new(PipelineServices {
            converters,
            fonts: Arc::new(FontLibrary::new()),
            confirmer: Arc::new(Abort),
        });
        (runner, entered_rx, release_tx)
    }

    fn config(out: &Path) -> RunConfig {
        RunConfig {
            output: OutputLocation::Directory(out.to_path_buf()),
            ..RunConfig::default()
        }
    }

    fn docs(names: &[&str]) -> Vec<SourceDocument> {
        names
            .iter()
            .map(|n| SourceDocument::from_path(PathBuf::from("/in").join(n)).unwrap())
            .collect()
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let out = tempfile::tempdir().unwrap();
        let (runner, entered, release) = gated_runner();

        let handle = runner.start(config(out.path()), docs(&["a.docx"])).unwrap();
        entered.recv().unwrap();
        assert!(runner.is_processing());
        assert!(matches!(
            runner.start(config(out.path()), docs(&["b.docx"])),
            Err(BinderyError::AlreadyRunning)
        ));

        release.send(()).unwrap();
        let summary = handle.join();
        assert_eq!(summary.written, [out.path().join("a.pdf")]);
        assert!(!runner.is_processing());

        // The trigger is usable again.
        let again = runner.start(config(out.path()), Vec::new()).unwrap();
        assert!(again.join().succeeded());
    }

    #[test]
    fn finished_is_the_last_event() {
        let out = tempfile::tempdir().unwrap();
        let (runner, _entered, release) = gated_runner();
        release.send(()).unwrap();

        let handle = runner.start(config(out.path()), docs(&["a.docx"])).unwrap();
        let events: Vec<PipelineEvent> = handle.events().iter().collect();
        assert!(matches!(events.last(), Some(PipelineEvent::Finished(s)) if s.written.len() == 1));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, PipelineEvent::Finished(_)))
                .count(),
            1
        );
        handle.join();
    }

    #[test]
    fn cancel_stops_before_the_next_document() {
        let out = tempfile::tempdir().unwrap();
        let (runner, entered, release) = gated_runner();

        let handle = runner.start(config(out.path()), docs(&["a.docx", "b.docx", "c.docx"])).unwrap();
        entered.recv().unwrap();
        handle.cancel();
        release.send(()).unwrap();

        let summary = handle.join();
        assert!(summary.cancelled);
        assert!(summary.written.is_empty());
        assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let out = tempfile::tempdir().unwrap();
        let (runner, _entered, _release) = gated_runner();
        let mut bad = config(out.path());
        bad.naming_template = "  ".into();
        assert!(matches!(runner.start(bad, docs(&["a.docx"])), Err(BinderyError::Config(_))));
        assert!(!runner.is_processing());
    }
}
