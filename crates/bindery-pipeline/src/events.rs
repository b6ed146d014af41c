// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress and log events flowing from the worker to the caller.
//
// The channel is unbounded, so the worker never waits on a slow consumer.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info};

/// Outcome of one finalization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Final PDFs written, in order.
    pub written: Vec<PathBuf>,
    /// Source documents skipped after a conversion or range failure.
    pub skipped_documents: usize,
    /// Output units skipped (collision aborted).
    pub skipped_units: usize,
    pub cancelled: bool,
    /// Message of the error that aborted the run, if any.
    pub fatal: Option<String>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.fatal.is_none() && !self.cancelled
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Timestamped line for the run log.
    Log { at: DateTime<Local>, message: String },
    Progress { value: usize, max: usize },
    /// Short status text, e.g. the current phase.
    Label(String),
    /// Always the last event of a run.
    Finished(RunSummary),
}

/// Sending half used by the pipeline. A vanished receiver is ignored.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that only traces.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("event receiver dropped");
            }
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.send(PipelineEvent::Log {
            at: Local::now(),
            message,
        });
    }

    pub fn progress(&self, value: usize, max: usize) {
        self.send(PipelineEvent::Progress { value, max });
    }

    pub fn label(&self, text: impl Into<String>) {
        self.send(PipelineEvent::Label(text.into()));
    }

    pub fn finished(&self, summary: RunSummary) {
        self.send(PipelineEvent::Finished(summary));
    }
}
