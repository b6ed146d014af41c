// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bindery.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Bindery operations.
#[derive(Debug, Error)]
pub enum BinderyError {
    // -- Per-document errors --
    #[error("conversion failed for {path}: {reason}")]
    Conversion { path: PathBuf, reason: String },

    #[error("range '{range}' selects no pages in {path}")]
    EmptyRange { path: PathBuf, range: String },

    #[error("no converter registered for {0}")]
    NoConverter(String),

    // -- Per-output-unit errors --
    #[error("output skipped, user aborted on existing file {0}")]
    DestinationAborted(PathBuf),

    // -- Document processing --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("font registration failed: {0}")]
    Font(String),

    // -- Run control --
    #[error("a finalization run is already in progress")]
    AlreadyRunning,

    #[error("run cancelled")]
    Cancelled,

    #[error("confirmation hand-off failed: {0}")]
    Confirmation(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How far a failure reaches inside one finalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// Skip the current source document, continue with the next one.
    Document,
    /// Skip the current output unit, continue with the next one.
    Unit,
    /// Abort the remainder of the run.
    Fatal,
}

impl BinderyError {
    /// Classify this error for the pipeline's skip-or-abort decision.
    pub fn scope(&self) -> FailureScope {
        match self {
            BinderyError::Conversion { .. }
            | BinderyError::EmptyRange { .. }
            | BinderyError::NoConverter(_) => FailureScope::Document,
            BinderyError::DestinationAborted(_) => FailureScope::Unit,
            // Fonts always degrade to a fallback; an escaped font error
            // means the fallback itself broke.
            BinderyError::PdfError(_)
            | BinderyError::ImageError(_)
            | BinderyError::Font(_)
            | BinderyError::AlreadyRunning
            | BinderyError::Cancelled
            | BinderyError::Confirmation(_)
            | BinderyError::Config(_)
            | BinderyError::Io(_)
            | BinderyError::Serialization(_) => FailureScope::Fatal,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BinderyError>;
