// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// bindery-pipeline: the finalization pipeline.
//
// Plans output units from converted documents, names them from a tag
// template, resolves destination collisions through a confirmation channel,
// stamps overlays, and writes the final PDFs on a background worker.

pub mod cancel;
pub mod confirm;
pub mod destination;
pub mod events;
pub mod naming;
pub mod pipeline;
pub mod planner;
pub mod runner;

pub use cancel::CancellationToken;
pub use confirm::{
    ChannelConfirmer, CollisionConfirmer, CollisionDecision, ConfirmationDesk, ConfirmationRequest,
    ConfirmationResponse, FixedDecision, confirmation_channel,
};
pub use destination::{DestinationResolver, sanitize_name};
pub use events::{EventSink, PipelineEvent, RunSummary};
pub use naming::{NamingContext, resolve_template};
pub use pipeline::{FinalizationPipeline, PipelineServices};
pub use planner::{OutputPlanner, OutputUnit, PageNumbering, UnitPart};
pub use runner::{JobRunner, RunHandle};
