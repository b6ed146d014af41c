// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collision confirmation hand-off.
//
// The worker posts a `ConfirmationRequest` and blocks until the thread that
// owns the user interaction answers with a `ConfirmationResponse` carrying
// the same id. This is the only point where the worker waits on another
// thread.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bindery_core::error::{BinderyError, Result};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::{debug, warn};

/// Answer to "the output file already exists".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionDecision {
    Overwrite,
    /// Pick the next free `_1`, `_2`, ... suffix.
    Rename,
    /// Skip this output unit.
    Abort,
}

/// Decides what to do when an output path is already taken.
pub trait CollisionConfirmer: Send + Sync {
    /// Blocks until a decision is available.
    fn confirm(&self, path: &Path, message: &str) -> CollisionDecision;
}

/// Always answers with the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub CollisionDecision);

impl CollisionConfirmer for FixedDecision {
    fn confirm(&self, path: &Path, _message: &str) -> CollisionDecision {
        debug!(path = %path.display(), decision = ?self.0, "collision answered by policy");
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub id: u64,
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationResponse {
    pub id: u64,
    pub decision: CollisionDecision,
}

type Pending = Arc<Mutex<HashMap<u64, Sender<CollisionDecision>>>>;

/// Worker side of the hand-off.
pub struct ChannelConfirmer {
    requests: Sender<ConfirmationRequest>,
    pending: Pending,
    next_id: AtomicU64,
}

/// Answering side: receives requests and routes responses to the waiting worker.
///
/// Dropping the desk releases every waiting worker with [`CollisionDecision::Abort`].
pub struct ConfirmationDesk {
    requests: Receiver<ConfirmationRequest>,
    pending: Pending,
}

/// Create a connected confirmer/desk pair.
pub fn confirmation_channel() -> (ChannelConfirmer, ConfirmationDesk) {
    let (tx, rx) = unbounded();
    let pending: Pending = Arc::default();
    (
        ChannelConfirmer {
            requests: tx,
            pending: pending.clone(),
            next_id: AtomicU64::new(1),
        },
        ConfirmationDesk {
            requests: rx,
            pending,
        },
    )
}

impl CollisionConfirmer for ChannelConfirmer {
    fn confirm(&self, path: &Path, message: &str) -> CollisionDecision {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = bounded(1);
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.insert(id, reply_tx);
            }
            Err(_) => {
                warn!("confirmation state poisoned, aborting unit");
                return CollisionDecision::Abort;
            }
        }

        let request = ConfirmationRequest {
            id,
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.requests.send(request).is_err() {
            warn!(id, "no one to answer the collision request, aborting unit");
            self.forget(id);
            return CollisionDecision::Abort;
        }

        match reply_rx.recv() {
            Ok(decision) => decision,
            Err(_) => {
                warn!(id, "confirmation channel closed, aborting unit");
                CollisionDecision::Abort
            }
        }
    }
}

impl ChannelConfirmer {
    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl ConfirmationDesk {
    /// Incoming requests, in the order the worker posted them.
    pub fn requests(&self) -> &Receiver<ConfirmationRequest> {
        &self.requests
    }

    /// Wake the worker waiting on `response.id`.
    pub fn respond(&self, response: ConfirmationResponse) -> Result<()> {
        let reply = self
            .pending
            .lock()
            .map_err(|_| BinderyError::Confirmation("confirmation state poisoned".into()))?
            .remove(&response.id)
            .ok_or_else(|| {
                BinderyError::Confirmation(format!("no pending request with id {}", response.id))
            })?;
        reply
            .send(response.decision)
            .map_err(|_| BinderyError::Confirmation(format!("request {} no longer waiting", response.id)))
    }

    /// Answer every request with `decide` until the worker side is dropped.
    pub fn serve(&self, mut decide: impl FnMut(&ConfirmationRequest) -> CollisionDecision) {
        for request in self.requests.iter() {
            let decision = decide(&request);
            if let Err(err) = self.respond(ConfirmationResponse {
                id: request.id,
                decision,
            }) {
                warn!(%err, "collision answer not delivered");
            }
        }
    }
}

impl Drop for ConfirmationDesk {
    fn drop(&mut self) {
        // Dropping the reply senders wakes any waiting worker with Abort.
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }
}
