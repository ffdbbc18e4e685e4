//! The history coordinator: one editing session's current image plus its
//! bounded undo and redo stacks.
//!
//! Every apply is a small transaction. The current image is pushed onto the
//! undo stack, the operation runs, and the session either commits the new
//! image (dropping the redo branch) or rolls back to exactly the state it had
//! before the call.

use std::{
    any::Any,
    collections::VecDeque,
    mem,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::{ProcessingErrorKind, Result, RetouchError},
    traits::ImageOperation,
    types::{Image, SharedImage},
};

/// Default bound on the undo stack.
pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Applying,
}

/// A snapshot together with the name of the operation that led away from it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub image: SharedImage,
    pub label: String,
}

/// Operation names on either side of the current image, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryView {
    pub undo: Vec<String>,
    pub redo: Vec<String>,
}

/// Bookkeeping for an apply that has taken its snapshot but not finished.
#[must_use]
#[derive(Debug)]
pub(crate) struct PendingApply {
    label: String,
    evicted: Option<HistoryEntry>,
}

impl PendingApply {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug)]
pub struct Session {
    current: SharedImage,
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    state: SessionState,
    max_history: usize,
}

impl Session {
    pub fn new(image: Image) -> Self {
        Self::with_max_history(image, MAX_HISTORY)
    }

    /// Create a session whose undo stack holds at most `max_history` entries.
    pub fn with_max_history(image: Image, max_history: usize) -> Self {
        Self {
            current: Arc::new(image),
            undo: VecDeque::new(),
            redo: Vec::new(),
            state: SessionState::Idle,
            max_history: max_history.max(1),
        }
    }

    pub fn current(&self) -> SharedImage {
        Arc::clone(&self.current)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn history(&self) -> HistoryView {
        HistoryView {
            undo: self.undo.iter().map(|entry| entry.label.clone()).collect(),
            redo: self.redo.iter().rev().map(|entry| entry.label.clone()).collect(),
        }
    }

    /// Apply `operation` to the current image.
    ///
    /// On failure the session is left exactly as it was and the operation's
    /// error is returned unchanged. A panicking operation is rolled back and
    /// reported as [`ProcessingErrorKind::Panicked`].
    pub fn apply(&mut self, operation: &dyn ImageOperation) -> Result<SharedImage> {
        let pending = self.begin(operation.name())?;
        let input = self.current();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| operation.apply(&input)))
            .unwrap_or_else(|payload| {
                Err(RetouchError::processing(
                    pending.label(),
                    ProcessingErrorKind::Panicked,
                    panic_message(payload.as_ref()),
                ))
            });
        self.finish(pending, outcome)
    }

    /// Take the pre-apply snapshot. The caller must hand the result of the
    /// operation back to [`Session::finish`].
    pub(crate) fn begin(&mut self, label: String) -> Result<PendingApply> {
        if self.state == SessionState::Applying {
            return Err(RetouchError::IllegalState(format!(
                "cannot start '{label}' while another operation is being applied"
            )));
        }

        self.undo.push_back(HistoryEntry {
            image: self.current(),
            label: label.clone(),
        });
        let evicted = if self.undo.len() > self.max_history {
            self.undo.pop_front()
        } else {
            None
        };
        self.state = SessionState::Applying;

        debug!(operation = %label, undo = self.undo.len(), "snapshot taken");
        Ok(PendingApply { label, evicted })
    }

    /// Commit or roll back an apply started with [`Session::begin`].
    pub(crate) fn finish(
        &mut self,
        pending: PendingApply,
        outcome: Result<Image>,
    ) -> Result<SharedImage> {
        self.state = SessionState::Idle;
        let PendingApply { label, evicted } = pending;

        match outcome {
            Ok(image) => {
                self.current = Arc::new(image);
                self.redo.clear();
                if evicted.is_some() {
                    debug!(operation = %label, "oldest history entry discarded");
                }
                info!(
                    operation = %label,
                    width = self.current.width(),
                    height = self.current.height(),
                    undo = self.undo.len(),
                    "operation committed"
                );
                Ok(self.current())
            }
            Err(err) => {
                if let Some(snapshot) = self.undo.pop_back() {
                    self.current = snapshot.image;
                }
                if let Some(evicted) = evicted {
                    self.undo.push_front(evicted);
                }
                warn!(operation = %label, error = %err, "operation failed, rolled back");
                Err(err)
            }
        }
    }

    /// Step back one entry. Returns the new current image, or `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> Option<SharedImage> {
        let entry = self.undo.pop_back()?;
        let previous = mem::replace(&mut self.current, entry.image);
        info!(operation = %entry.label, "undo");
        self.redo.push(HistoryEntry {
            image: previous,
            label: entry.label,
        });
        Some(self.current())
    }

    /// Step forward one entry. Returns the new current image, or `None` when
    /// there is nothing to redo.
    pub fn redo(&mut self) -> Option<SharedImage> {
        let entry = self.redo.pop()?;
        let previous = mem::replace(&mut self.current, entry.image);
        info!(operation = %entry.label, "redo");
        self.undo.push_back(HistoryEntry {
            image: previous,
            label: entry.label,
        });
        Some(self.current())
    }
}

/// Text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string())
}
