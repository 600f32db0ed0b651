// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Cooperative cancellation token (§5), threaded through store calls and the
//! crate's own filesystem enumerations.
//!
//! There is no task pool to cancel out from under: every long-running
//! operation is a blocking loop over filesystem entries or a single store
//! call, so cancellation is just a flag polled at each iteration. Observing a
//! set flag aborts the current operation with [`Cancelled`] and leaves
//! whatever partial filesystem state the atomicity primitives already
//! guarantee (§5) — there is no additional rollback.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use thiserror::Error;

/// Returned when a [`Cancellable`] was observed cancelled mid-operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// A shareable, settable cancellation flag.
///
/// Cloning shares the same underlying flag, so a token handed to a long-running
/// call can be cancelled from elsewhere (another thread, a signal handler) while
/// the call is polling it.
#[derive(Debug, Clone, Default)]
pub struct Cancellable(Arc<AtomicBool>);

impl Cancellable {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Poll the flag, returning [`Cancelled`] if it is set.
    ///
    /// Called at I/O boundaries (directory iteration steps, before a store
    /// call) rather than once per function, so a cancellation request is
    /// observed promptly even inside a long recursive walk.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Poll an `Option<&Cancellable>`, treating `None` as "never cancelled".
pub fn check(cancellable: Option<&Cancellable>) -> Result<(), Cancelled> {
    match cancellable {
        Some(token) => token.check(),
        None => Ok(()),
    }
}
