// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! A cancellable, single-worker job runner: progress is delivered as `(phase, processed_lba,
//! total_lba)` tuples, and a shared cancellation flag is checked at every progress callback.

use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Which stage of a long-running operation a progress tuple belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Phase {
    Extract,
    Import,
    Recrypt,
    Verify,
}

/// One progress notification: `(phase, processed_lba, total_lba)`.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Which operation is reporting.
    pub phase: Phase,
    /// LBAs processed so far.
    pub processed_lba: u64,
    /// Total LBAs the operation expects to process.
    pub total_lba: u64,
}

/// A cancellation flag shared between the caller and a running job.
///
/// Cheaply cloned (an [`Rc`] around an [`AtomicBool`]) so a driver can hold one handle to cancel
/// while the worker holds another to poll -- the crate has no multi-threaded reentrancy beyond
/// this flag, per §5's single-worker model, so `Rc` is enough; `AtomicBool` only buys a simple,
/// `Sync`-free cell with a `cancel()`/`is_canceled()` pair.
#[derive(Clone)]
pub struct CancellationToken {
    flag: Rc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, not-yet-canceled token.
    pub fn new() -> Self {
        Self {
            flag: Rc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether [`Self::cancel`] has been called.
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `body`, calling `on_progress` after each unit of work `body` reports, and short-circuiting
/// with [`crate::error::Error::Canceled`] the moment `token` is canceled.
///
/// `body` receives a reporter closure it should call with `(processed_lba, total_lba)` after each
/// chunk; this wrapper tags it with `phase` and forwards it to `on_progress`, then checks `token`.
pub fn run_cancellable<F, T>(
    phase: Phase,
    token: &CancellationToken,
    mut on_progress: impl FnMut(Progress),
    body: F,
) -> Result<T, crate::error::Error>
where
    F: FnOnce(&mut dyn FnMut(u64, u64) -> Result<(), crate::error::Error>) -> Result<T, crate::error::Error>,
{
    let mut reporter = |processed_lba: u64, total_lba: u64| -> Result<(), crate::error::Error> {
        on_progress(Progress {
            phase,
            processed_lba,
            total_lba,
        });

        if token.is_canceled() {
            return Err(crate::error::Error::Canceled);
        }

        Ok(())
    };

    body(&mut reporter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_without_cancellation() {
        let token = CancellationToken::new();
        let mut seen = Vec::new();

        let result = run_cancellable(Phase::Extract, &token, |p| seen.push(p.processed_lba), |report| {
            report(10, 100)?;
            report(100, 100)?;
            Ok(42)
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(seen, vec![10, 100]);
    }

    #[test]
    fn short_circuits_when_canceled() {
        let token = CancellationToken::new();
        let token_inner = token.clone();

        let result: Result<(), crate::error::Error> =
            run_cancellable(Phase::Verify, &token, |_| {}, |report| {
                report(1, 100)?;
                token_inner.cancel();
                report(2, 100)?;
                Ok(())
            });

        assert!(matches!(result, Err(crate::error::Error::Canceled)));
    }
}
