//! Suspend/resume protocol for mesh simplification engines.
//!
//! An engine hands out a [`SimplifyOperation`] that the caller polls with
//! [`advance`](SimplifyOperation::advance) until it reports [`Step::Done`] or
//! [`Step::Cancelled`]. Drivers check a [`CancelToken`] after every step.

pub mod group;
pub mod meshopt_simplifier;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::types::WorkingMesh;

pub use group::{GroupSimplification, SimplifiedGroup};
pub use meshopt_simplifier::MeshoptSimplifier;

/// Outcome of one unit of resumable work.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// More work remains; carries progress in [0, 1].
    Continue(f32),
    Done(T),
    Cancelled,
}

impl<T> Step<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Step::Cancelled)
    }
}

/// An in-flight simplification of one mesh.
pub trait SimplifyOperation {
    fn advance(&mut self) -> Result<Step<WorkingMesh>>;
}

/// A mesh simplification engine.
pub trait Simplifier {
    /// Stable identity of the algorithm, used to key cached results.
    fn algorithm(&self) -> &str;

    /// Begin reducing `source` towards `target_vertices` vertices.
    fn start(&self, source: &WorkingMesh, target_vertices: usize) -> Result<Box<dyn SimplifyOperation>>;
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Poll `operation` until it finishes, checking `token` after every step.
pub fn run_to_completion(
    operation: &mut dyn SimplifyOperation,
    token: &CancelToken,
    mut on_progress: impl FnMut(f32),
) -> Result<Step<WorkingMesh>> {
    loop {
        let step = operation.advance()?;
        if token.is_cancelled() {
            return Ok(Step::Cancelled);
        }
        match step {
            Step::Continue(progress) => on_progress(progress),
            done => return Ok(done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        remaining: u32,
        total: u32,
    }

    impl SimplifyOperation for Countdown {
        fn advance(&mut self) -> Result<Step<WorkingMesh>> {
            if self.remaining == 0 {
                return Ok(Step::Done(WorkingMesh::default()));
            }
            self.remaining -= 1;
            Ok(Step::Continue(1.0 - self.remaining as f32 / self.total as f32))
        }
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn run_reports_progress_then_done() {
        let mut op = Countdown { remaining: 4, total: 4 };
        let mut seen = Vec::new();
        let step = run_to_completion(&mut op, &CancelToken::new(), |p| seen.push(p)).unwrap();

        assert!(step.is_done());
        assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn run_stops_when_cancelled() {
        let mut op = Countdown { remaining: 100, total: 100 };
        let token = CancelToken::new();
        let mut steps = 0;
        let step = run_to_completion(&mut op, &token, |_| {
            steps += 1;
            if steps == 3 {
                token.cancel();
            }
        })
        .unwrap();

        assert!(step.is_cancelled());
        assert_eq!(steps, 3);
        assert_eq!(op.remaining, 96);
    }
}
