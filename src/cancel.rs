//! Cooperative cancellation between pipeline stages.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::primitive::*;

/// Shared cancel flag with an optional deadline.
///
/// Cloning shares the flag. The pipeline only looks at it between stages
/// and between halving iterations; a stage in progress always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also trips once `timeout` has elapsed from now.
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Ask every holder to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// `Err(Cancelled(stage))` if cancelled.
    pub(crate) fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            tracing::debug!("run cancelled after {stage}");
            return Err(ScaleError::Cancelled(stage));
        }
        Ok(())
    }
}
