//! Context-carried cancel signal: checked at every suspension
//! point (I/O reads, backend I/O, full channels, VFS node-lock waits).
//! Modeled as a plain `Arc<AtomicBool>` flag rather than a new crate
//! dependency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Convenience for suspension points: `Err(Cancelled)` if set, else
    /// `Ok(())`.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(crate::error::EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
