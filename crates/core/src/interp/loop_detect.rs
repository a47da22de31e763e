//! Traversal loop detection.
//!
//! Resource dictionaries may reference themselves (a Pattern whose Resources
//! contain the same Pattern), so every recursive descent is bracketed by a
//! mark/clear-to-mark scope tracking the identity of currently-open objects.
//! Only open ancestors bar a revisit: an object fully exited earlier may be
//! visited again later in the walk.

use crate::error::{RenderError, Result};

/// Upper bound on simultaneously open scopes plus tracked objects. Exceeding
/// it fails the whole check; callers fall back to a conservative answer.
const MAX_TRACKED: usize = 4096;

/// Scoped visited-set over object identities.
#[derive(Debug, Default)]
pub struct LoopDetector {
    /// Stack of scope start offsets into `active`.
    frames: Vec<usize>,
    /// Identity keys of currently-open objects, grouped by scope.
    active: Vec<usize>,
}

impl LoopDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new scope. Objects added after this call are dropped together
    /// by the matching `cleartomark`.
    pub fn mark(&mut self) -> Result<()> {
        if self.frames.len() + self.active.len() >= MAX_TRACKED {
            return Err(RenderError::VmError);
        }
        self.frames.push(self.active.len());
        Ok(())
    }

    /// Close the innermost scope, forgetting every object it tracked.
    pub fn cleartomark(&mut self) {
        if let Some(start) = self.frames.pop() {
            self.active.truncate(start);
        }
    }

    /// Record an object about to be descended into. Returns `false` if the
    /// object is already open in this or any enclosing scope, in which case
    /// it must be treated as explored and not recursed.
    pub fn test_and_add(&mut self, key: usize) -> Result<bool> {
        if self.active.contains(&key) {
            return Ok(false);
        }
        if self.frames.is_empty() {
            // No open scope: nothing to attach the key to.
            return Err(RenderError::LimitCheck("unmatched loop mark".into()));
        }
        if self.active.len() >= MAX_TRACKED {
            return Err(RenderError::VmError);
        }
        self.active.push(key);
        Ok(true)
    }

    /// Number of currently open scopes.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
