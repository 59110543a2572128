//! Per-frame state threaded through every shadow entry point

use std::collections::HashSet;

use crate::scene::ObjectId;

/// Explicit frame state
///
/// Carries the frame number, the viewport used for scissor calculations and
/// the set of objects that failed to render this frame. Objects in the failed
/// set are skipped by every later stage until [`FrameContext::advance`].
#[derive(Clone, Debug)]
pub struct FrameContext {
    frame_number: u64,
    viewport: (u32, u32),
    failed: HashSet<ObjectId>,
}

impl FrameContext {
    pub fn new(viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            frame_number: 0,
            viewport: (viewport_width, viewport_height),
            failed: HashSet::new(),
        }
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    /// Move to the next frame, forgetting failures
    pub fn advance(&mut self) {
        self.frame_number += 1;
        self.failed.clear();
    }

    pub fn mark_failed(&mut self, object: ObjectId) {
        self.failed.insert(object);
    }

    #[inline]
    pub fn has_failed(&self, object: ObjectId) -> bool {
        self.failed.contains(&object)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}
