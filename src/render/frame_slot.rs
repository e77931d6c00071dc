//! Double-buffered hand-off of decoded frames to the render thread
//!
//! The decoder publishes into the back buffer, the renderer promotes it to the
//! front on acquire. A frame published while another is still pending replaces
//! it and is counted as dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use super::frame::VideoFrame;

#[derive(Default)]
struct SlotInner {
    front: Option<Arc<VideoFrame>>,
    back: Option<Arc<VideoFrame>>,
    replaced: u64,
    published: u64,
}

/// Frame acquired by the renderer
#[derive(Debug, Clone)]
pub struct AcquiredFrame {
    pub frame: Arc<VideoFrame>,
    /// True when the frame was promoted by this acquire and needs uploading
    pub is_new: bool,
}

/// Latest-frame-wins slot shared between decoder and renderer
#[derive(Default)]
pub struct FrameSlot {
    inner: Mutex<SlotInner>,
}

impl std::fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("FrameSlot")
            .field("has_front", &inner.front.is_some())
            .field("has_back", &inner.back.is_some())
            .field("replaced", &inner.replaced)
            .finish()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store a newly decoded frame
    pub fn publish(&self, frame: VideoFrame) {
        let mut inner = self.lock();
        if inner.back.replace(Arc::new(frame)).is_some() {
            inner.replaced += 1;
        }
        inner.published += 1;
    }

    /// Get the frame to display, promoting a pending one if present
    pub fn acquire(&self) -> Option<AcquiredFrame> {
        let mut inner = self.lock();
        if let Some(pending) = inner.back.take() {
            inner.front = Some(Arc::clone(&pending));
            return Some(AcquiredFrame {
                frame: pending,
                is_new: true,
            });
        }
        inner.front.as_ref().map(|frame| AcquiredFrame {
            frame: Arc::clone(frame),
            is_new: false,
        })
    }

    /// Whether a frame is waiting to be acquired
    pub fn has_pending(&self) -> bool {
        self.lock().back.is_some()
    }

    /// Frames currently retained (at most two)
    pub fn held_count(&self) -> usize {
        let inner = self.lock();
        inner.front.is_some() as usize + inner.back.is_some() as usize
    }

    /// Pending frames overwritten before the renderer saw them
    pub fn replaced_count(&self) -> u64 {
        self.lock().replaced
    }

    pub fn published_count(&self) -> u64 {
        self.lock().published
    }

    /// Drop both buffers
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.front = None;
        inner.back = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u64) -> VideoFrame {
        VideoFrame::new(vec![0; 4], 1, 1, index as f64 / 30.0, index)
    }

    #[test]
    fn test_empty_slot() {
        let slot = FrameSlot::new();
        assert!(slot.acquire().is_none());
        assert_eq!(slot.held_count(), 0);
    }

    #[test]
    fn test_acquire_promotes_pending() {
        let slot = FrameSlot::new();
        slot.publish(frame(0));
        assert!(slot.has_pending());

        let acquired = slot.acquire().unwrap();
        assert!(acquired.is_new);
        assert_eq!(acquired.frame.frame_index, 0);
        assert!(!slot.has_pending());

        // Re-acquiring returns the same front without re-upload
        let again = slot.acquire().unwrap();
        assert!(!again.is_new);
        assert!(Arc::ptr_eq(&acquired.frame, &again.frame));
    }

    #[test]
    fn test_latest_frame_wins() {
        let slot = FrameSlot::new();
        slot.publish(frame(0));
        slot.acquire();
        for i in 1..=5 {
            slot.publish(frame(i));
            assert!(slot.held_count() <= 2);
        }
        assert_eq!(slot.replaced_count(), 4);
        assert_eq!(slot.published_count(), 6);
        assert_eq!(slot.acquire().unwrap().frame.frame_index, 5);
        assert_eq!(slot.held_count(), 1);
    }

    #[test]
    fn test_clear() {
        let slot = FrameSlot::new();
        slot.publish(frame(0));
        slot.acquire();
        slot.publish(frame(1));
        slot.clear();
        assert_eq!(slot.held_count(), 0);
        assert!(slot.acquire().is_none());
    }
}
