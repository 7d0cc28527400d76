// THEORY:
// The `FrameHistory` is the rolling memory of the pipeline: a fixed-capacity, ordered
// window of the most recent `PoseFrame`s. It is the only mutable state the feature
// extractor reads, and it only ever reads it. Ownership stays with whoever drives
// the ticks; there is no locking because there is never a second reader.

use crate::core_modules::pose_frame::pose_frame::PoseFrame;
use std::collections::VecDeque;

pub struct FrameHistory {
    frames: VecDeque<PoseFrame>,
    capacity: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a frame, evicting the oldest once the capacity is exceeded.
    pub fn push(&mut self, frame: PoseFrame) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    /// Frames from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PoseFrame> + ExactSizeIterator {
        self.frames.iter()
    }

    pub fn latest(&self) -> Option<&PoseFrame> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl FromIterator<PoseFrame> for FrameHistory {
    /// Builds a history whose capacity is exactly the number of supplied frames.
    fn from_iter<I: IntoIterator<Item = PoseFrame>>(iter: I) -> Self {
        let frames: VecDeque<PoseFrame> = iter.into_iter().collect();
        let capacity = frames.len().max(1);
        Self { frames, capacity }
    }
}
