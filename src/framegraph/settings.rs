/// Per-graph policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGraphSettings {
    /// Elide copies whose source is dead by the time the copy would run.
    pub aliasing: bool,
    /// Let buffer requests reuse idle buffers up to twice the requested size.
    pub inexact_buffers: bool,
}

impl Default for FrameGraphSettings {
    fn default() -> Self {
        Self {
            aliasing: true,
            inexact_buffers: false,
        }
    }
}

impl FrameGraphSettings {
    pub fn aliasing(mut self, aliasing: bool) -> Self {
        self.aliasing = aliasing;
        self
    }

    pub fn inexact_buffers(mut self, inexact_buffers: bool) -> Self {
        self.inexact_buffers = inexact_buffers;
        self
    }
}

pub const DEFAULT_RETENTION_FRAMES: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Frames an idle resource survives before it is destroyed.
    pub retention_frames: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            retention_frames: DEFAULT_RETENTION_FRAMES,
        }
    }
}

impl PoolSettings {
    pub fn retention_frames(mut self, frames: u64) -> Self {
        self.retention_frames = frames.max(1);
        self
    }
}
