use std::collections::HashMap;

use ash::vk;

use crate::{buffer::BufferKey, image::ImageKey};

use super::handle::ResourceKey;

/// Stage-tagged use of a resource by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    pub stage: vk::PipelineStageFlags2,
    pub written: bool,
}

impl ResourceUsage {
    pub fn read(stage: vk::PipelineStageFlags2) -> Self {
        Self {
            stage,
            written: false,
        }
    }

    pub fn write(stage: vk::PipelineStageFlags2) -> Self {
        Self {
            stage,
            written: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: ImageKey,
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: BufferKey,
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    Image(ImageBarrier),
    Buffer(BufferBarrier),
}

/// Stages whose synchronization the attachment load/store mechanism performs.
pub fn is_attachment_stage(stage: vk::PipelineStageFlags2) -> bool {
    let attachment = vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    !stage.is_empty() && attachment.contains(stage)
}

/// A barrier between two stages of the same resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition {
    pub resource: ResourceKey,
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
}

/// Tracks, per resource, the stage of a write that no barrier has covered yet.
#[derive(Debug, Default)]
pub struct BarrierTracker {
    pending: HashMap<ResourceKey, vk::PipelineStageFlags2>,
}

impl BarrierTracker {
    pub fn seed(&mut self, resource: ResourceKey, stage: vk::PipelineStageFlags2) {
        if !stage.is_empty() {
            self.pending.insert(resource, stage);
        }
    }

    /// Computes the barriers a pass needs before it runs and records its
    /// writes. `resolve` maps a resource to the one owning its memory.
    pub fn synthesize<'a>(
        &mut self,
        usages: impl IntoIterator<Item = &'a (ResourceKey, ResourceUsage)>,
        resolve: impl Fn(ResourceKey) -> ResourceKey,
    ) -> Vec<StageTransition> {
        let mut transitions = Vec::new();
        for &(key, usage) in usages {
            if usage.stage.is_empty() {
                continue;
            }
            let resource = resolve(key);

            if is_attachment_stage(usage.stage) {
                self.pending.remove(&resource);
            } else if let Some(src_stage) = self.pending.remove(&resource) {
                transitions.push(StageTransition {
                    resource,
                    src_stage,
                    dst_stage: usage.stage,
                });
            }

            if usage.written {
                self.pending.insert(resource, usage.stage);
            }
        }
        transitions
    }

    pub fn pending_stage(&self, resource: ResourceKey) -> Option<vk::PipelineStageFlags2> {
        self.pending.get(&resource).copied()
    }
}

/// Access masks for a stage, used to turn stage transitions into memory
/// barriers.
pub fn stage_access(stage: vk::PipelineStageFlags2, write: bool) -> vk::AccessFlags2 {
    type S = vk::PipelineStageFlags2;
    type A = vk::AccessFlags2;

    let mut access = A::NONE;
    if stage.intersects(
        S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER | S::ALL_GRAPHICS | S::ALL_COMMANDS,
    ) {
        access |= if write {
            A::SHADER_STORAGE_WRITE
        } else {
            A::SHADER_SAMPLED_READ | A::SHADER_STORAGE_READ | A::UNIFORM_READ
        };
    }
    if stage.contains(S::COLOR_ATTACHMENT_OUTPUT) {
        access |= if write {
            A::COLOR_ATTACHMENT_WRITE
        } else {
            A::COLOR_ATTACHMENT_READ
        };
    }
    if stage.intersects(S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS) {
        access |= if write {
            A::DEPTH_STENCIL_ATTACHMENT_WRITE
        } else {
            A::DEPTH_STENCIL_ATTACHMENT_READ
        };
    }
    if stage.intersects(S::TRANSFER | S::COPY | S::CLEAR) {
        access |= if write {
            A::TRANSFER_WRITE
        } else {
            A::TRANSFER_READ
        };
    }
    if stage.contains(S::HOST) {
        access |= if write { A::HOST_WRITE } else { A::HOST_READ };
    }
    if !write && stage.contains(S::VERTEX_ATTRIBUTE_INPUT) {
        access |= A::VERTEX_ATTRIBUTE_READ;
    }
    if !write && stage.contains(S::INDEX_INPUT) {
        access |= A::INDEX_READ;
    }
    if !write && stage.contains(S::DRAW_INDIRECT) {
        access |= A::INDIRECT_COMMAND_READ;
    }
    access
}

#[cfg(test)]
mod tests {
    use super::*;

    type S = vk::PipelineStageFlags2;

    const IMAGE: ResourceKey = ResourceKey::Image(0);
    const BUFFER: ResourceKey = ResourceKey::Buffer(0);

    fn synthesize(
        tracker: &mut BarrierTracker,
        usages: &[(ResourceKey, ResourceUsage)],
    ) -> Vec<StageTransition> {
        tracker.synthesize(usages, |k| k)
    }

    #[test]
    fn test_write_then_read_needs_one_barrier() {
        let mut tracker = BarrierTracker::default();
        let first = synthesize(&mut tracker, &[(IMAGE, ResourceUsage::write(S::COMPUTE_SHADER))]);
        assert!(first.is_empty());

        let second = synthesize(&mut tracker, &[(IMAGE, ResourceUsage::read(S::FRAGMENT_SHADER))]);
        assert_eq!(
            second,
            vec![StageTransition {
                resource: IMAGE,
                src_stage: S::COMPUTE_SHADER,
                dst_stage: S::FRAGMENT_SHADER,
            }]
        );

        let third = synthesize(&mut tracker, &[(IMAGE, ResourceUsage::read(S::FRAGMENT_SHADER))]);
        assert!(third.is_empty());
    }

    #[test]
    fn test_attachment_write_is_pending_but_not_barriered() {
        let mut tracker = BarrierTracker::default();
        tracker.seed(IMAGE, S::COMPUTE_SHADER);
        let into_attachment = synthesize(
            &mut tracker,
            &[(IMAGE, ResourceUsage::write(S::COLOR_ATTACHMENT_OUTPUT))],
        );
        assert!(into_attachment.is_empty());
        assert_eq!(
            tracker.pending_stage(IMAGE),
            Some(S::COLOR_ATTACHMENT_OUTPUT)
        );
    }

    #[test]
    fn test_write_after_write_is_barriered() {
        let mut tracker = BarrierTracker::default();
        synthesize(&mut tracker, &[(BUFFER, ResourceUsage::write(S::HOST))]);
        let second = synthesize(&mut tracker, &[(BUFFER, ResourceUsage::write(S::COMPUTE_SHADER))]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].src_stage, S::HOST);
        assert_eq!(tracker.pending_stage(BUFFER), Some(S::COMPUTE_SHADER));
    }

    #[test]
    fn test_stageless_usages_are_skipped() {
        let mut tracker = BarrierTracker::default();
        tracker.seed(IMAGE, S::COMPUTE_SHADER);
        let out = synthesize(&mut tracker, &[(IMAGE, ResourceUsage::write(S::NONE))]);
        assert!(out.is_empty());
        assert_eq!(tracker.pending_stage(IMAGE), Some(S::COMPUTE_SHADER));
    }

    #[test]
    fn test_aliases_share_pending_state() {
        let mut tracker = BarrierTracker::default();
        let alias = ResourceKey::Image(1);
        let resolve = |k: ResourceKey| if k == alias { IMAGE } else { k };
        tracker.synthesize(&[(IMAGE, ResourceUsage::write(S::COMPUTE_SHADER))], resolve);
        let out = tracker.synthesize(&[(alias, ResourceUsage::read(S::FRAGMENT_SHADER))], resolve);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].resource, IMAGE);
    }

    #[test]
    fn test_stage_access() {
        assert_eq!(
            stage_access(S::COLOR_ATTACHMENT_OUTPUT, true),
            vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(stage_access(S::HOST, true), vk::AccessFlags2::HOST_WRITE);
        assert!(stage_access(S::FRAGMENT_SHADER, false).contains(vk::AccessFlags2::SHADER_SAMPLED_READ));
    }
}
