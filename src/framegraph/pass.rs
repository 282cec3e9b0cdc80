use std::ops::{Deref, DerefMut};

use smallvec::SmallVec;

use crate::device::CommandRecorder;

use super::{
    barrier::ResourceUsage,
    descriptor::{BoundDescriptor, DescriptorSets},
    error::GraphError,
    frame_resources::FrameResources,
    framebuffer::{Attachment, Framebuffer},
    handle::{BufferId, ResourceKey},
    resource::PassIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Graphics,
    Compute,
}

pub type GraphicsCallback =
    Box<dyn FnOnce(&mut RenderPassRecorder<'_>, &PassContext<'_>) -> anyhow::Result<()>>;

pub type ComputeCallback =
    Box<dyn FnOnce(&mut dyn CommandRecorder, &PassContext<'_>) -> anyhow::Result<()>>;

/// Work recorded by a pass once its resources are ready.
pub enum PassCallback {
    Graphics(GraphicsCallback),
    Compute(ComputeCallback),
}

impl PassCallback {
    pub fn kind(&self) -> PassKind {
        match self {
            PassCallback::Graphics(_) => PassKind::Graphics,
            PassCallback::Compute(_) => PassKind::Compute,
        }
    }
}

/// Recorder handed to graphics callbacks. Dereferences to the frame's
/// [`CommandRecorder`]; when the pass declared attachments, rendering to its
/// framebuffer has already begun.
pub struct RenderPassRecorder<'a> {
    recorder: &'a mut dyn CommandRecorder,
    framebuffer: Option<&'a Framebuffer>,
}

impl<'a> RenderPassRecorder<'a> {
    pub(crate) fn new(
        recorder: &'a mut dyn CommandRecorder,
        framebuffer: Option<&'a Framebuffer>,
    ) -> Self {
        Self {
            recorder,
            framebuffer,
        }
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer
    }
}

impl<'a> Deref for RenderPassRecorder<'a> {
    type Target = dyn CommandRecorder + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.recorder
    }
}

impl DerefMut for RenderPassRecorder<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.recorder
    }
}

/// What a pass callback can see of the frame.
pub struct PassContext<'a> {
    pub name: &'a str,
    pub index: PassIndex,
    pub resources: &'a FrameResources,
    /// Descriptor sets in declaration order, resolved to backing resources.
    pub descriptor_sets: &'a [Vec<BoundDescriptor>],
}

pub struct FrameGraphPass {
    pub(crate) name: String,
    pub(crate) index: PassIndex,
    pub(crate) kind: PassKind,
    pub(crate) usages: SmallVec<[(ResourceKey, ResourceUsage); 8]>,
    pub(crate) depth: Option<Attachment>,
    pub(crate) colors: SmallVec<[Attachment; 4]>,
    pub(crate) descriptor_sets: DescriptorSets,
    /// Buffers written by the CPU before the pass runs.
    pub(crate) mapped: SmallVec<[BufferId; 2]>,
    /// Bytes copied into a mapped buffer when the pass is reached.
    pub(crate) map_data: Vec<(BufferId, Vec<u8>)>,
    pub(crate) callback: Option<PassCallback>,
}

impl FrameGraphPass {
    pub(crate) fn new(name: impl Into<String>, index: PassIndex, kind: PassKind) -> Self {
        Self {
            name: name.into(),
            index,
            kind,
            usages: SmallVec::new(),
            depth: None,
            colors: SmallVec::new(),
            descriptor_sets: DescriptorSets::default(),
            mapped: SmallVec::new(),
            map_data: Vec::new(),
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> PassIndex {
        self.index
    }

    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn usage(&self, resource: ResourceKey) -> Option<ResourceUsage> {
        self.usages
            .iter()
            .find(|(key, _)| *key == resource)
            .map(|(_, usage)| *usage)
    }

    /// Records that the pass touches `resource`. A resource has one usage
    /// per pass, otherwise the barrier in front of the pass is ambiguous.
    pub(crate) fn register_usage(
        &mut self,
        resource: ResourceKey,
        usage: ResourceUsage,
    ) -> Result<(), GraphError> {
        if self.usage(resource).is_some() {
            return Err(GraphError::DuplicateUsage {
                resource,
                pass: self.name.clone(),
            });
        }
        self.usages.push((resource, usage));
        Ok(())
    }

    pub(crate) fn set_callback(&mut self, callback: PassCallback) -> Result<(), GraphError> {
        if callback.kind() != self.kind {
            return Err(GraphError::CallbackKindMismatch {
                pass: self.name.clone(),
            });
        }
        self.callback = Some(callback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::*;

    #[test]
    fn test_second_usage_is_rejected() {
        let mut pass = FrameGraphPass::new("lighting", 0, PassKind::Graphics);
        let image = ResourceKey::Image(2);
        let stage = vk::PipelineStageFlags2::FRAGMENT_SHADER;

        pass.register_usage(image, ResourceUsage::read(stage)).unwrap();
        assert_eq!(
            pass.register_usage(image, ResourceUsage::write(stage)),
            Err(GraphError::DuplicateUsage {
                resource: image,
                pass: "lighting".to_string()
            })
        );
        assert_eq!(pass.usage(image), Some(ResourceUsage::read(stage)));
    }

    #[test]
    fn test_callback_kind_must_match() {
        let mut pass = FrameGraphPass::new("cull", 1, PassKind::Compute);
        let graphics = PassCallback::Graphics(Box::new(|_, _| Ok(())));
        assert!(pass.set_callback(graphics).is_err());

        let compute = PassCallback::Compute(Box::new(|_, _| Ok(())));
        assert!(pass.set_callback(compute).is_ok());
        assert!(pass.callback.is_some());
    }
}
