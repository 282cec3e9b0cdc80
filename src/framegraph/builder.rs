use ash::vk;

use crate::{buffer::MemoryType, device::CommandRecorder, image::ImageKind};

use super::{
    barrier::ResourceUsage,
    descriptor::{Descriptor, ExternalDescriptor, SamplerType},
    error::GraphError,
    framebuffer::{Attachment, LoadOp},
    graph::{FrameGraph, PendingOp},
    handle::{
        BufferId, ImageId, MutableBufferId, MutableImageId, MutableResource, MutableVolumeId,
        PersistentId, Resource, ResourceKey, sealed::FromIndex,
    },
    pass::{PassCallback, PassContext, PassKind, RenderPassRecorder},
    resource::{BufferCreateInfo, ImageCreateInfo, PassIndex},
};

/// Where and how a resource is bound. Stage and sampler fall back to the
/// builder's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Binding {
    pub set: i32,
    pub stage: Option<vk::PipelineStageFlags2>,
    pub sampler: Option<SamplerType>,
}

impl Binding {
    pub fn in_set(set: i32) -> Self {
        Self {
            set,
            ..Self::default()
        }
    }

    pub fn stage(mut self, stage: vk::PipelineStageFlags2) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = Some(sampler);
        self
    }
}

/// Declares what one pass reads and writes.
///
/// Every resource may be used once per pass. Declarations made here live in
/// the graph and may be used by any later pass.
pub struct PassBuilder<'g> {
    graph: &'g mut FrameGraph,
    pass: PassIndex,
    kind: PassKind,
    default_stage: vk::PipelineStageFlags2,
    default_sampler: SamplerType,
}

impl<'g> PassBuilder<'g> {
    pub(crate) fn new(graph: &'g mut FrameGraph, pass: PassIndex, kind: PassKind) -> Self {
        let default_stage = match kind {
            PassKind::Graphics => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            PassKind::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
        };
        Self {
            graph,
            pass,
            kind,
            default_stage,
            default_sampler: SamplerType::default(),
        }
    }

    pub fn pass_index(&self) -> PassIndex {
        self.pass
    }

    pub fn graph(&self) -> &FrameGraph {
        &*self.graph
    }

    pub fn set_default_stage(&mut self, stage: vk::PipelineStageFlags2) {
        self.default_stage = stage;
    }

    pub fn set_default_sampler(&mut self, sampler: SamplerType) {
        self.default_sampler = sampler;
    }

    pub fn declare_image(
        &mut self,
        format: vk::Format,
        size: vk::Extent2D,
    ) -> anyhow::Result<MutableImageId> {
        self.declare_image_with_mips(format, size, 1)
    }

    pub fn declare_image_with_mips(
        &mut self,
        format: vk::Format,
        size: vk::Extent2D,
        mips: u32,
    ) -> anyhow::Result<MutableImageId> {
        if size.width == 0 || size.height == 0 || mips == 0 {
            return Err(GraphError::ZeroSize { kind: "image" }.into());
        }
        let extent = vk::Extent3D {
            width: size.width,
            height: size.height,
            depth: 1,
        };
        let info = ImageCreateInfo::new(ImageKind::Image2D, format, extent, mips);
        Ok(MutableImageId::new(self.graph.push_image_info(info)))
    }

    pub fn declare_volume(
        &mut self,
        format: vk::Format,
        size: vk::Extent3D,
    ) -> anyhow::Result<MutableVolumeId> {
        if size.width == 0 || size.height == 0 || size.depth == 0 {
            return Err(GraphError::ZeroSize { kind: "volume" }.into());
        }
        let info = ImageCreateInfo::new(ImageKind::Volume, format, size, 1);
        Ok(MutableVolumeId::new(self.graph.push_image_info(info)))
    }

    pub fn declare_buffer(&mut self, byte_size: u64) -> anyhow::Result<MutableBufferId> {
        if byte_size == 0 {
            return Err(GraphError::ZeroSize { kind: "buffer" }.into());
        }
        let info = BufferCreateInfo::new(byte_size);
        Ok(MutableBufferId::new(self.graph.push_buffer_info(info)))
    }

    /// Declares a buffer holding `count` elements of `T`.
    pub fn declare_buffer_for<T: bytemuck::Pod>(
        &mut self,
        count: usize,
    ) -> anyhow::Result<MutableBufferId> {
        let element_size = std::mem::size_of::<T>();
        let byte_size = element_size
            .checked_mul(count)
            .ok_or(GraphError::BufferSizeOverflow {
                count,
                element_size,
            })?;
        self.declare_buffer(byte_size as u64)
    }

    /// Declares a resource shaped like `src` holding a copy of it, taken
    /// before this pass runs. The copy is skipped when the two can share
    /// memory instead.
    pub fn declare_copy<R: Resource>(&mut self, src: R) -> anyhow::Result<R::Mutable> {
        let src_key = src.key();
        let dst_index = match src_key {
            ResourceKey::Buffer(_) => {
                let shape = self.graph.buffer_info(src_key)?;
                let mut info = BufferCreateInfo::new(shape.byte_size);
                info.memory = shape.memory;
                self.graph.push_buffer_info(info)
            }
            _ => {
                let shape = self.graph.image_info(src_key)?;
                let info = ImageCreateInfo::new(shape.kind, shape.format, shape.extent, shape.mips);
                self.graph.push_image_info(info)
            }
        };
        let dst = <R::Mutable as FromIndex>::from_index(dst_index);
        let dst_key: ResourceKey = dst.into();

        self.graph.register_pre_pass(self.pass, src_key, false)?;
        self.graph.register_pre_pass(self.pass, dst_key, true)?;
        if src_key.is_buffer() {
            self.graph
                .add_buffer_usage(src_key, vk::BufferUsageFlags::TRANSFER_SRC)?;
            self.graph
                .add_buffer_usage(dst_key, vk::BufferUsageFlags::TRANSFER_DST)?;
        } else {
            self.graph
                .add_image_usage(src_key, vk::ImageUsageFlags::TRANSFER_SRC)?;
            self.graph
                .add_image_usage(dst_key, vk::ImageUsageFlags::TRANSFER_DST)?;
        }
        self.graph.push_operation(PendingOp::Copy {
            pass: self.pass,
            src: src_key,
            dst: dst_key,
        });
        Ok(dst)
    }

    /// Clears `resource` to zero before this pass runs.
    pub fn clear_before_pass(&mut self, resource: impl MutableResource) -> anyhow::Result<()> {
        let key = resource.key();
        self.graph.register_pre_pass(self.pass, key, true)?;
        if key.is_buffer() {
            self.graph
                .add_buffer_usage(key, vk::BufferUsageFlags::TRANSFER_DST)?;
        } else {
            self.graph
                .add_image_usage(key, vk::ImageUsageFlags::TRANSFER_DST)?;
        }
        self.graph.push_operation(PendingOp::Clear {
            pass: self.pass,
            resource: key,
        });
        Ok(())
    }

    /// See [`FrameGraph::make_persistent_and_get_prev_image`].
    pub fn make_persistent_and_get_prev_image(
        &mut self,
        image: impl Into<ImageId>,
        id: PersistentId,
    ) -> anyhow::Result<Option<ImageId>> {
        self.graph.make_persistent_and_get_prev_image(image, id)
    }

    /// See [`FrameGraph::make_persistent_and_get_prev_buffer`].
    pub fn make_persistent_and_get_prev_buffer(
        &mut self,
        buffer: impl Into<BufferId>,
        id: PersistentId,
    ) -> anyhow::Result<Option<BufferId>> {
        self.graph.make_persistent_and_get_prev_buffer(buffer, id)
    }

    pub fn add_uniform_input(&mut self, resource: impl Resource) -> anyhow::Result<()> {
        self.add_uniform_input_with(resource, Binding::default())
    }

    /// Reads `resource` as a sampled image or uniform buffer.
    pub fn add_uniform_input_with(
        &mut self,
        resource: impl Resource,
        binding: Binding,
    ) -> anyhow::Result<()> {
        let key = resource.key();
        let stage = binding.stage.unwrap_or(self.default_stage);
        let descriptor = if key.is_buffer() {
            self.graph
                .add_buffer_usage(key, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
            Descriptor::UniformBuffer(key)
        } else {
            self.graph
                .add_image_usage(key, vk::ImageUsageFlags::SAMPLED)?;
            Descriptor::SampledImage {
                resource: key,
                sampler: binding.sampler.unwrap_or(self.default_sampler),
            }
        };
        self.graph
            .register_usage(self.pass, key, ResourceUsage::read(stage))?;
        self.add_descriptor_binding(binding.set, descriptor)
    }

    /// Binds `resource` when there is one, `fallback` otherwise.
    pub fn add_uniform_input_or<R: Resource>(
        &mut self,
        resource: Option<R>,
        fallback: ExternalDescriptor,
        binding: Binding,
    ) -> anyhow::Result<()> {
        match resource {
            Some(resource) => self.add_uniform_input_with(resource, binding),
            None => self.add_external_input(fallback, binding.set),
        }
    }

    pub fn add_storage_input(&mut self, resource: impl Resource) -> anyhow::Result<()> {
        self.add_storage_input_with(resource, Binding::default())
    }

    pub fn add_storage_input_with(
        &mut self,
        resource: impl Resource,
        binding: Binding,
    ) -> anyhow::Result<()> {
        self.add_storage(resource.key(), binding, false)
    }

    pub fn add_storage_output(&mut self, resource: impl MutableResource) -> anyhow::Result<()> {
        self.add_storage_output_with(resource, Binding::default())
    }

    pub fn add_storage_output_with(
        &mut self,
        resource: impl MutableResource,
        binding: Binding,
    ) -> anyhow::Result<()> {
        self.add_storage(resource.key(), binding, true)
    }

    fn add_storage(&mut self, key: ResourceKey, binding: Binding, written: bool) -> anyhow::Result<()> {
        let stage = binding.stage.unwrap_or(self.default_stage);
        let descriptor = if key.is_buffer() {
            self.graph
                .add_buffer_usage(key, vk::BufferUsageFlags::STORAGE_BUFFER)?;
            Descriptor::StorageBuffer(key)
        } else {
            self.graph
                .add_image_usage(key, vk::ImageUsageFlags::STORAGE)?;
            Descriptor::StorageImage(key)
        };
        let usage = ResourceUsage { stage, written };
        self.graph.register_usage(self.pass, key, usage)?;
        self.add_descriptor_binding(binding.set, descriptor)
    }

    pub fn add_color_output(&mut self, image: MutableImageId) -> anyhow::Result<()> {
        self.add_color_output_with(image, LoadOp::default())
    }

    pub fn add_color_output_with(
        &mut self,
        image: MutableImageId,
        load_op: LoadOp,
    ) -> anyhow::Result<()> {
        let key = ResourceKey::from(image);
        self.check_attachment(key, load_op)?;
        self.graph
            .add_image_usage(key, vk::ImageUsageFlags::COLOR_ATTACHMENT)?;
        self.graph.register_usage(
            self.pass,
            key,
            ResourceUsage::write(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT),
        )?;
        self.graph.pass_mut(self.pass).colors.push(Attachment {
            image: image.into(),
            load_op,
        });
        Ok(())
    }

    pub fn add_depth_output(&mut self, image: MutableImageId) -> anyhow::Result<()> {
        self.add_depth_output_with(image, LoadOp::default())
    }

    pub fn add_depth_output_with(
        &mut self,
        image: MutableImageId,
        load_op: LoadOp,
    ) -> anyhow::Result<()> {
        let key = ResourceKey::from(image);
        if self.graph.pass(self.pass).depth.is_some() {
            return Err(GraphError::DuplicateDepthAttachment {
                pass: self.graph.pass(self.pass).name.clone(),
            }
            .into());
        }
        self.check_attachment(key, load_op)?;
        self.graph
            .add_image_usage(key, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)?;
        self.graph.register_usage(
            self.pass,
            key,
            ResourceUsage::write(
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            ),
        )?;
        self.graph.pass_mut(self.pass).depth = Some(Attachment {
            image: image.into(),
            load_op,
        });
        Ok(())
    }

    fn check_attachment(&self, key: ResourceKey, load_op: LoadOp) -> Result<(), GraphError> {
        let pass = self.graph.pass(self.pass);
        if self.kind == PassKind::Compute {
            return Err(GraphError::AttachmentOnComputePass {
                pass: pass.name.clone(),
            });
        }

        let info = self.graph.image_info(key)?;
        let existing = pass.depth.iter().chain(pass.colors.iter()).next();
        if let Some(existing) = existing {
            let extent = self.graph.image_info(existing.image.into())?.size_2d();
            if extent != info.size_2d() {
                return Err(GraphError::AttachmentSizeMismatch {
                    resource: key,
                    pass: pass.name.clone(),
                });
            }
        }

        if load_op != LoadOp::Load {
            if let Some(written_by) = info.base.last_write.filter(|w| *w < self.pass) {
                return Err(GraphError::AttachmentOverwrite {
                    resource: key,
                    pass: pass.name.clone(),
                    written_by,
                });
            }
        }
        Ok(())
    }

    pub fn add_attrib_input(&mut self, buffer: impl Into<BufferId>) -> anyhow::Result<()> {
        self.add_buffer_input(
            buffer.into(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
        )
    }

    pub fn add_index_input(&mut self, buffer: impl Into<BufferId>) -> anyhow::Result<()> {
        self.add_buffer_input(
            buffer.into(),
            vk::BufferUsageFlags::INDEX_BUFFER,
            vk::PipelineStageFlags2::INDEX_INPUT,
        )
    }

    pub fn add_indirect_input(&mut self, buffer: impl Into<BufferId>) -> anyhow::Result<()> {
        self.add_buffer_input(
            buffer.into(),
            vk::BufferUsageFlags::INDIRECT_BUFFER,
            vk::PipelineStageFlags2::DRAW_INDIRECT,
        )
    }

    fn add_buffer_input(
        &mut self,
        buffer: BufferId,
        usage: vk::BufferUsageFlags,
        stage: vk::PipelineStageFlags2,
    ) -> anyhow::Result<()> {
        let key = ResourceKey::from(buffer);
        self.graph.add_buffer_usage(key, usage)?;
        self.graph
            .register_usage(self.pass, key, ResourceUsage::read(stage))?;
        Ok(())
    }

    /// Reads `resource` from a transfer command recorded by the callback.
    pub fn add_copy_src(&mut self, resource: impl Resource) -> anyhow::Result<()> {
        let key = resource.key();
        if key.is_buffer() {
            self.graph
                .add_buffer_usage(key, vk::BufferUsageFlags::TRANSFER_SRC)?;
        } else {
            self.graph
                .add_image_usage(key, vk::ImageUsageFlags::TRANSFER_SRC)?;
        }
        self.graph.register_usage(
            self.pass,
            key,
            ResourceUsage::read(vk::PipelineStageFlags2::TRANSFER),
        )?;
        Ok(())
    }

    /// Adds usage flags to an image without registering a use.
    pub fn add_input_usage(
        &mut self,
        image: impl Into<ImageId>,
        usage: vk::ImageUsageFlags,
    ) -> anyhow::Result<()> {
        let image: ImageId = image.into();
        self.graph.add_image_usage(image.into(), usage)?;
        Ok(())
    }

    /// Binds raw bytes, such as push-constant sized parameters, in `set`.
    pub fn add_inline_input<T: bytemuck::Pod>(&mut self, data: &[T], set: i32) -> anyhow::Result<()> {
        let bytes = bytemuck::cast_slice::<T, u8>(data).to_vec();
        self.add_descriptor_binding(set, Descriptor::Inline(bytes))
    }

    pub fn add_external_input(
        &mut self,
        descriptor: ExternalDescriptor,
        set: i32,
    ) -> anyhow::Result<()> {
        self.add_descriptor_binding(set, Descriptor::External(descriptor))
    }

    /// Appends `descriptor` to set `set`. Negative sets count from the end.
    pub fn add_descriptor_binding(&mut self, set: i32, descriptor: Descriptor) -> anyhow::Result<()> {
        let pass = self.graph.pass_mut(self.pass);
        pass.descriptor_sets.add(&pass.name, set, descriptor)?;
        Ok(())
    }

    pub fn next_descriptor_set_index(&self) -> i32 {
        self.graph.pass(self.pass).descriptor_sets.next_index()
    }

    /// Makes `buffer` CPU writable. Writes go through
    /// [`super::FrameResources::map_buffer`] from any callback of the frame.
    pub fn map_buffer(&mut self, buffer: MutableBufferId) -> anyhow::Result<()> {
        let key = ResourceKey::from(buffer);
        let pass = self.graph.pass(self.pass);
        if pass.mapped.iter().any(|mapped| ResourceKey::from(*mapped) == key) {
            return Err(GraphError::DuplicateUsage {
                resource: key,
                pass: pass.name.clone(),
            }
            .into());
        }
        self.graph.buffer_info_mut(key)?.memory = MemoryType::Staging;
        self.graph.register_pre_pass(self.pass, key, true)?;
        self.graph.pass_mut(self.pass).mapped.push(buffer.into());
        Ok(())
    }

    /// Maps `buffer` and fills it with `data` when the pass is reached.
    pub fn map_buffer_with<T: bytemuck::Pod>(
        &mut self,
        buffer: MutableBufferId,
        data: &[T],
    ) -> anyhow::Result<()> {
        let key = ResourceKey::from(buffer);
        let bytes = bytemuck::cast_slice::<T, u8>(data).to_vec();
        let size = self.graph.buffer_info(key)?.byte_size;
        if bytes.len() as u64 > size {
            return Err(GraphError::MappedRangeOutOfBounds {
                resource: key,
                offset: 0,
                len: bytes.len() as u64,
                size,
            }
            .into());
        }
        self.map_buffer(buffer)?;
        self.graph
            .pass_mut(self.pass)
            .map_data
            .push((buffer.into(), bytes));
        Ok(())
    }

    pub fn set_render_func(
        &mut self,
        func: impl FnOnce(&mut RenderPassRecorder<'_>, &PassContext<'_>) -> anyhow::Result<()>
        + 'static,
    ) -> anyhow::Result<()> {
        self.graph
            .pass_mut(self.pass)
            .set_callback(PassCallback::Graphics(Box::new(func)))?;
        Ok(())
    }

    pub fn set_compute_func(
        &mut self,
        func: impl FnOnce(&mut dyn CommandRecorder, &PassContext<'_>) -> anyhow::Result<()> + 'static,
    ) -> anyhow::Result<()> {
        self.graph
            .pass_mut(self.pass)
            .set_callback(PassCallback::Compute(Box::new(func)))?;
        Ok(())
    }
}
