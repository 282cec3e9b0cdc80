use std::sync::Arc;

use anyhow::Context;
use ash::vk;
use smallvec::SmallVec;

use crate::{device::CommandRecorder, image::ImageKind};

use super::{
    alias::{alias_copies, alias_root},
    barrier::{Barrier, BarrierTracker, ResourceUsage, StageTransition},
    builder::PassBuilder,
    descriptor::BoundDescriptor,
    error::GraphError,
    frame_resources::FrameResources,
    framebuffer::{Attachment, Framebuffer, FramebufferAttachment},
    handle::{BufferId, ImageId, PersistentId, Resource, ResourceKey, VolumeId},
    pass::{FrameGraphPass, PassCallback, PassContext, PassKind, RenderPassRecorder},
    pool::{ResourcePool, TransientBuffer, TransientImage},
    region::{RegionCursor, RegionId, Regions},
    resource::{BufferCreateInfo, ImageCreateInfo, PassIndex, ResourceCreateInfo},
    settings::FrameGraphSettings,
};

/// Work scheduled in front of a pass, before its barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingOp {
    Copy {
        pass: PassIndex,
        src: ResourceKey,
        dst: ResourceKey,
    },
    Clear {
        pass: PassIndex,
        resource: ResourceKey,
    },
}

impl PendingOp {
    fn pass(&self) -> PassIndex {
        match self {
            PendingOp::Copy { pass, .. } | PendingOp::Clear { pass, .. } => *pass,
        }
    }
}

/// One frame's worth of passes and the resources they touch.
///
/// Passes run in the order they were added. Everything declared here lives
/// for the frame only, unless made persistent, and goes back to the pool
/// when [`FrameGraph::render`] returns.
pub struct FrameGraph {
    pool: Arc<ResourcePool>,
    settings: FrameGraphSettings,
    passes: Vec<FrameGraphPass>,
    images: Vec<ImageCreateInfo>,
    volumes: Vec<ImageCreateInfo>,
    buffers: Vec<BufferCreateInfo>,
    operations: Vec<PendingOp>,
    carried_images: Vec<(u32, Arc<TransientImage>)>,
    carried_buffers: Vec<(u32, Arc<TransientBuffer>)>,
    regions: Regions,
}

impl FrameGraph {
    pub fn new(pool: Arc<ResourcePool>) -> Self {
        Self::with_settings(pool, FrameGraphSettings::default())
    }

    pub fn with_settings(pool: Arc<ResourcePool>, settings: FrameGraphSettings) -> Self {
        Self {
            pool,
            settings,
            passes: Vec::new(),
            images: Vec::new(),
            volumes: Vec::new(),
            buffers: Vec::new(),
            operations: Vec::new(),
            carried_images: Vec::new(),
            carried_buffers: Vec::new(),
            regions: Regions::default(),
        }
    }

    pub fn settings(&self) -> FrameGraphSettings {
        self.settings
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn frame_id(&self) -> u64 {
        self.pool.frame_id()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn add_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_> {
        self.push_pass(name.into(), PassKind::Graphics)
    }

    pub fn add_compute_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_> {
        self.push_pass(name.into(), PassKind::Compute)
    }

    fn push_pass(&mut self, name: String, kind: PassKind) -> PassBuilder<'_> {
        let index = self.passes.len();
        log::trace!("adding {kind:?} pass \"{name}\" at {index}");
        self.passes.push(FrameGraphPass::new(name, index, kind));
        PassBuilder::new(self, index, kind)
    }

    /// Opens a region covering every pass added until it is closed.
    pub fn begin_region(&mut self, name: impl Into<String>) -> RegionId {
        self.regions.begin(name, self.passes.len())
    }

    pub fn end_region(&mut self, region: RegionId) -> Result<(), GraphError> {
        self.regions.end(region, self.passes.len())
    }

    /// Keeps the resource behind `resource` alive into the next frame,
    /// filed in the pool under `id`.
    pub fn make_persistent(
        &mut self,
        resource: impl Resource,
        id: PersistentId,
    ) -> Result<(), GraphError> {
        self.base_mut(resource.key())?.add_persistent_id(id);
        Ok(())
    }

    /// Makes `image` persistent under `id` and returns a handle to what was
    /// filed under `id` by the previous frame. Returns `None` on the first
    /// frame or when the previous image no longer has the same shape, in
    /// which case it is recycled.
    pub fn make_persistent_and_get_prev_image(
        &mut self,
        image: impl Into<ImageId>,
        id: PersistentId,
    ) -> anyhow::Result<Option<ImageId>> {
        let image: ImageId = image.into();
        self.make_persistent(image, id)?;
        let key = ResourceKey::from(image);
        if !self.pool.has_persistent_image(id) {
            return Ok(None);
        }

        let (previous, stage) = self.pool.persistent_image(id)?;
        let current = self.image_info(key)?.to_spec();
        if !previous.spec.same_layout(&current) {
            log::debug!(
                "{id} changed shape ({} -> {current}), dropping its history",
                previous.spec
            );
            self.pool
                .release_image(previous, &[], vk::PipelineStageFlags2::NONE);
            return Ok(None);
        }

        let spec = &previous.spec;
        let mut info = ImageCreateInfo::new(spec.kind, spec.format, spec.extent, spec.mips);
        info.usage = spec.usage;
        info.base.carried_over = true;
        info.base.carried_stage = Some(stage);
        let index = self.push_image_info(info);
        self.carried_images.push((index, previous));
        Ok(Some(ImageId::new(index)))
    }

    /// Buffer counterpart of [`Self::make_persistent_and_get_prev_image`].
    pub fn make_persistent_and_get_prev_buffer(
        &mut self,
        buffer: impl Into<BufferId>,
        id: PersistentId,
    ) -> anyhow::Result<Option<BufferId>> {
        let buffer: BufferId = buffer.into();
        self.make_persistent(buffer, id)?;
        if !self.pool.has_persistent_buffer(id) {
            return Ok(None);
        }

        let (previous, stage) = self.pool.persistent_buffer(id)?;
        let size = self.buffer_info(buffer.into())?.byte_size;
        if previous.size != size {
            log::debug!(
                "{id} changed size ({} -> {size} bytes), dropping its history",
                previous.size
            );
            self.pool
                .release_buffer(previous, &[], vk::PipelineStageFlags2::NONE);
            return Ok(None);
        }

        let mut info = BufferCreateInfo::new(size);
        info.usage = previous.spec.usage;
        info.memory = previous.spec.memory;
        info.base.carried_over = true;
        info.base.carried_stage = Some(stage);
        let index = self.push_buffer_info(info);
        self.carried_buffers.push((index, previous));
        Ok(Some(BufferId::new(index)))
    }

    pub fn image_size(&self, image: impl Into<ImageId>) -> Result<vk::Extent2D, GraphError> {
        let image: ImageId = image.into();
        Ok(self.image_info(image.into())?.size_2d())
    }

    pub fn volume_size(&self, volume: impl Into<VolumeId>) -> Result<vk::Extent3D, GraphError> {
        let volume: VolumeId = volume.into();
        Ok(self.image_info(volume.into())?.extent)
    }

    pub fn image_format(&self, image: impl Into<ImageId>) -> Result<vk::Format, GraphError> {
        let image: ImageId = image.into();
        Ok(self.image_info(image.into())?.format)
    }

    pub fn buffer_size(&self, buffer: impl Into<BufferId>) -> Result<u64, GraphError> {
        let buffer: BufferId = buffer.into();
        Ok(self.buffer_info(buffer.into())?.byte_size)
    }

    pub(crate) fn push_image_info(&mut self, info: ImageCreateInfo) -> u32 {
        let infos = match info.kind {
            ImageKind::Image2D => &mut self.images,
            ImageKind::Volume => &mut self.volumes,
        };
        infos.push(info);
        (infos.len() - 1) as u32
    }

    pub(crate) fn push_buffer_info(&mut self, info: BufferCreateInfo) -> u32 {
        self.buffers.push(info);
        (self.buffers.len() - 1) as u32
    }

    pub(crate) fn image_info(&self, key: ResourceKey) -> Result<&ImageCreateInfo, GraphError> {
        match key {
            ResourceKey::Image(i) => self.images.get(i as usize),
            ResourceKey::Volume(i) => self.volumes.get(i as usize),
            ResourceKey::Buffer(_) => None,
        }
        .ok_or(GraphError::InvalidResource(key))
    }

    pub(crate) fn image_info_mut(
        &mut self,
        key: ResourceKey,
    ) -> Result<&mut ImageCreateInfo, GraphError> {
        match key {
            ResourceKey::Image(i) => self.images.get_mut(i as usize),
            ResourceKey::Volume(i) => self.volumes.get_mut(i as usize),
            ResourceKey::Buffer(_) => None,
        }
        .ok_or(GraphError::InvalidResource(key))
    }

    pub(crate) fn buffer_info(&self, key: ResourceKey) -> Result<&BufferCreateInfo, GraphError> {
        match key {
            ResourceKey::Buffer(i) => self.buffers.get(i as usize),
            _ => None,
        }
        .ok_or(GraphError::InvalidResource(key))
    }

    pub(crate) fn buffer_info_mut(
        &mut self,
        key: ResourceKey,
    ) -> Result<&mut BufferCreateInfo, GraphError> {
        match key {
            ResourceKey::Buffer(i) => self.buffers.get_mut(i as usize),
            _ => None,
        }
        .ok_or(GraphError::InvalidResource(key))
    }

    fn base_mut(&mut self, key: ResourceKey) -> Result<&mut ResourceCreateInfo, GraphError> {
        if key.is_buffer() {
            Ok(&mut self.buffer_info_mut(key)?.base)
        } else {
            Ok(&mut self.image_info_mut(key)?.base)
        }
    }

    pub(crate) fn pass(&self, pass: PassIndex) -> &FrameGraphPass {
        &self.passes[pass]
    }

    pub(crate) fn pass_mut(&mut self, pass: PassIndex) -> &mut FrameGraphPass {
        &mut self.passes[pass]
    }

    /// Registers a stage-tagged use of `resource` by `pass`.
    pub(crate) fn register_usage(
        &mut self,
        pass: PassIndex,
        resource: ResourceKey,
        usage: ResourceUsage,
    ) -> Result<(), GraphError> {
        if self.passes[pass].usage(resource).is_some() {
            return Err(GraphError::DuplicateUsage {
                resource,
                pass: self.passes[pass].name.clone(),
            });
        }
        self.base_mut(resource)?
            .register_use(resource, pass, usage.written)?;
        self.passes[pass].register_usage(resource, usage)
    }

    /// Registers a use happening in front of `pass`, outside of its usage
    /// table. Copies, clears and CPU writes synchronize on their own.
    pub(crate) fn register_pre_pass(
        &mut self,
        pass: PassIndex,
        resource: ResourceKey,
        written: bool,
    ) -> Result<(), GraphError> {
        self.base_mut(resource)?
            .register_use(resource, pass, written)
    }

    pub(crate) fn add_image_usage(
        &mut self,
        resource: ResourceKey,
        usage: vk::ImageUsageFlags,
    ) -> Result<(), GraphError> {
        self.image_info_mut(resource)?.usage |= usage;
        Ok(())
    }

    pub(crate) fn add_buffer_usage(
        &mut self,
        resource: ResourceKey,
        usage: vk::BufferUsageFlags,
    ) -> Result<(), GraphError> {
        self.buffer_info_mut(resource)?.usage |= usage;
        Ok(())
    }

    pub(crate) fn push_operation(&mut self, op: PendingOp) {
        if let PendingOp::Copy { src, dst, .. } = op {
            let copy_src = Some(src.index() as u32);
            match dst {
                ResourceKey::Buffer(i) => self.buffers[i as usize].copy_src = copy_src,
                ResourceKey::Image(i) => self.images[i as usize].copy_src = copy_src,
                ResourceKey::Volume(i) => self.volumes[i as usize].copy_src = copy_src,
            }
        }
        self.operations.push(op);
    }

    /// The resource owning the memory of `resource` once aliasing is done.
    pub fn resolve_alias(&self, resource: ResourceKey) -> ResourceKey {
        match resource {
            ResourceKey::Image(i) if (i as usize) < self.images.len() => {
                ResourceKey::Image(alias_root(&self.images, i))
            }
            ResourceKey::Buffer(i) if (i as usize) < self.buffers.len() => {
                ResourceKey::Buffer(alias_root(&self.buffers, i))
            }
            other => other,
        }
    }

    /// Carried over resources keep the usage they were created with, so this
    /// frame may not ask for more. Fails before anything is taken out of the
    /// graph, leaving the carried resources to be returned on drop.
    fn check_carried_usage(&self) -> Result<(), GraphError> {
        for (index, image) in &self.carried_images {
            let missing = self.images[*index as usize].usage & !image.spec.usage;
            if !missing.is_empty() {
                return Err(GraphError::CarriedImageUsage {
                    resource: ResourceKey::Image(*index),
                    missing,
                });
            }
        }
        for (index, buffer) in &self.carried_buffers {
            let missing = self.buffers[*index as usize].usage & !buffer.spec.usage;
            if !missing.is_empty() {
                return Err(GraphError::CarriedBufferUsage {
                    resource: ResourceKey::Buffer(*index),
                    missing,
                });
            }
        }
        Ok(())
    }

    /// Folds eligible copies into aliases and binds every declaration to a
    /// backing resource.
    fn allocate_resources(
        &mut self,
        carried_images: Vec<(u32, Arc<TransientImage>)>,
        carried_buffers: Vec<(u32, Arc<TransientBuffer>)>,
    ) -> anyhow::Result<FrameResources> {
        let _span = tracing::debug_span!("allocate_resources").entered();
        let mut resources = FrameResources::new(self.pool.clone());

        for (index, image) in carried_images {
            resources.insert_carried_over_image(ResourceKey::Image(index), image)?;
        }
        for (index, buffer) in carried_buffers {
            resources.insert_carried_over_buffer(BufferId::new(index), buffer)?;
        }

        if self.settings.aliasing {
            let elided = alias_copies(&mut self.images) + alias_copies(&mut self.buffers);
            if elided > 0 {
                log::debug!("{elided} copies elided through aliasing");
            }
        }

        let mut order: Vec<(PassIndex, ResourceKey)> = self
            .images
            .iter()
            .enumerate()
            .map(|(i, info)| (info, ResourceKey::Image(i as u32)))
            .chain(
                self.volumes
                    .iter()
                    .enumerate()
                    .map(|(i, info)| (info, ResourceKey::Volume(i as u32))),
            )
            .filter(|(info, _)| info.alias_of.is_none() && !info.base.carried_over)
            .map(|(info, key)| (info.base.first_use.unwrap_or(PassIndex::MAX), key))
            .collect();
        order.sort();

        for (_, key) in order {
            let info = self.image_info_mut(key)?;
            if !info.base.is_used() {
                log::warn!("{key} is declared but never used");
            }
            if (info.usage & !vk::ImageUsageFlags::TRANSFER_DST).is_empty() {
                log::warn!("{key} has no usage besides copies, defaulting to sampled");
                info.usage |= vk::ImageUsageFlags::SAMPLED;
            }
            let spec = info.to_spec().debug_name(key.to_string());
            resources
                .create_image(key, &spec)
                .with_context(|| format!("failed to allocate {key}"))?;
        }

        let mut order: Vec<(PassIndex, u32)> = self
            .buffers
            .iter()
            .enumerate()
            .filter(|(_, info)| info.alias_of.is_none() && !info.base.carried_over)
            .map(|(i, info)| (info.base.first_use.unwrap_or(PassIndex::MAX), i as u32))
            .collect();
        order.sort();

        let exact = !self.settings.inexact_buffers;
        for (_, index) in order {
            let key = ResourceKey::Buffer(index);
            let info = &mut self.buffers[index as usize];
            if !info.base.is_used() {
                log::warn!("{key} is declared but never used");
            } else if info.base.last_read.is_none() && !info.base.is_persistent() {
                log::warn!("{key} is written but never read");
            }
            if info.usage.is_empty() {
                log::warn!("{key} has no usage, defaulting to storage");
                info.usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
            }
            let spec = info.to_spec().debug_name(key.to_string());
            resources
                .create_buffer(BufferId::new(index), &spec, exact)
                .with_context(|| format!("failed to allocate {key}"))?;
        }

        for (i, info) in self.images.iter().enumerate() {
            if info.alias_of.is_some() {
                let root = alias_root(&self.images, i as u32);
                resources.create_alias(ResourceKey::Image(i as u32), ResourceKey::Image(root))?;
            }
        }
        for (i, info) in self.buffers.iter().enumerate() {
            if info.alias_of.is_some() {
                let root = alias_root(&self.buffers, i as u32);
                resources
                    .create_alias(ResourceKey::Buffer(i as u32), ResourceKey::Buffer(root))?;
            }
        }

        for (key, base) in self.declared() {
            for id in &base.persistent_ids {
                resources.make_persistent(key, *id)?;
            }
        }

        Ok(resources)
    }

    fn declared(&self) -> impl Iterator<Item = (ResourceKey, &ResourceCreateInfo)> {
        let images = self
            .images
            .iter()
            .enumerate()
            .map(|(i, info)| (ResourceKey::Image(i as u32), &info.base));
        let volumes = self
            .volumes
            .iter()
            .enumerate()
            .map(|(i, info)| (ResourceKey::Volume(i as u32), &info.base));
        let buffers = self
            .buffers
            .iter()
            .enumerate()
            .map(|(i, info)| (ResourceKey::Buffer(i as u32), &info.base));
        images.chain(volumes).chain(buffers)
    }

    /// Allocates every resource, then records all passes in order.
    ///
    /// Consumes the graph: once recorded, backing resources go back to the
    /// pool (persistent ones filed under their ids) and the pool moves on to
    /// the next frame.
    pub fn render(mut self, recorder: &mut dyn CommandRecorder) -> anyhow::Result<()> {
        let _span = tracing::info_span!("framegraph_render", frame = self.frame_id()).entered();

        self.check_carried_usage()?;
        let carried_images = std::mem::take(&mut self.carried_images);
        let carried_buffers = std::mem::take(&mut self.carried_buffers);
        let mut resources = self
            .allocate_resources(carried_images, carried_buffers)
            .context("framegraph failed to allocate resources")?;

        let fresh = resources.take_fresh_images();
        if !fresh.is_empty() {
            recorder.prepare_images(&fresh);
        }

        let mut tracker = BarrierTracker::default();
        for (key, base) in self.declared() {
            if let Some(stage) = base.carried_stage {
                tracker.seed(self.resolve_alias(key), stage);
            }
        }

        let mut operations = std::mem::take(&mut self.operations);
        operations.sort_by_key(PendingOp::pass);
        let mut operations = operations.into_iter().peekable();

        let passes = std::mem::take(&mut self.passes);
        let pass_count = passes.len();
        let mut regions = RegionCursor::new(std::mem::take(&mut self.regions).finish(pass_count));

        for mut pass in passes {
            regions.advance(pass.index, recorder);
            let _pass_span = tracing::info_span!("pass", name = %pass.name).entered();
            recorder.insert_label(&pass.name);

            for (buffer, data) in &pass.map_data {
                resources
                    .write_buffer(*buffer, 0, data)
                    .with_context(|| format!("pass \"{}\" failed to map {buffer:?}", pass.name))?;
            }

            while let Some(op) = operations.next_if(|op| op.pass() == pass.index) {
                execute_operation(op, &resources, recorder)?;
            }

            for buffer in &pass.mapped {
                tracker.seed(
                    self.resolve_alias(ResourceKey::from(*buffer)),
                    vk::PipelineStageFlags2::HOST,
                );
            }
            let transitions = tracker.synthesize(pass.usages.iter(), |key| self.resolve_alias(key));
            submit_barriers(&transitions, &resources, recorder)?;

            self.execute_pass(&mut pass, &resources, recorder)
                .with_context(|| format!("framegraph failed to execute pass \"{}\"", pass.name))?;
        }
        regions.advance(pass_count, recorder);
        regions.finish(recorder);

        resources.flush_mapped()?;

        for (key, base) in self.declared() {
            if base.is_persistent() {
                let stage = tracker
                    .pending_stage(self.resolve_alias(key))
                    .unwrap_or(vk::PipelineStageFlags2::NONE);
                resources.set_last_stage(key, stage)?;
            }
        }

        log::trace!("frame {} recorded {pass_count} passes", resources.frame_id());
        Ok(())
    }

    fn execute_pass(
        &self,
        pass: &mut FrameGraphPass,
        resources: &FrameResources,
        recorder: &mut dyn CommandRecorder,
    ) -> anyhow::Result<()> {
        let descriptor_sets = pass
            .descriptor_sets
            .sets()
            .iter()
            .map(|set| {
                set.iter()
                    .map(|descriptor| resources.resolve_descriptor(descriptor))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<Vec<BoundDescriptor>>, _>>()?;

        let framebuffer = self.framebuffer(pass, resources)?;

        let context = PassContext {
            name: &pass.name,
            index: pass.index,
            resources,
            descriptor_sets: &descriptor_sets,
        };

        match pass.callback.take() {
            Some(PassCallback::Graphics(callback)) => {
                if let Some(framebuffer) = &framebuffer {
                    recorder.begin_rendering(framebuffer);
                }
                let mut render_pass = RenderPassRecorder::new(&mut *recorder, framebuffer.as_ref());
                callback(&mut render_pass, &context)?;
                if framebuffer.is_some() {
                    recorder.end_rendering();
                }
            }
            Some(PassCallback::Compute(callback)) => callback(&mut *recorder, &context)?,
            None => {
                log::trace!("pass \"{}\" has no callback", pass.name);
                if let Some(framebuffer) = &framebuffer {
                    recorder.begin_rendering(framebuffer);
                    recorder.end_rendering();
                }
            }
        }
        Ok(())
    }

    fn framebuffer(
        &self,
        pass: &FrameGraphPass,
        resources: &FrameResources,
    ) -> Result<Option<Framebuffer>, GraphError> {
        let Some(first) = pass.depth.iter().chain(pass.colors.iter()).next() else {
            return Ok(None);
        };

        let attachment = |attachment: &Attachment| -> Result<FramebufferAttachment, GraphError> {
            let key = ResourceKey::from(attachment.image);
            Ok(FramebufferAttachment {
                image: resources.image_by_key(key)?.key,
                format: self.image_info(key)?.format,
                load_op: attachment.load_op,
            })
        };

        Ok(Some(Framebuffer {
            extent: self.image_info(first.image.into())?.size_2d(),
            depth: pass.depth.as_ref().map(attachment).transpose()?,
            colors: pass
                .colors
                .iter()
                .map(attachment)
                .collect::<Result<SmallVec<_>, _>>()?,
        }))
    }
}

fn execute_operation(
    op: PendingOp,
    resources: &FrameResources,
    recorder: &mut dyn CommandRecorder,
) -> anyhow::Result<()> {
    match op {
        PendingOp::Copy { src, dst, .. } => {
            if resources.are_aliased(src, dst) {
                log::trace!("copy {src} -> {dst} elided, both share memory");
                return Ok(());
            }
            if src.is_buffer() {
                let (from, to) = (resources.buffer_by_key(src)?, resources.buffer_by_key(dst)?);
                recorder.copy_buffer(from.key, to.key, from.size.min(to.size));
            } else {
                let (from, to) = (resources.image_by_key(src)?, resources.image_by_key(dst)?);
                recorder.copy_image(from.key, to.key);
            }
        }
        PendingOp::Clear { resource, .. } => {
            if resource.is_buffer() {
                let buffer = resources.buffer_by_key(resource)?;
                recorder.clear_buffer(buffer.key, buffer.size);
            } else {
                recorder.clear_image(resources.image_by_key(resource)?.key);
            }
        }
    }
    Ok(())
}

fn submit_barriers(
    transitions: &[StageTransition],
    resources: &FrameResources,
    recorder: &mut dyn CommandRecorder,
) -> anyhow::Result<()> {
    if transitions.is_empty() {
        return Ok(());
    }
    let mut images = SmallVec::<[_; 8]>::new();
    let mut buffers = SmallVec::<[_; 8]>::new();
    for transition in transitions {
        log::trace!(
            "barrier on {}: {:?} -> {:?}",
            transition.resource,
            transition.src_stage,
            transition.dst_stage
        );
        match resources.barrier(transition.resource, transition.src_stage, transition.dst_stage)? {
            Barrier::Image(barrier) => images.push(barrier),
            Barrier::Buffer(barrier) => buffers.push(barrier),
        }
    }
    recorder.pipeline_barriers(&images, &buffers);
    Ok(())
}

impl Drop for FrameGraph {
    fn drop(&mut self) {
        for (_, image) in self.carried_images.drain(..) {
            self.pool
                .release_image(image, &[], vk::PipelineStageFlags2::NONE);
        }
        for (_, buffer) in self.carried_buffers.drain(..) {
            self.pool
                .release_buffer(buffer, &[], vk::PipelineStageFlags2::NONE);
        }
    }
}
