//! Backing resources of one frame.
//!
//! Every declared handle is bound to a slot holding a pooled resource.
//! Aliased handles share a slot. When the frame ends each slot goes back to
//! the pool exactly once, filed under the persistent ids of every handle
//! bound to it.

use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::{
    buffer::{BufferKey, BufferSpec, MemoryType},
    image::{ImageKey, ImageSpec},
};

use super::{
    barrier::{Barrier, BufferBarrier, ImageBarrier},
    descriptor::{BoundDescriptor, Descriptor},
    error::GraphError,
    handle::{BufferId, ImageId, PersistentId, ResourceKey, VolumeId},
    pool::{ResourcePool, TransientBuffer, TransientImage},
};

struct Slot<T> {
    resource: Arc<T>,
    persistent: SmallVec<[PersistentId; 1]>,
    last_stage: vk::PipelineStageFlags2,
}

impl<T> Slot<T> {
    fn new(resource: Arc<T>) -> Self {
        Self {
            resource,
            persistent: SmallVec::new(),
            last_stage: vk::PipelineStageFlags2::NONE,
        }
    }
}

pub struct FrameResources {
    pool: Arc<ResourcePool>,
    images: Vec<Option<usize>>,
    volumes: Vec<Option<usize>>,
    buffers: Vec<Option<usize>>,
    image_slots: Vec<Slot<TransientImage>>,
    buffer_slots: Vec<Slot<TransientBuffer>>,
    fresh_images: Vec<ImageKey>,
}

impl FrameResources {
    pub fn new(pool: Arc<ResourcePool>) -> Self {
        Self {
            pool,
            images: Vec::new(),
            volumes: Vec::new(),
            buffers: Vec::new(),
            image_slots: Vec::new(),
            buffer_slots: Vec::new(),
            fresh_images: Vec::new(),
        }
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    pub fn frame_id(&self) -> u64 {
        self.pool.frame_id()
    }

    fn table(&self, key: ResourceKey) -> &Vec<Option<usize>> {
        match key {
            ResourceKey::Image(_) => &self.images,
            ResourceKey::Volume(_) => &self.volumes,
            ResourceKey::Buffer(_) => &self.buffers,
        }
    }

    fn slot(&self, key: ResourceKey) -> Result<usize, GraphError> {
        self.table(key)
            .get(key.index())
            .copied()
            .flatten()
            .ok_or(GraphError::InvalidResource(key))
    }

    fn bind(&mut self, key: ResourceKey, slot: usize) -> Result<(), GraphError> {
        let table = match key {
            ResourceKey::Image(_) => &mut self.images,
            ResourceKey::Volume(_) => &mut self.volumes,
            ResourceKey::Buffer(_) => &mut self.buffers,
        };
        let index = key.index();
        if table.len() <= index {
            table.resize(index + 1, None);
        }
        if table[index].is_some() {
            return Err(GraphError::ResourceExists(key));
        }
        table[index] = Some(slot);
        Ok(())
    }

    pub fn is_alive(&self, key: ResourceKey) -> bool {
        self.slot(key).is_ok()
    }

    pub fn are_aliased(&self, a: ResourceKey, b: ResourceKey) -> bool {
        a.is_buffer() == b.is_buffer()
            && matches!((self.slot(a), self.slot(b)), (Ok(x), Ok(y)) if x == y)
    }

    /// Binds an image or volume handle to a pooled image of `spec`'s shape.
    pub fn create_image(&mut self, key: ResourceKey, spec: &ImageSpec) -> anyhow::Result<()> {
        if key.is_buffer() {
            return Err(GraphError::InvalidResource(key).into());
        }
        if self.is_alive(key) {
            return Err(GraphError::ResourceExists(key).into());
        }
        let resource = match key {
            ResourceKey::Volume(_) => self.pool.create_volume(spec)?,
            _ => self.pool.create_image(spec)?,
        };
        self.fresh_images.push(resource.key);
        self.image_slots.push(Slot::new(resource));
        self.bind(key, self.image_slots.len() - 1)?;
        Ok(())
    }

    pub fn create_buffer(
        &mut self,
        buffer: BufferId,
        spec: &BufferSpec,
        exact: bool,
    ) -> anyhow::Result<()> {
        let key = ResourceKey::from(buffer);
        if self.is_alive(key) {
            return Err(GraphError::ResourceExists(key).into());
        }
        let resource = self.pool.create_buffer(spec, exact)?;
        self.buffer_slots.push(Slot::new(resource));
        self.bind(key, self.buffer_slots.len() - 1)?;
        Ok(())
    }

    /// Binds a handle to an image kept from the previous frame. Its contents
    /// are preserved, so it is never handed to [`Self::take_fresh_images`].
    pub fn insert_carried_over_image(
        &mut self,
        key: ResourceKey,
        image: Arc<TransientImage>,
    ) -> Result<(), GraphError> {
        if key.is_buffer() {
            return Err(GraphError::InvalidResource(key));
        }
        self.image_slots.push(Slot::new(image));
        self.bind(key, self.image_slots.len() - 1)
    }

    pub fn insert_carried_over_buffer(
        &mut self,
        buffer: BufferId,
        resource: Arc<TransientBuffer>,
    ) -> Result<(), GraphError> {
        self.buffer_slots.push(Slot::new(resource));
        self.bind(buffer.into(), self.buffer_slots.len() - 1)
    }

    /// Makes `alias` share the backing resource of `target`.
    pub fn create_alias(&mut self, alias: ResourceKey, target: ResourceKey) -> Result<(), GraphError> {
        if let ResourceKey::Volume(_) = alias {
            return Err(GraphError::VolumeAliasing(alias));
        }
        if let ResourceKey::Volume(_) = target {
            return Err(GraphError::VolumeAliasing(target));
        }
        if alias.is_buffer() != target.is_buffer() {
            return Err(GraphError::IncompatibleAlias { alias, target });
        }
        let slot = self.slot(target)?;
        self.bind(alias, slot)
    }

    pub fn image(&self, image: impl Into<ImageId>) -> Result<&TransientImage, GraphError> {
        self.image_by_key(ResourceKey::from(image.into()))
    }

    pub fn volume(&self, volume: impl Into<VolumeId>) -> Result<&TransientImage, GraphError> {
        self.image_by_key(ResourceKey::from(volume.into()))
    }

    pub fn buffer(&self, buffer: impl Into<BufferId>) -> Result<&TransientBuffer, GraphError> {
        self.buffer_by_key(ResourceKey::from(buffer.into()))
    }

    pub(crate) fn image_by_key(&self, key: ResourceKey) -> Result<&TransientImage, GraphError> {
        if key.is_buffer() {
            return Err(GraphError::InvalidResource(key));
        }
        Ok(&self.image_slots[self.slot(key)?].resource)
    }

    pub(crate) fn buffer_by_key(&self, key: ResourceKey) -> Result<&TransientBuffer, GraphError> {
        if !key.is_buffer() {
            return Err(GraphError::InvalidResource(key));
        }
        Ok(&self.buffer_slots[self.slot(key)?].resource)
    }

    /// Files the resource behind `key` under `id` when the frame ends.
    pub fn make_persistent(&mut self, key: ResourceKey, id: PersistentId) -> Result<(), GraphError> {
        let slot = self.slot(key)?;
        let persistent = if key.is_buffer() {
            &mut self.buffer_slots[slot].persistent
        } else {
            &mut self.image_slots[slot].persistent
        };
        if !persistent.contains(&id) {
            persistent.push(id);
        }
        Ok(())
    }

    /// Remembers the stage of the last unsynchronized write to `key`.
    pub fn set_last_stage(
        &mut self,
        key: ResourceKey,
        stage: vk::PipelineStageFlags2,
    ) -> Result<(), GraphError> {
        let slot = self.slot(key)?;
        if key.is_buffer() {
            self.buffer_slots[slot].last_stage = stage;
        } else {
            self.image_slots[slot].last_stage = stage;
        }
        Ok(())
    }

    pub fn barrier(
        &self,
        key: ResourceKey,
        src_stage: vk::PipelineStageFlags2,
        dst_stage: vk::PipelineStageFlags2,
    ) -> Result<Barrier, GraphError> {
        Ok(if key.is_buffer() {
            Barrier::Buffer(BufferBarrier {
                buffer: self.buffer_by_key(key)?.key,
                src_stage,
                dst_stage,
            })
        } else {
            Barrier::Image(ImageBarrier {
                image: self.image_by_key(key)?.key,
                src_stage,
                dst_stage,
            })
        })
    }

    /// Writes `data` into a buffer mapped for CPU writes.
    pub fn write_buffer(
        &self,
        buffer: impl Into<BufferId>,
        offset: u64,
        data: &[u8],
    ) -> anyhow::Result<()> {
        let key = ResourceKey::from(buffer.into());
        let resource = self.buffer_by_key(key)?;
        if resource.spec.memory != MemoryType::Staging {
            return Err(GraphError::NotHostVisible(key).into());
        }
        let len = data.len() as u64;
        if offset.checked_add(len).is_none_or(|end| end > resource.size) {
            return Err(GraphError::MappedRangeOutOfBounds {
                resource: key,
                offset,
                len,
                size: resource.size,
            }
            .into());
        }
        self.pool.device().write_buffer(resource.key, offset, data)
    }

    pub fn map_buffer<T: bytemuck::Pod>(
        &self,
        buffer: impl Into<BufferId>,
        data: &[T],
    ) -> anyhow::Result<()> {
        self.write_buffer(buffer, 0, bytemuck::cast_slice(data))
    }

    /// Makes every CPU write of the frame visible to the device.
    pub fn flush_mapped(&self) -> anyhow::Result<()> {
        let mapped: Vec<BufferKey> = self
            .buffer_slots
            .iter()
            .filter(|slot| slot.resource.spec.memory == MemoryType::Staging)
            .map(|slot| slot.resource.key)
            .collect();
        if mapped.is_empty() {
            return Ok(());
        }
        self.pool.device().flush_buffers(&mapped)
    }

    /// Images acquired this frame whose contents start out undefined.
    pub fn take_fresh_images(&mut self) -> Vec<ImageKey> {
        std::mem::take(&mut self.fresh_images)
    }

    pub fn resolve_descriptor(&self, descriptor: &Descriptor) -> Result<BoundDescriptor, GraphError> {
        Ok(match descriptor {
            Descriptor::SampledImage { resource, sampler } => BoundDescriptor::SampledImage {
                image: self.image_by_key(*resource)?.key,
                sampler: *sampler,
            },
            Descriptor::StorageImage(resource) => {
                BoundDescriptor::StorageImage(self.image_by_key(*resource)?.key)
            }
            Descriptor::UniformBuffer(resource) => {
                let buffer = self.buffer_by_key(*resource)?;
                BoundDescriptor::UniformBuffer {
                    buffer: buffer.key,
                    size: buffer.size,
                }
            }
            Descriptor::StorageBuffer(resource) => {
                let buffer = self.buffer_by_key(*resource)?;
                BoundDescriptor::StorageBuffer {
                    buffer: buffer.key,
                    size: buffer.size,
                }
            }
            Descriptor::Inline(data) => BoundDescriptor::Inline(data.clone()),
            Descriptor::External(external) => BoundDescriptor::External(*external),
        })
    }
}

impl Drop for FrameResources {
    fn drop(&mut self) {
        log::trace!(
            "releasing {} images and {} buffers of frame {}",
            self.image_slots.len(),
            self.buffer_slots.len(),
            self.pool.frame_id()
        );
        for slot in self.image_slots.drain(..) {
            self.pool
                .release_image(slot.resource, &slot.persistent, slot.last_stage);
        }
        for slot in self.buffer_slots.drain(..) {
            self.pool
                .release_buffer(slot.resource, &slot.persistent, slot.last_stage);
        }
        self.pool.garbage_collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::null::NullDevice, image::ImageKind};

    fn setup() -> (Arc<NullDevice>, Arc<ResourcePool>) {
        let device = Arc::new(NullDevice::new());
        let pool = Arc::new(ResourcePool::new(device.clone()));
        (device, pool)
    }

    fn spec() -> ImageSpec {
        ImageSpec::default()
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: 32,
                height: 32,
                depth: 1,
            })
            .usage(vk::ImageUsageFlags::SAMPLED)
    }

    #[test]
    fn test_alias_shares_backing() {
        let (_device, pool) = setup();
        let mut resources = FrameResources::new(pool);
        let a = ResourceKey::Image(0);
        let b = ResourceKey::Image(1);
        resources.create_image(a, &spec()).unwrap();
        resources.create_alias(b, a).unwrap();

        assert!(resources.are_aliased(a, b));
        assert_eq!(
            resources.image_by_key(a).unwrap().key,
            resources.image_by_key(b).unwrap().key
        );
        assert_eq!(resources.take_fresh_images().len(), 1);
    }

    #[test]
    fn test_volume_aliasing_is_rejected() {
        let (_device, pool) = setup();
        let mut resources = FrameResources::new(pool);
        let volume = ResourceKey::Volume(0);
        resources
            .create_image(volume, &spec().kind(ImageKind::Volume))
            .unwrap();
        assert_eq!(
            resources.create_alias(ResourceKey::Volume(1), volume),
            Err(GraphError::VolumeAliasing(ResourceKey::Volume(1)))
        );
    }

    #[test]
    fn test_undeclared_lookup_fails() {
        let (_device, pool) = setup();
        let resources = FrameResources::new(pool);
        let missing: BufferId = BufferId::new(4);
        assert!(!resources.is_alive(ResourceKey::Buffer(4)));
        assert!(matches!(
            resources.buffer(missing),
            Err(GraphError::InvalidResource(ResourceKey::Buffer(4)))
        ));
    }

    #[test]
    fn test_double_creation_fails() {
        let (_device, pool) = setup();
        let mut resources = FrameResources::new(pool);
        resources.create_image(ResourceKey::Image(0), &spec()).unwrap();
        let err = resources
            .create_image(ResourceKey::Image(0), &spec())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<GraphError>(),
            Some(&GraphError::ResourceExists(ResourceKey::Image(0)))
        );
    }

    #[test]
    fn test_staging_writes() {
        let (device, pool) = setup();
        let mut resources = FrameResources::new(pool);
        let staging = BufferId::new(0);
        let local = BufferId::new(1);
        let uniform = BufferSpec::default()
            .size(8)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER);
        resources
            .create_buffer(staging, &uniform.clone().memory(MemoryType::Staging), true)
            .unwrap();
        resources.create_buffer(local, &uniform, true).unwrap();

        resources.map_buffer(staging, &[1u32, 2u32]).unwrap();
        let key = resources.buffer(staging).unwrap().key;
        assert_eq!(
            device.buffer_contents(key).unwrap(),
            bytemuck::cast_slice::<u32, u8>(&[1, 2]).to_vec()
        );

        let err = resources.write_buffer(local, 0, &[0]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<GraphError>(),
            Some(&GraphError::NotHostVisible(ResourceKey::Buffer(1)))
        );
        assert!(resources.write_buffer(staging, 4, &[0; 8]).is_err());

        resources.flush_mapped().unwrap();
        assert_eq!(device.flushes(), 1);
    }

    #[test]
    fn test_drop_releases_once_and_collects() {
        let (device, pool) = setup();
        {
            let mut resources = FrameResources::new(pool.clone());
            resources.create_image(ResourceKey::Image(0), &spec()).unwrap();
            resources
                .create_alias(ResourceKey::Image(1), ResourceKey::Image(0))
                .unwrap();
            resources
                .make_persistent(ResourceKey::Image(1), PersistentId(5))
                .unwrap();
        }
        assert_eq!(pool.frame_id(), 1);
        assert_eq!(pool.idle_images(), 0);
        assert!(pool.has_persistent_image(PersistentId(5)));
        assert_eq!(device.live_images(), 1);
    }
}
