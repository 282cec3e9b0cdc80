//! Cache of idle GPU resources shared across frames.
//!
//! Released resources are kept idle for a retention window so that work
//! still in flight never sees its memory reused by another allocation, and
//! so the next frames can pick them up instead of allocating. Resources
//! released with persistent ids are filed under those ids instead and stay
//! until somebody retrieves them.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;
use ash::vk;

use crate::{
    buffer::{BufferKey, BufferSpec},
    device::GpuDevice,
    image::{ImageKey, ImageKind, ImageSpec},
};

use super::{error::GraphError, handle::PersistentId, settings::PoolSettings};

#[derive(Debug)]
pub struct TransientImage {
    pub key: ImageKey,
    pub spec: ImageSpec,
}

#[derive(Debug)]
pub struct TransientBuffer {
    pub key: BufferKey,
    /// Shape of the native buffer, possibly larger than requested.
    pub spec: BufferSpec,
    /// Size requested by the frame that holds the buffer.
    pub size: u64,
}

struct Idle<T> {
    resource: T,
    released_at: u64,
}

struct PersistentEntry<T> {
    resource: Arc<T>,
    last_stage: vk::PipelineStageFlags2,
}

#[derive(Default)]
struct PoolState {
    images: Vec<Idle<TransientImage>>,
    buffers: Vec<Idle<TransientBuffer>>,
    persistent_images: HashMap<PersistentId, PersistentEntry<TransientImage>>,
    persistent_buffers: HashMap<PersistentId, PersistentEntry<TransientBuffer>>,
    frame_id: u64,
}

pub struct ResourcePool {
    device: Arc<dyn GpuDevice>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
}

impl ResourcePool {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self::with_settings(device, PoolSettings::default())
    }

    pub fn with_settings(device: Arc<dyn GpuDevice>, settings: PoolSettings) -> Self {
        Self {
            device,
            settings,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn frame_id(&self) -> u64 {
        self.state().frame_id
    }

    pub fn create_image(&self, spec: &ImageSpec) -> anyhow::Result<Arc<TransientImage>> {
        {
            let mut state = self.state();
            if let Some(index) = state
                .images
                .iter()
                .position(|idle| idle.resource.spec.same_shape(spec))
            {
                let idle = state.images.remove(index);
                log::trace!("reusing pooled image {:?}", idle.resource.key);
                return Ok(Arc::new(idle.resource));
            }
        }

        let key = self
            .device
            .create_image(spec)
            .with_context(|| format!("failed to create {spec}"))?;
        Ok(Arc::new(TransientImage {
            key,
            spec: spec.clone(),
        }))
    }

    pub fn create_volume(&self, spec: &ImageSpec) -> anyhow::Result<Arc<TransientImage>> {
        let spec = spec.clone().kind(ImageKind::Volume);
        self.create_image(&spec)
    }

    /// Returns a buffer of `spec.size` bytes. When `exact` is false an idle
    /// buffer of the same usage up to twice as large may be handed out.
    pub fn create_buffer(
        &self,
        spec: &BufferSpec,
        exact: bool,
    ) -> anyhow::Result<Arc<TransientBuffer>> {
        {
            let mut state = self.state();
            let requested = spec.size;
            let fits = |idle: &Idle<TransientBuffer>| {
                let candidate = &idle.resource.spec;
                candidate.same_kind(spec)
                    && if exact {
                        candidate.size == requested
                    } else {
                        candidate.size >= requested && candidate.size <= requested.saturating_mul(2)
                    }
            };
            let best = state
                .buffers
                .iter()
                .enumerate()
                .filter(|(_, idle)| fits(idle))
                .min_by_key(|(index, idle)| (idle.resource.spec.size, *index))
                .map(|(index, _)| index);

            if let Some(index) = best {
                let mut idle = state.buffers.remove(index);
                log::trace!(
                    "reusing pooled buffer {:?} ({} bytes for {} requested)",
                    idle.resource.key,
                    idle.resource.spec.size,
                    requested
                );
                idle.resource.size = requested;
                return Ok(Arc::new(idle.resource));
            }
        }

        let key = self
            .device
            .create_buffer(spec)
            .with_context(|| format!("failed to create {spec}"))?;
        Ok(Arc::new(TransientBuffer {
            key,
            spec: spec.clone(),
            size: spec.size,
        }))
    }

    /// Gives an image back. With persistent ids it is filed under each of
    /// them, otherwise it becomes idle.
    pub fn release_image(
        &self,
        image: Arc<TransientImage>,
        persistent: &[PersistentId],
        last_stage: vk::PipelineStageFlags2,
    ) {
        let mut state = self.state();
        let frame_id = state.frame_id;
        if persistent.is_empty() {
            make_idle(&mut state.images, image, frame_id);
            return;
        }
        for id in persistent {
            let entry = PersistentEntry {
                resource: image.clone(),
                last_stage,
            };
            if let Some(previous) = state.persistent_images.insert(*id, entry) {
                make_idle(&mut state.images, previous.resource, frame_id);
            }
        }
    }

    pub fn release_buffer(
        &self,
        buffer: Arc<TransientBuffer>,
        persistent: &[PersistentId],
        last_stage: vk::PipelineStageFlags2,
    ) {
        let mut state = self.state();
        let frame_id = state.frame_id;
        if persistent.is_empty() {
            make_idle(&mut state.buffers, buffer, frame_id);
            return;
        }
        for id in persistent {
            let entry = PersistentEntry {
                resource: buffer.clone(),
                last_stage,
            };
            if let Some(previous) = state.persistent_buffers.insert(*id, entry) {
                make_idle(&mut state.buffers, previous.resource, frame_id);
            }
        }
    }

    pub fn has_persistent_image(&self, id: PersistentId) -> bool {
        self.state().persistent_images.contains_key(&id)
    }

    pub fn has_persistent_buffer(&self, id: PersistentId) -> bool {
        self.state().persistent_buffers.contains_key(&id)
    }

    /// Takes the image filed under `id`, with the stage that last wrote it.
    pub fn persistent_image(
        &self,
        id: PersistentId,
    ) -> anyhow::Result<(Arc<TransientImage>, vk::PipelineStageFlags2)> {
        let entry = self
            .state()
            .persistent_images
            .remove(&id)
            .ok_or(GraphError::MissingPersistent(id))?;
        Ok((entry.resource, entry.last_stage))
    }

    pub fn persistent_buffer(
        &self,
        id: PersistentId,
    ) -> anyhow::Result<(Arc<TransientBuffer>, vk::PipelineStageFlags2)> {
        let entry = self
            .state()
            .persistent_buffers
            .remove(&id)
            .ok_or(GraphError::MissingPersistent(id))?;
        Ok((entry.resource, entry.last_stage))
    }

    /// Destroys idle resources older than the retention window, then moves
    /// to the next frame. Called once per frame after every release.
    pub fn garbage_collect(&self) {
        let _span = tracing::trace_span!("pool_garbage_collect").entered();
        let retention = self.settings.retention_frames;
        let mut state = self.state();
        let frame_id = state.frame_id;
        let expired = |idle_at: u64| frame_id.saturating_sub(idle_at) >= retention;

        let (expired_images, images): (Vec<_>, Vec<_>) = std::mem::take(&mut state.images)
            .into_iter()
            .partition(|idle| expired(idle.released_at));
        state.images = images;

        let (expired_buffers, buffers): (Vec<_>, Vec<_>) = std::mem::take(&mut state.buffers)
            .into_iter()
            .partition(|idle| expired(idle.released_at));
        state.buffers = buffers;

        state.frame_id += 1;
        drop(state);

        if !expired_images.is_empty() || !expired_buffers.is_empty() {
            log::debug!(
                "pool evicting {} images and {} buffers at frame {}",
                expired_images.len(),
                expired_buffers.len(),
                frame_id
            );
        }
        for idle in expired_images {
            self.device.destroy_image(idle.resource.key);
        }
        for idle in expired_buffers {
            self.device.destroy_buffer(idle.resource.key);
        }
    }

    pub fn idle_images(&self) -> usize {
        self.state().images.len()
    }

    pub fn idle_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn persistent_count(&self) -> usize {
        let state = self.state();
        state.persistent_images.len() + state.persistent_buffers.len()
    }
}

/// Idles `resource` unless another persistent id still shares it.
fn make_idle<T>(idle: &mut Vec<Idle<T>>, resource: Arc<T>, frame_id: u64) {
    if let Ok(resource) = Arc::try_unwrap(resource) {
        idle.push(Idle {
            resource,
            released_at: frame_id,
        });
    }
}

impl Drop for ResourcePool {
    fn drop(&mut self) {
        log::trace!("Destroying ResourcePool");
        let state = std::mem::take(&mut *self.state());

        let mut images: Vec<ImageKey> = state.images.iter().map(|i| i.resource.key).collect();
        let mut buffers: Vec<BufferKey> = state.buffers.iter().map(|b| b.resource.key).collect();
        images.extend(state.persistent_images.values().map(|e| e.resource.key));
        buffers.extend(state.persistent_buffers.values().map(|e| e.resource.key));
        images.sort();
        images.dedup();
        buffers.sort();
        buffers.dedup();

        for key in images {
            self.device.destroy_image(key);
        }
        for key in buffers {
            self.device.destroy_buffer(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::MemoryType, device::null::NullDevice};

    fn pool_with(retention: u64) -> (Arc<NullDevice>, ResourcePool) {
        let device = Arc::new(NullDevice::new());
        let pool = ResourcePool::with_settings(
            device.clone(),
            PoolSettings::default().retention_frames(retention),
        );
        (device, pool)
    }

    fn image_spec() -> ImageSpec {
        ImageSpec::default()
            .format(vk::Format::R16G16B16A16_SFLOAT)
            .extent(vk::Extent3D {
                width: 128,
                height: 128,
                depth: 1,
            })
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::COLOR_ATTACHMENT)
    }

    fn uniform_spec(size: u64) -> BufferSpec {
        BufferSpec::default()
            .size(size)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
    }

    #[test]
    fn test_same_shape_image_is_reused() {
        let (device, pool) = pool_with(6);
        let first = pool.create_image(&image_spec()).unwrap();
        let key = first.key;
        pool.release_image(first, &[], vk::PipelineStageFlags2::NONE);
        pool.garbage_collect();

        let second = pool.create_image(&image_spec()).unwrap();
        assert_eq!(second.key, key);
        assert_eq!(device.images_created(), 1);

        let other = pool
            .create_image(&image_spec().usage(vk::ImageUsageFlags::STORAGE))
            .unwrap();
        assert_ne!(other.key, key);
        assert_eq!(device.images_created(), 2);
    }

    #[test]
    fn test_exact_buffer_reuse() {
        let (device, pool) = pool_with(6);
        let buffer = pool.create_buffer(&uniform_spec(256), true).unwrap();
        let key = buffer.key;
        pool.release_buffer(buffer, &[], vk::PipelineStageFlags2::NONE);

        let larger = pool.create_buffer(&uniform_spec(512), true).unwrap();
        assert_ne!(larger.key, key);
        let same = pool.create_buffer(&uniform_spec(256), true).unwrap();
        assert_eq!(same.key, key);
        assert_eq!(device.buffers_created(), 2);
    }

    #[test]
    fn test_inexact_buffer_reuse_keeps_logical_size() {
        let (_device, pool) = pool_with(6);
        let big = pool.create_buffer(&uniform_spec(400), true).unwrap();
        let key = big.key;
        pool.release_buffer(big, &[], vk::PipelineStageFlags2::NONE);

        let reused = pool.create_buffer(&uniform_spec(200), false).unwrap();
        assert_eq!(reused.key, key);
        assert_eq!(reused.size, 200);
        assert_eq!(reused.spec.size, 400);
    }

    #[test]
    fn test_inexact_buffer_reuse_is_bounded() {
        let (_device, pool) = pool_with(6);
        let big = pool.create_buffer(&uniform_spec(401), true).unwrap();
        let key = big.key;
        pool.release_buffer(big, &[], vk::PipelineStageFlags2::NONE);

        let fresh = pool.create_buffer(&uniform_spec(200), false).unwrap();
        assert_ne!(fresh.key, key);
    }

    #[test]
    fn test_buffer_memory_type_must_match() {
        let (_device, pool) = pool_with(6);
        let staging = pool
            .create_buffer(&uniform_spec(64).memory(MemoryType::Staging), true)
            .unwrap();
        let key = staging.key;
        pool.release_buffer(staging, &[], vk::PipelineStageFlags2::NONE);

        let device_local = pool.create_buffer(&uniform_spec(64), true).unwrap();
        assert_ne!(device_local.key, key);
    }

    #[test]
    fn test_retention_window() {
        let retention = 4;
        let (device, pool) = pool_with(retention);
        let released_at = pool.frame_id();
        let image = pool.create_image(&image_spec()).unwrap();
        let key = image.key;
        pool.release_image(image, &[], vk::PipelineStageFlags2::NONE);

        while pool.frame_id() < released_at + retention - 1 {
            pool.garbage_collect();
        }
        assert_eq!(pool.idle_images(), 1);
        assert_eq!(device.live_images(), 1);

        while pool.frame_id() < released_at + retention + 1 {
            pool.garbage_collect();
        }
        assert_eq!(pool.idle_images(), 0);
        assert_eq!(device.live_images(), 0);

        let fresh = pool.create_image(&image_spec()).unwrap();
        assert_ne!(fresh.key, key);
    }

    #[test]
    fn test_persistent_round_trip() {
        let (_device, pool) = pool_with(6);
        let id = PersistentId(3);
        let image = pool.create_image(&image_spec()).unwrap();
        let key = image.key;
        pool.release_image(image, &[id], vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert!(pool.has_persistent_image(id));
        assert_eq!(pool.idle_images(), 0);

        for _ in 0..20 {
            pool.garbage_collect();
        }
        let (image, stage) = pool.persistent_image(id).unwrap();
        assert_eq!(image.key, key);
        assert_eq!(stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert!(!pool.has_persistent_image(id));
    }

    #[test]
    fn test_missing_persistent_is_an_error() {
        let (_device, pool) = pool_with(6);
        let err = pool.persistent_buffer(PersistentId(9)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<GraphError>(),
            Some(&GraphError::MissingPersistent(PersistentId(9)))
        );
    }

    #[test]
    fn test_persistent_replacement_recycles_previous() {
        let (_device, pool) = pool_with(6);
        let id = PersistentId(1);
        let first = pool.create_image(&image_spec()).unwrap();
        let first_key = first.key;
        pool.release_image(first, &[id], vk::PipelineStageFlags2::NONE);

        let second = pool
            .create_image(&image_spec().usage(vk::ImageUsageFlags::STORAGE))
            .unwrap();
        pool.release_image(second, &[id], vk::PipelineStageFlags2::NONE);

        assert_eq!(pool.idle_images(), 1);
        let reused = pool.create_image(&image_spec()).unwrap();
        assert_eq!(reused.key, first_key);
    }

    #[test]
    fn test_shared_persistent_entry_is_not_idled_twice() {
        let (_device, pool) = pool_with(6);
        let image = pool.create_image(&image_spec()).unwrap();
        pool.release_image(
            image,
            &[PersistentId(1), PersistentId(2)],
            vk::PipelineStageFlags2::NONE,
        );
        let (taken, _) = pool.persistent_image(PersistentId(1)).unwrap();
        pool.release_image(taken, &[], vk::PipelineStageFlags2::NONE);
        assert_eq!(pool.idle_images(), 0);
        assert!(pool.has_persistent_image(PersistentId(2)));
    }

    #[test]
    fn test_drop_destroys_everything() {
        let (device, pool) = pool_with(6);
        let a = pool.create_image(&image_spec()).unwrap();
        let b = pool.create_buffer(&uniform_spec(16), true).unwrap();
        pool.release_image(a, &[PersistentId(0)], vk::PipelineStageFlags2::NONE);
        pool.release_buffer(b, &[], vk::PipelineStageFlags2::NONE);
        drop(pool);
        assert_eq!(device.live_images(), 0);
        assert_eq!(device.live_buffers(), 0);
    }
}
