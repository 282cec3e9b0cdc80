//! The graphics-primitive layer the frame graph drives.
//!
//! [`GpuDevice`] creates and destroys native resources and is shared with
//! the resource pool, so it must be usable from any thread.
//! [`CommandRecorder`] records the work of one frame.

pub mod null;

use crate::{
    buffer::{BufferKey, BufferSpec},
    framegraph::{BufferBarrier, Framebuffer, ImageBarrier},
    image::{ImageKey, ImageSpec},
};

pub trait GpuDevice: Send + Sync {
    fn create_image(&self, spec: &ImageSpec) -> anyhow::Result<ImageKey>;

    fn destroy_image(&self, key: ImageKey);

    fn create_buffer(&self, spec: &BufferSpec) -> anyhow::Result<BufferKey>;

    fn destroy_buffer(&self, key: BufferKey);

    /// Writes into a host visible buffer.
    fn write_buffer(&self, key: BufferKey, offset: u64, data: &[u8]) -> anyhow::Result<()>;

    /// Makes host writes to the given buffers visible to the device.
    fn flush_buffers(&self, keys: &[BufferKey]) -> anyhow::Result<()>;
}

pub trait CommandRecorder {
    /// Moves freshly created images out of their undefined layout.
    fn prepare_images(&mut self, images: &[ImageKey]);

    fn pipeline_barriers(&mut self, images: &[ImageBarrier], buffers: &[BufferBarrier]);

    /// Copies the whole of `src` into `dst`, synchronizing both on its own.
    fn copy_image(&mut self, src: ImageKey, dst: ImageKey);

    /// Copies `size` bytes from `src` to `dst`, synchronizing both on its own.
    fn copy_buffer(&mut self, src: BufferKey, dst: BufferKey, size: u64);

    fn clear_image(&mut self, image: ImageKey);

    fn clear_buffer(&mut self, buffer: BufferKey, size: u64);

    fn begin_rendering(&mut self, framebuffer: &Framebuffer);

    fn end_rendering(&mut self);

    fn begin_label(&mut self, name: &str);

    fn end_label(&mut self);

    fn insert_label(&mut self, name: &str);
}
