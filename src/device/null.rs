//! A backend without a GPU.
//!
//! Resources are slotmap entries and every recorded command is kept in a
//! list, which makes frames inspectable in tests and tools.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, bail};
use slotmap::SlotMap;

use crate::{
    buffer::{BufferKey, BufferSpec, MemoryType},
    framegraph::{BufferBarrier, Framebuffer, ImageBarrier},
    image::{ImageKey, ImageSpec},
};

use super::{CommandRecorder, GpuDevice};

struct NullBuffer {
    spec: BufferSpec,
    contents: Vec<u8>,
}

#[derive(Default)]
struct NullState {
    images: SlotMap<ImageKey, ImageSpec>,
    buffers: SlotMap<BufferKey, NullBuffer>,
    images_created: usize,
    buffers_created: usize,
    flushes: usize,
}

#[derive(Default)]
pub struct NullDevice {
    state: Mutex<NullState>,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn live_images(&self) -> usize {
        self.state().images.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn images_created(&self) -> usize {
        self.state().images_created
    }

    pub fn buffers_created(&self) -> usize {
        self.state().buffers_created
    }

    pub fn flushes(&self) -> usize {
        self.state().flushes
    }

    pub fn image_spec(&self, key: ImageKey) -> Option<ImageSpec> {
        self.state().images.get(key).cloned()
    }

    pub fn buffer_spec(&self, key: BufferKey) -> Option<BufferSpec> {
        self.state().buffers.get(key).map(|b| b.spec.clone())
    }

    pub fn buffer_contents(&self, key: BufferKey) -> Option<Vec<u8>> {
        self.state().buffers.get(key).map(|b| b.contents.clone())
    }
}

impl GpuDevice for NullDevice {
    fn create_image(&self, spec: &ImageSpec) -> anyhow::Result<ImageKey> {
        let mut state = self.state();
        state.images_created += 1;
        let key = state.images.insert(spec.clone());
        log::trace!("NullDevice: created image {:?} {}", key, spec);
        Ok(key)
    }

    fn destroy_image(&self, key: ImageKey) {
        if self.state().images.remove(key).is_none() {
            log::warn!("NullDevice: destroying unknown image {:?}", key);
        }
    }

    fn create_buffer(&self, spec: &BufferSpec) -> anyhow::Result<BufferKey> {
        let mut state = self.state();
        state.buffers_created += 1;
        let key = state.buffers.insert(NullBuffer {
            spec: spec.clone(),
            contents: vec![0; spec.size as usize],
        });
        log::trace!("NullDevice: created buffer {:?} {}", key, spec);
        Ok(key)
    }

    fn destroy_buffer(&self, key: BufferKey) {
        if self.state().buffers.remove(key).is_none() {
            log::warn!("NullDevice: destroying unknown buffer {:?}", key);
        }
    }

    fn write_buffer(&self, key: BufferKey, offset: u64, data: &[u8]) -> anyhow::Result<()> {
        let mut state = self.state();
        let buffer = state.buffers.get_mut(key).context("unknown buffer")?;
        if buffer.spec.memory != MemoryType::Staging {
            bail!("buffer {:?} is not host visible", key);
        }
        let start = offset as usize;
        let end = start + data.len();
        let Some(dst) = buffer.contents.get_mut(start..end) else {
            bail!("write {}..{} overflows buffer {:?}", start, end, key);
        };
        dst.copy_from_slice(data);
        Ok(())
    }

    fn flush_buffers(&self, keys: &[BufferKey]) -> anyhow::Result<()> {
        let mut state = self.state();
        for key in keys {
            if !state.buffers.contains_key(*key) {
                bail!("flushing unknown buffer {:?}", key);
            }
        }
        state.flushes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    PrepareImages(Vec<ImageKey>),
    Barriers {
        images: Vec<ImageBarrier>,
        buffers: Vec<BufferBarrier>,
    },
    CopyImage {
        src: ImageKey,
        dst: ImageKey,
    },
    CopyBuffer {
        src: BufferKey,
        dst: BufferKey,
        size: u64,
    },
    ClearImage(ImageKey),
    ClearBuffer {
        buffer: BufferKey,
        size: u64,
    },
    BeginRendering(Framebuffer),
    EndRendering,
    BeginLabel(String),
    EndLabel,
    Label(String),
}

/// A [`CommandRecorder`] that keeps what it is given.
#[derive(Debug, Default)]
pub struct RecordingCommands {
    commands: Vec<RecordedCommand>,
}

impl RecordingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn image_barriers(&self) -> impl Iterator<Item = &ImageBarrier> {
        self.commands.iter().flat_map(|c| match c {
            RecordedCommand::Barriers { images, .. } => images.as_slice(),
            _ => &[][..],
        })
    }

    pub fn buffer_barriers(&self) -> impl Iterator<Item = &BufferBarrier> {
        self.commands.iter().flat_map(|c| match c {
            RecordedCommand::Barriers { buffers, .. } => buffers.as_slice(),
            _ => &[][..],
        })
    }

    pub fn copies(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RecordedCommand::CopyImage { .. } | RecordedCommand::CopyBuffer { .. }
                )
            })
            .count()
    }

    /// Position of the first [`RecordedCommand::Label`] named `name`.
    pub fn label_position(&self, name: &str) -> Option<usize> {
        self.commands
            .iter()
            .position(|c| matches!(c, RecordedCommand::Label(l) if l == name))
    }
}

impl CommandRecorder for RecordingCommands {
    fn prepare_images(&mut self, images: &[ImageKey]) {
        self.commands
            .push(RecordedCommand::PrepareImages(images.to_vec()));
    }

    fn pipeline_barriers(&mut self, images: &[ImageBarrier], buffers: &[BufferBarrier]) {
        self.commands.push(RecordedCommand::Barriers {
            images: images.to_vec(),
            buffers: buffers.to_vec(),
        });
    }

    fn copy_image(&mut self, src: ImageKey, dst: ImageKey) {
        self.commands.push(RecordedCommand::CopyImage { src, dst });
    }

    fn copy_buffer(&mut self, src: BufferKey, dst: BufferKey, size: u64) {
        self.commands
            .push(RecordedCommand::CopyBuffer { src, dst, size });
    }

    fn clear_image(&mut self, image: ImageKey) {
        self.commands.push(RecordedCommand::ClearImage(image));
    }

    fn clear_buffer(&mut self, buffer: BufferKey, size: u64) {
        self.commands
            .push(RecordedCommand::ClearBuffer { buffer, size });
    }

    fn begin_rendering(&mut self, framebuffer: &Framebuffer) {
        self.commands
            .push(RecordedCommand::BeginRendering(framebuffer.clone()));
    }

    fn end_rendering(&mut self) {
        self.commands.push(RecordedCommand::EndRendering);
    }

    fn begin_label(&mut self, name: &str) {
        self.commands
            .push(RecordedCommand::BeginLabel(name.to_owned()));
    }

    fn end_label(&mut self) {
        self.commands.push(RecordedCommand::EndLabel);
    }

    fn insert_label(&mut self, name: &str) {
        self.commands.push(RecordedCommand::Label(name.to_owned()));
    }
}
