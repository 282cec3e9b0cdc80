use ash::vk;
use smallvec::SmallVec;

use crate::{
    buffer::BufferKey,
    device::CommandRecorder,
    framegraph::{
        BufferBarrier, Framebuffer, FramebufferAttachment, ImageBarrier, LoadOp, stage_access,
    },
    image::{ImageKey, ImageSpec, is_depth_format},
};

use super::VulkanDevice;

/// Reversed Z.
const CLEAR_DEPTH: f32 = 0.0;
const CLEAR_COLOR: [f32; 4] = [0.0; 4];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct ImageState {
    layout: vk::ImageLayout,
    stage: vk::PipelineStageFlags2,
    access: vk::AccessFlags2,
}

impl ImageState {
    const UNDEFINED: ImageState = ImageState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
        access: vk::AccessFlags2::NONE,
    };

    const TRANSFER_SRC: ImageState = ImageState {
        layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        stage: vk::PipelineStageFlags2::COPY,
        access: vk::AccessFlags2::TRANSFER_READ,
    };

    const TRANSFER_DST: ImageState = ImageState {
        layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_WRITE,
    };

    /// Between passes: any stage may have touched the image.
    fn resting(spec: &ImageSpec) -> Self {
        Self {
            layout: spec.resting_layout(),
            stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            access: vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        }
    }

    fn attachment(spec: &ImageSpec) -> Self {
        let resting = spec.resting_layout();
        if is_depth_format(spec.format) {
            Self {
                layout: if resting == vk::ImageLayout::GENERAL {
                    resting
                } else {
                    vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
                },
                stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            }
        } else {
            Self {
                layout: if resting == vk::ImageLayout::GENERAL {
                    resting
                } else {
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                },
                stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                access: vk::AccessFlags2::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            }
        }
    }
}

fn image_barrier(
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old: ImageState,
    new: ImageState,
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .image(image)
        .subresource_range(range)
        .src_stage_mask(old.stage)
        .src_access_mask(old.access)
        .old_layout(old.layout)
        .dst_stage_mask(new.stage)
        .dst_access_mask(new.access)
        .new_layout(new.layout)
}

fn whole_buffer_barrier(
    buffer: vk::Buffer,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
) -> vk::BufferMemoryBarrier2<'static> {
    vk::BufferMemoryBarrier2::default()
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
}

fn mip_extent(extent: vk::Extent3D, mip: u32) -> vk::Extent3D {
    vk::Extent3D {
        width: (extent.width >> mip).max(1),
        height: (extent.height >> mip).max(1),
        depth: (extent.depth >> mip).max(1),
    }
}

/// Records frame graph commands into a primary command buffer in the
/// recording state.
pub struct VulkanRecorder<'a> {
    device: &'a VulkanDevice,
    cmd: vk::CommandBuffer,
    rendering: Option<Framebuffer>,
}

impl<'a> VulkanRecorder<'a> {
    pub fn new(device: &'a VulkanDevice, cmd: vk::CommandBuffer) -> Self {
        Self {
            device,
            cmd,
            rendering: None,
        }
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn vk(&self) -> &ash::Device {
        self.device.context().device()
    }

    fn dependency(
        &self,
        images: &[vk::ImageMemoryBarrier2<'_>],
        buffers: &[vk::BufferMemoryBarrier2<'_>],
    ) {
        if images.is_empty() && buffers.is_empty() {
            return;
        }
        let dep_info = vk::DependencyInfo::default()
            .image_memory_barriers(images)
            .buffer_memory_barriers(buffers);
        unsafe { self.vk().cmd_pipeline_barrier2(self.cmd, &dep_info) };
    }

    fn attachment_barriers(&self, framebuffer: &Framebuffer, entering: bool) {
        let barriers: SmallVec<[_; 5]> = framebuffer
            .attachments()
            .map(|attachment| {
                let (image, _, spec) = self.device.image(attachment.image);
                let (resting, target) = (ImageState::resting(&spec), ImageState::attachment(&spec));
                let range = spec.subresource_range();
                if entering {
                    let old = if attachment.load_op == LoadOp::Load {
                        resting
                    } else {
                        ImageState {
                            layout: vk::ImageLayout::UNDEFINED,
                            ..resting
                        }
                    };
                    image_barrier(image, range, old, target)
                } else {
                    image_barrier(image, range, target, resting)
                }
            })
            .collect();
        self.dependency(&barriers, &[]);
    }

    fn rendering_attachment(
        &self,
        attachment: &FramebufferAttachment,
    ) -> vk::RenderingAttachmentInfo<'static> {
        let (_, view, spec) = self.device.image(attachment.image);
        let depth = is_depth_format(spec.format);
        let clear_value = if depth {
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: CLEAR_DEPTH,
                    stencil: 0,
                },
            }
        } else {
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            }
        };
        let load_op = match attachment.load_op {
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        };
        vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(ImageState::attachment(&spec).layout)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value)
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn prepare_images(&mut self, images: &[ImageKey]) {
        let barriers: Vec<_> = images
            .iter()
            .map(|&key| {
                let (image, _, spec) = self.device.image(key);
                image_barrier(
                    image,
                    spec.subresource_range(),
                    ImageState::UNDEFINED,
                    ImageState::resting(&spec),
                )
            })
            .collect();
        self.dependency(&barriers, &[]);
    }

    fn pipeline_barriers(&mut self, images: &[ImageBarrier], buffers: &[BufferBarrier]) {
        let image_barriers: SmallVec<[_; 8]> = images
            .iter()
            .map(|barrier| {
                let (image, _, spec) = self.device.image(barrier.image);
                let layout = spec.resting_layout();
                let old = ImageState {
                    layout,
                    stage: barrier.src_stage,
                    access: stage_access(barrier.src_stage, true),
                };
                let new = ImageState {
                    layout,
                    stage: barrier.dst_stage,
                    access: stage_access(barrier.dst_stage, false)
                        | stage_access(barrier.dst_stage, true),
                };
                image_barrier(image, spec.subresource_range(), old, new)
            })
            .collect();

        let buffer_barriers: SmallVec<[_; 8]> = buffers
            .iter()
            .map(|barrier| {
                whole_buffer_barrier(
                    self.device.buffer(barrier.buffer),
                    barrier.src_stage,
                    stage_access(barrier.src_stage, true),
                    barrier.dst_stage,
                    stage_access(barrier.dst_stage, false) | stage_access(barrier.dst_stage, true),
                )
            })
            .collect();

        self.dependency(&image_barriers, &buffer_barriers);
    }

    fn copy_image(&mut self, src: ImageKey, dst: ImageKey) {
        let (src_image, _, src_spec) = self.device.image(src);
        let (dst_image, _, dst_spec) = self.device.image(dst);

        let (src_range, dst_range) = (src_spec.subresource_range(), dst_spec.subresource_range());
        let (src_resting, dst_resting) =
            (ImageState::resting(&src_spec), ImageState::resting(&dst_spec));

        self.dependency(
            &[
                image_barrier(src_image, src_range, src_resting, ImageState::TRANSFER_SRC),
                image_barrier(dst_image, dst_range, dst_resting, ImageState::TRANSFER_DST),
            ],
            &[],
        );

        let regions: SmallVec<[vk::ImageCopy; 4]> = (0..src_spec.mips.min(dst_spec.mips))
            .map(|mip| {
                let src_layers = vk::ImageSubresourceLayers {
                    aspect_mask: src_spec.aspect(),
                    mip_level: mip,
                    base_array_layer: 0,
                    layer_count: 1,
                };
                vk::ImageCopy {
                    src_subresource: src_layers,
                    src_offset: vk::Offset3D::default(),
                    dst_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: dst_spec.aspect(),
                        ..src_layers
                    },
                    dst_offset: vk::Offset3D::default(),
                    extent: mip_extent(src_spec.extent, mip),
                }
            })
            .collect();

        unsafe {
            self.vk().cmd_copy_image(
                self.cmd,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            );
        }

        self.dependency(
            &[
                image_barrier(src_image, src_range, ImageState::TRANSFER_SRC, src_resting),
                image_barrier(dst_image, dst_range, ImageState::TRANSFER_DST, dst_resting),
            ],
            &[],
        );
    }

    fn copy_buffer(&mut self, src: BufferKey, dst: BufferKey, size: u64) {
        let (src_buffer, dst_buffer) = (self.device.buffer(src), self.device.buffer(dst));
        let any = (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        );
        let copy = vk::PipelineStageFlags2::COPY;

        self.dependency(
            &[],
            &[
                whole_buffer_barrier(src_buffer, any.0, any.1, copy, vk::AccessFlags2::TRANSFER_READ),
                whole_buffer_barrier(dst_buffer, any.0, any.1, copy, vk::AccessFlags2::TRANSFER_WRITE),
            ],
        );

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.vk()
                .cmd_copy_buffer(self.cmd, src_buffer, dst_buffer, std::slice::from_ref(&region));
        }

        self.dependency(
            &[],
            &[whole_buffer_barrier(dst_buffer, copy, vk::AccessFlags2::TRANSFER_WRITE, any.0, any.1)],
        );
    }

    fn clear_image(&mut self, image: ImageKey) {
        let (vk_image, _, spec) = self.device.image(image);
        let range = spec.subresource_range();
        let resting = ImageState::resting(&spec);

        // Previous contents are discarded anyway.
        let undefined = ImageState {
            layout: vk::ImageLayout::UNDEFINED,
            ..resting
        };
        self.dependency(&[image_barrier(vk_image, range, undefined, ImageState::TRANSFER_DST)], &[]);

        unsafe {
            if is_depth_format(spec.format) {
                let value = vk::ClearDepthStencilValue {
                    depth: CLEAR_DEPTH,
                    stencil: 0,
                };
                self.vk().cmd_clear_depth_stencil_image(
                    self.cmd,
                    vk_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &value,
                    std::slice::from_ref(&range),
                );
            } else {
                let value = vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                };
                self.vk().cmd_clear_color_image(
                    self.cmd,
                    vk_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &value,
                    std::slice::from_ref(&range),
                );
            }
        }

        self.dependency(&[image_barrier(vk_image, range, ImageState::TRANSFER_DST, resting)], &[]);
    }

    fn clear_buffer(&mut self, buffer: BufferKey, size: u64) {
        let vk_buffer = self.device.buffer(buffer);
        let any = (
            vk::PipelineStageFlags2::ALL_COMMANDS,
            vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
        );
        let clear = vk::PipelineStageFlags2::CLEAR;

        self.dependency(
            &[],
            &[whole_buffer_barrier(vk_buffer, any.0, any.1, clear, vk::AccessFlags2::TRANSFER_WRITE)],
        );
        // Fill sizes must be a multiple of four.
        let fill_size = if size % 4 == 0 { size } else { vk::WHOLE_SIZE };
        log::trace!("clearing {size} bytes of {buffer:?}");
        unsafe {
            self.vk().cmd_fill_buffer(self.cmd, vk_buffer, 0, fill_size, 0);
        }
        self.dependency(
            &[],
            &[whole_buffer_barrier(vk_buffer, clear, vk::AccessFlags2::TRANSFER_WRITE, any.0, any.1)],
        );
    }

    fn begin_rendering(&mut self, framebuffer: &Framebuffer) {
        if let Some(active) = self.rendering.take() {
            log::warn!("begin_rendering while rendering, closing previous pass");
            unsafe { self.vk().cmd_end_rendering(self.cmd) };
            self.attachment_barriers(&active, false);
        }

        self.attachment_barriers(framebuffer, true);

        let colors: SmallVec<[_; 4]> = framebuffer
            .colors
            .iter()
            .map(|attachment| self.rendering_attachment(attachment))
            .collect();
        let depth = framebuffer
            .depth
            .as_ref()
            .map(|attachment| self.rendering_attachment(attachment));

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: framebuffer.extent,
            })
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe { self.vk().cmd_begin_rendering(self.cmd, &rendering_info) };
        self.rendering = Some(framebuffer.clone());
    }

    fn end_rendering(&mut self) {
        let Some(framebuffer) = self.rendering.take() else {
            log::warn!("end_rendering without begin_rendering");
            return;
        };
        unsafe { self.vk().cmd_end_rendering(self.cmd) };
        self.attachment_barriers(&framebuffer, false);
    }

    fn begin_label(&mut self, name: &str) {
        self.device.context().device_context.begin_label(self.cmd, name);
    }

    fn end_label(&mut self) {
        self.device.context().device_context.end_label(self.cmd);
    }

    fn insert_label(&mut self, name: &str) {
        self.device.context().device_context.insert_label(self.cmd, name);
    }
}
