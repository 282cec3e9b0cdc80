use std::sync::Arc;

use anyhow::Context;
use ash::vk;

use framegraph::{
    framegraph::{Binding, FrameGraph, PersistentId, ResourcePool, SamplerType},
    vulkan::{Frame, VulkanContext, VulkanDevice, VulkanRecorder},
};

const FRAME_COUNT: u32 = 8;

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
};

const TAA_HISTORY: PersistentId = PersistentId(1);

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraData {
    view_proj: [[f32; 4]; 4],
    jitter: [f32; 2],
    frame: u32,
    _padding: u32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TaaSettings {
    flags: u32,
    weighting_mode: u32,
    blending_factor: f32,
}

fn main() -> anyhow::Result<()> {
    log4rs::init_file("log4rs.yml", Default::default())
        .context("failed to load logging config file")?;

    #[cfg(feature = "tracing")]
    init_tracing()?;

    let result = run();
    if let Err(e) = &result {
        log::error!("{:?}", e);
    }
    result
}

#[cfg(feature = "tracing")]
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;

    tracy_client::Client::start();
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(tracing_tracy::TracyLayer::default()),
    )
    .context("failed to install tracing subscriber")
}

fn run() -> anyhow::Result<()> {
    let context = Arc::new(VulkanContext::new().context("failed to create Vulkan context")?);
    let device = Arc::new(VulkanDevice::new(context.clone())?);
    let pool = Arc::new(ResourcePool::new(device.clone()));

    let mut frame = Frame::new(context.device(), context.queue_family.graphics_index)?;
    let result = render_frames(&context, &device, &pool, &frame);
    if let Err(e) = frame.wait(context.device()) {
        log::warn!("{e:#}");
    }
    frame.destroy(context.device());

    drop(pool);
    log::debug!(
        "shutdown with {} images and {} buffers left to the device",
        device.live_images(),
        device.live_buffers()
    );
    result
}

fn render_frames(
    context: &VulkanContext,
    device: &VulkanDevice,
    pool: &Arc<ResourcePool>,
    frame: &Frame,
) -> anyhow::Result<()> {
    for index in 0..FRAME_COUNT {
        let graph = build_frame(pool, index).context("failed to build frame graph")?;

        let cmd = frame.begin(context.device())?;
        let mut recorder = VulkanRecorder::new(device, cmd);
        graph.render(&mut recorder)?;
        frame.submit(context)?;

        log::info!(
            "frame {index}: {} idle images, {} idle buffers, {} persistent",
            pool.idle_images(),
            pool.idle_buffers(),
            pool.persistent_count()
        );

        #[cfg(feature = "tracing")]
        tracy_client::frame_mark();
    }
    Ok(())
}

fn camera_data(frame: u32) -> CameraData {
    // Sub-pixel jitter cycling through a 4 sample pattern.
    const JITTER: [[f32; 2]; 4] = [[0.25, -0.25], [-0.25, 0.25], [0.375, 0.125], [-0.125, -0.375]];
    let mut view_proj = [[0.0; 4]; 4];
    for (i, row) in view_proj.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    CameraData {
        view_proj,
        jitter: JITTER[frame as usize % JITTER.len()],
        frame,
        _padding: 0,
    }
}

fn build_frame(pool: &Arc<ResourcePool>, index: u32) -> anyhow::Result<FrameGraph> {
    let mut graph = FrameGraph::new(pool.clone());

    let gbuffer_region = graph.begin_region("gbuffer");
    let (color, depth) = {
        let mut builder = graph.add_pass("gbuffer pass");

        let camera = builder.declare_buffer_for::<CameraData>(1)?;
        builder.map_buffer_with(camera, &[camera_data(index)])?;
        builder.add_uniform_input_with(
            camera,
            Binding::in_set(0).stage(vk::PipelineStageFlags2::VERTEX_SHADER),
        )?;

        let depth = builder.declare_image(vk::Format::D32_SFLOAT, EXTENT)?;
        let color = builder.declare_image(vk::Format::R16G16B16A16_SFLOAT, EXTENT)?;
        builder.add_depth_output(depth)?;
        builder.add_color_output(color)?;
        builder.set_render_func(|render_pass, ctx| {
            log::trace!(
                "{}: {} descriptor sets, framebuffer {:?}",
                ctx.name,
                ctx.descriptor_sets.len(),
                render_pass.framebuffer().map(|fb| fb.extent)
            );
            render_pass.insert_label("draw scene");
            Ok(())
        })?;
        (color, depth)
    };
    graph.end_region(gbuffer_region)?;

    let post_region = graph.begin_region("post");
    let anti_aliased = {
        let mut builder = graph.add_pass("TAA resolve pass");

        let format = builder.graph().image_format(color)?;
        let size = builder.graph().image_size(color)?;
        let aa = builder.declare_image(format, size)?;
        builder.add_input_usage(aa, vk::ImageUsageFlags::SAMPLED)?;

        let prev_color = match builder.make_persistent_and_get_prev_image(aa, TAA_HISTORY)? {
            Some(prev) => prev,
            None => builder.declare_copy(aa)?.into(),
        };

        let settings = TaaSettings {
            flags: 0x01,
            weighting_mode: 0,
            blending_factor: 0.9,
        };

        builder.add_color_output(aa)?;
        builder.add_uniform_input_with(depth, Binding::default().sampler(SamplerType::PointClamp))?;
        builder.add_uniform_input_with(color, Binding::default().sampler(SamplerType::PointClamp))?;
        builder.add_uniform_input(prev_color)?;
        builder.add_inline_input(&[settings], 0)?;
        builder.set_render_func(|render_pass, ctx| {
            log::trace!("{}: {:?}", ctx.name, ctx.descriptor_sets);
            render_pass.insert_label("fullscreen triangle");
            Ok(())
        })?;
        aa
    };

    {
        let mut builder = graph.add_compute_pass("tonemap pass");
        let output = builder.declare_image(vk::Format::R8G8B8A8_UNORM, EXTENT)?;
        builder.add_uniform_input(anti_aliased)?;
        builder.add_storage_output(output)?;
        builder.set_compute_func(|recorder, ctx| {
            recorder.insert_label(ctx.name);
            Ok(())
        })?;
    }
    graph.end_region(post_region)?;

    Ok(graph)
}
