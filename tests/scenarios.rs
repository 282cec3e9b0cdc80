use std::sync::Arc;

use ash::vk;

use framegraph::{
    device::null::{NullDevice, RecordedCommand, RecordingCommands},
    framegraph::{FrameGraph, FrameGraphSettings, GraphError, LoadOp, ResourcePool},
};

const SIZE: vk::Extent2D = vk::Extent2D {
    width: 512,
    height: 512,
};

fn setup() -> (Arc<NullDevice>, Arc<ResourcePool>) {
    let device = Arc::new(NullDevice::new());
    let pool = Arc::new(ResourcePool::new(device.clone()));
    (device, pool)
}

fn position(recorder: &RecordingCommands, f: impl Fn(&RecordedCommand) -> bool) -> usize {
    recorder
        .commands()
        .iter()
        .position(f)
        .expect("command not recorded")
}

fn graph_error(err: &anyhow::Error) -> Option<&GraphError> {
    err.downcast_ref::<GraphError>()
}

#[test]
fn test_color_output_then_sampled_read_needs_one_barrier() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    let image = {
        let mut builder = graph.add_pass("color");
        let image = builder
            .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
            .unwrap();
        builder.add_color_output(image).unwrap();
        image
    };
    graph.add_pass("sample").add_uniform_input(image).unwrap();

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    let barriers: Vec<_> = recorder.image_barriers().copied().collect();
    assert_eq!(barriers.len(), 1);
    assert_eq!(
        barriers[0].src_stage,
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
    );
    assert_eq!(barriers[0].dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);

    let end_rendering = position(&recorder, |c| matches!(c, RecordedCommand::EndRendering));
    let barrier = position(&recorder, |c| matches!(c, RecordedCommand::Barriers { .. }));
    assert!(end_rendering < barrier);
}

#[test]
fn test_mapped_buffer_is_visible_to_first_read_only() {
    let (device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    let data = [1u32, 2, 3, 4];

    let buffer = {
        let mut builder = graph.add_pass("upload");
        let buffer = builder.declare_buffer_for::<u32>(data.len()).unwrap();
        builder.map_buffer_with(buffer, &data).unwrap();
        buffer
    };
    graph.add_pass("read 1").add_uniform_input(buffer).unwrap();
    graph.add_pass("read 2").add_uniform_input(buffer).unwrap();

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    let barriers: Vec<_> = recorder.buffer_barriers().copied().collect();
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].src_stage, vk::PipelineStageFlags2::HOST);
    assert_eq!(barriers[0].dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);

    let first_read = recorder.label_position("read 1").unwrap();
    let second_read = recorder.label_position("read 2").unwrap();
    let barrier = position(&recorder, |c| matches!(c, RecordedCommand::Barriers { .. }));
    assert!(first_read < barrier && barrier < second_read);

    assert_eq!(
        device.buffer_contents(barriers[0].buffer).unwrap(),
        bytemuck::cast_slice::<u32, u8>(&data)
    );
    assert_eq!(device.flushes(), 1);
}

#[test]
fn test_copy_of_dead_source_is_elided() {
    let (device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    let (src, dst) = {
        let mut builder = graph.add_pass("producer");
        let src = builder
            .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
            .unwrap();
        builder.add_color_output(src).unwrap();
        let dst = builder.declare_copy(src).unwrap();
        (src, dst)
    };
    {
        let mut builder = graph.add_pass("consumer");
        builder.add_uniform_input(dst).unwrap();
        builder
            .set_render_func(move |_, ctx| {
                assert!(ctx.resources.are_aliased(src.into(), dst.into()));
                assert_eq!(ctx.resources.image(src)?.key, ctx.resources.image(dst)?.key);
                Ok(())
            })
            .unwrap();
    }

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    assert_eq!(recorder.copies(), 0);
    assert_eq!(device.images_created(), 1);
}

#[test]
fn test_copy_is_recorded_without_aliasing() {
    let (device, pool) = setup();
    let mut graph = FrameGraph::with_settings(pool, FrameGraphSettings::default().aliasing(false));

    let dst = {
        let mut builder = graph.add_pass("producer");
        let src = builder
            .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
            .unwrap();
        builder.add_color_output(src).unwrap();
        builder.declare_copy(src).unwrap()
    };
    graph.add_pass("consumer").add_uniform_input(dst).unwrap();

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    assert_eq!(recorder.copies(), 1);
    assert_eq!(device.images_created(), 2);
    let copy = position(&recorder, |c| matches!(c, RecordedCommand::CopyImage { .. }));
    assert!(copy < recorder.label_position("consumer").unwrap());
}

#[test]
fn test_copy_of_live_source_is_kept() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    let src = {
        let mut builder = graph.add_compute_pass("producer");
        let src = builder
            .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
            .unwrap();
        builder.add_storage_output(src).unwrap();
        src
    };
    let dst = graph.add_compute_pass("snapshot").declare_copy(src).unwrap();
    {
        let mut builder = graph.add_compute_pass("consumer");
        builder.add_storage_input(src).unwrap();
        builder.add_storage_input(dst).unwrap();
    }

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();
    assert_eq!(recorder.copies(), 1);
}

#[test]
fn test_second_clearing_color_output_is_rejected() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    let image = {
        let mut builder = graph.add_pass("first");
        let image = builder
            .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
            .unwrap();
        builder.add_color_output(image).unwrap();
        image
    };

    let mut builder = graph.add_pass("second");
    let err = builder.add_color_output(image).unwrap_err();
    assert!(matches!(
        graph_error(&err),
        Some(GraphError::AttachmentOverwrite { written_by: 0, .. })
    ));

    builder.add_color_output_with(image, LoadOp::Load).unwrap();
}

#[test]
fn test_attachment_rules() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    let mut builder = graph.add_compute_pass("compute");
    let image = builder
        .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
        .unwrap();
    let err = builder.add_color_output(image).unwrap_err();
    assert!(matches!(
        graph_error(&err),
        Some(GraphError::AttachmentOnComputePass { .. })
    ));
    drop(builder);

    let mut builder = graph.add_pass("graphics");
    let color = builder
        .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
        .unwrap();
    let small = builder
        .declare_image(
            vk::Format::D32_SFLOAT,
            vk::Extent2D {
                width: 256,
                height: 256,
            },
        )
        .unwrap();
    builder.add_color_output(color).unwrap();
    let err = builder.add_depth_output(small).unwrap_err();
    assert!(matches!(
        graph_error(&err),
        Some(GraphError::AttachmentSizeMismatch { .. })
    ));

    let err = builder.add_color_output(color).unwrap_err();
    assert!(matches!(
        graph_error(&err),
        Some(GraphError::DuplicateUsage { .. })
    ));
}

#[test]
fn test_graphics_pass_renders_into_its_attachments() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    {
        let mut builder = graph.add_pass("gbuffer");
        let depth = builder.declare_image(vk::Format::D32_SFLOAT, SIZE).unwrap();
        let color = builder
            .declare_image(vk::Format::R16G16B16A16_SFLOAT, SIZE)
            .unwrap();
        builder.add_depth_output(depth).unwrap();
        builder
            .add_color_output_with(color, LoadOp::DontCare)
            .unwrap();
        builder
            .set_render_func(|render_pass, _| {
                let framebuffer = render_pass.framebuffer().expect("attachments declared");
                assert_eq!(framebuffer.extent, SIZE);
                assert!(framebuffer.depth.is_some());
                assert_eq!(framebuffer.colors.len(), 1);
                assert_eq!(framebuffer.colors[0].load_op, LoadOp::DontCare);
                render_pass.insert_label("draw");
                Ok(())
            })
            .unwrap();
    }

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    let begin = position(&recorder, |c| matches!(c, RecordedCommand::BeginRendering(_)));
    let draw = recorder.label_position("draw").unwrap();
    let end = position(&recorder, |c| matches!(c, RecordedCommand::EndRendering));
    assert!(begin < draw && draw < end);
    assert_eq!(recorder.image_barriers().count(), 0);
}

#[test]
fn test_callback_kind_must_match_pass() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    let mut builder = graph.add_compute_pass("compute");
    let err = builder.set_render_func(|_, _| Ok(())).unwrap_err();
    assert!(matches!(
        graph_error(&err),
        Some(GraphError::CallbackKindMismatch { .. })
    ));
    builder.set_compute_func(|_, _| Ok(())).unwrap();
}

#[test]
fn test_callback_error_fails_render() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    graph
        .add_compute_pass("broken")
        .set_compute_func(|_, _| anyhow::bail!("pipeline missing"))
        .unwrap();

    let mut recorder = RecordingCommands::new();
    let err = graph.render(&mut recorder).unwrap_err();
    assert!(format!("{err:#}").contains("pipeline missing"));
}

#[test]
fn test_cleared_buffer_is_cleared_before_pass() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    {
        let mut builder = graph.add_compute_pass("histogram");
        let histogram = builder.declare_buffer(256 * 4).unwrap();
        builder.clear_before_pass(histogram).unwrap();
        builder.add_storage_output(histogram).unwrap();
    }

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    let clear = position(&recorder, |c| {
        matches!(c, RecordedCommand::ClearBuffer { size: 1024, .. })
    });
    assert!(recorder.label_position("histogram").unwrap() < clear);
}

#[test]
fn test_second_depth_attachment_is_rejected() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);

    let mut builder = graph.add_pass("shadows");
    let first = builder.declare_image(vk::Format::D32_SFLOAT, SIZE).unwrap();
    let second = builder.declare_image(vk::Format::D32_SFLOAT, SIZE).unwrap();
    builder.add_depth_output(first).unwrap();
    let err = builder.add_depth_output(second).unwrap_err();
    assert!(matches!(
        graph_error(&err),
        Some(GraphError::DuplicateDepthAttachment { .. })
    ));
}

#[test]
fn test_zero_sized_declarations_are_rejected() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    let mut builder = graph.add_compute_pass("empty");

    let err = builder
        .declare_image(
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent2D {
                width: 0,
                height: 16,
            },
        )
        .unwrap_err();
    assert_eq!(
        graph_error(&err),
        Some(&GraphError::ZeroSize { kind: "image" })
    );

    let err = builder
        .declare_volume(
            vk::Format::R16_SFLOAT,
            vk::Extent3D {
                width: 16,
                height: 16,
                depth: 0,
            },
        )
        .unwrap_err();
    assert_eq!(
        graph_error(&err),
        Some(&GraphError::ZeroSize { kind: "volume" })
    );

    let err = builder.declare_buffer(0).unwrap_err();
    assert_eq!(
        graph_error(&err),
        Some(&GraphError::ZeroSize { kind: "buffer" })
    );
}

#[test]
fn test_typed_buffer_size_overflow_is_rejected() {
    let (_device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    let mut builder = graph.add_compute_pass("huge");

    let err = builder
        .declare_buffer_for::<[u8; 16]>(usize::MAX / 8)
        .unwrap_err();
    assert_eq!(
        graph_error(&err),
        Some(&GraphError::BufferSizeOverflow {
            count: usize::MAX / 8,
            element_size: 16,
        })
    );

    let buffer = builder.declare_buffer_for::<[u8; 16]>(4).unwrap();
    assert_eq!(builder.graph().buffer_size(buffer).unwrap(), 64);
}

#[test]
fn test_handle_from_another_graph_is_invalid() {
    let (_device, pool) = setup();
    let mut other = FrameGraph::new(pool.clone());
    let foreign = other
        .add_compute_pass("other")
        .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
        .unwrap();

    let mut graph = FrameGraph::new(pool);
    let err = graph
        .add_compute_pass("reader")
        .add_storage_input(foreign)
        .unwrap_err();
    assert_eq!(
        graph_error(&err),
        Some(&GraphError::InvalidResource(foreign.into()))
    );
    assert!(graph.image_size(foreign).is_err());
}

#[test]
fn test_volume_copy_is_never_aliased() {
    let (device, pool) = setup();
    let mut graph = FrameGraph::new(pool);
    let extent = vk::Extent3D {
        width: 32,
        height: 32,
        depth: 32,
    };

    let volume = {
        let mut builder = graph.add_compute_pass("inject");
        let volume = builder
            .declare_volume(vk::Format::R16G16B16A16_SFLOAT, extent)
            .unwrap();
        builder.add_storage_output(volume).unwrap();
        volume
    };
    let copy = graph.add_compute_pass("snapshot").declare_copy(volume).unwrap();
    {
        let mut builder = graph.add_compute_pass("integrate");
        builder.add_storage_input(copy).unwrap();
        builder
            .set_compute_func(move |_, ctx| {
                assert!(!ctx.resources.are_aliased(volume.into(), copy.into()));
                assert_eq!(ctx.resources.volume(copy)?.spec.extent, extent);
                Ok(())
            })
            .unwrap();
    }

    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();

    assert_eq!(recorder.copies(), 1);
    assert_eq!(device.images_created(), 2);
}
