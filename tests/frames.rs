use std::sync::Arc;

use ash::vk;

use framegraph::{
    device::null::{NullDevice, RecordedCommand, RecordingCommands},
    framegraph::{
        FrameGraph, FrameGraphSettings, GraphError, PersistentId, PoolSettings, ResourcePool,
    },
    image::ImageKey,
};

const SIZE: vk::Extent2D = vk::Extent2D {
    width: 256,
    height: 256,
};

const HISTORY: PersistentId = PersistentId(7);

fn setup(retention: u64) -> (Arc<NullDevice>, Arc<ResourcePool>) {
    let device = Arc::new(NullDevice::new());
    let pool = Arc::new(ResourcePool::with_settings(
        device.clone(),
        PoolSettings::default().retention_frames(retention),
    ));
    (device, pool)
}

fn prepared_images(recorder: &RecordingCommands) -> Vec<ImageKey> {
    recorder
        .commands()
        .iter()
        .flat_map(|c| match c {
            RecordedCommand::PrepareImages(images) => images.clone(),
            _ => Vec::new(),
        })
        .collect()
}

fn render(graph: FrameGraph) -> RecordingCommands {
    let mut recorder = RecordingCommands::new();
    graph.render(&mut recorder).unwrap();
    recorder
}

/// A compute pass accumulating into a history image carried between frames.
fn accumulate_frame(pool: &Arc<ResourcePool>) -> (FrameGraph, bool) {
    let mut graph = FrameGraph::new(pool.clone());
    let had_history = {
        let mut builder = graph.add_compute_pass("accumulate");
        let history = builder
            .declare_image(vk::Format::R16G16B16A16_SFLOAT, SIZE)
            .unwrap();
        let prev = builder
            .make_persistent_and_get_prev_image(history, HISTORY)
            .unwrap();
        if let Some(prev) = prev {
            builder.add_storage_input(prev).unwrap();
        }
        builder.add_storage_output(history).unwrap();
        prev.is_some()
    };
    (graph, had_history)
}

fn storage_frame(pool: &Arc<ResourcePool>) -> FrameGraph {
    let mut graph = FrameGraph::new(pool.clone());
    {
        let mut builder = graph.add_compute_pass("write");
        let image = builder
            .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
            .unwrap();
        builder.add_storage_output(image).unwrap();
    }
    graph
}

#[test]
fn test_history_is_carried_between_frames() {
    let (device, pool) = setup(6);

    let (graph, had_history) = accumulate_frame(&pool);
    assert!(!had_history);
    let first = prepared_images(&render(graph));
    assert_eq!(first.len(), 1);
    assert_eq!(pool.persistent_count(), 1);

    let (graph, had_history) = accumulate_frame(&pool);
    assert!(had_history);
    let recorder = render(graph);

    let second = prepared_images(&recorder);
    assert_eq!(second.len(), 1);
    assert_ne!(second[0], first[0]);

    // The carried image was last written by last frame's compute pass.
    let barriers: Vec<_> = recorder.image_barriers().copied().collect();
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].image, first[0]);
    assert_eq!(barriers[0].src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
    assert_eq!(barriers[0].dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);

    assert_eq!(pool.persistent_count(), 1);
    assert_eq!(pool.idle_images(), 1);

    // Ping-pong: the old history becomes the new target.
    let (graph, _) = accumulate_frame(&pool);
    render(graph);
    assert_eq!(device.images_created(), 2);
}

#[test]
fn test_history_with_new_shape_starts_over() {
    let (_device, pool) = setup(6);
    let (graph, _) = accumulate_frame(&pool);
    render(graph);

    let mut graph = FrameGraph::new(pool.clone());
    {
        let mut builder = graph.add_compute_pass("accumulate");
        let history = builder
            .declare_image(
                vk::Format::R16G16B16A16_SFLOAT,
                vk::Extent2D {
                    width: 512,
                    height: 512,
                },
            )
            .unwrap();
        let prev = builder
            .make_persistent_and_get_prev_image(history, HISTORY)
            .unwrap();
        assert!(prev.is_none());
        builder.add_storage_output(history).unwrap();
    }
    assert_eq!(pool.idle_images(), 1);
    render(graph);
    assert_eq!(pool.persistent_count(), 1);
}

#[test]
fn test_unrendered_history_goes_back_to_pool() {
    let (_device, pool) = setup(6);
    let (graph, _) = accumulate_frame(&pool);
    render(graph);

    let (graph, had_history) = accumulate_frame(&pool);
    assert!(had_history);
    drop(graph);

    assert_eq!(pool.persistent_count(), 0);
    assert_eq!(pool.idle_images(), 1);
}

#[test]
fn test_persistent_buffer_keeps_contents() {
    let (device, pool) = setup(6);
    let data = [3.0f32, 5.0, 7.0, 11.0];

    let mut graph = FrameGraph::new(pool.clone());
    {
        let mut builder = graph.add_pass("upload");
        let buffer = builder.declare_buffer_for::<f32>(data.len()).unwrap();
        builder.map_buffer_with(buffer, &data).unwrap();
        builder.add_uniform_input(buffer).unwrap();
        assert!(
            builder
                .make_persistent_and_get_prev_buffer(buffer, HISTORY)
                .unwrap()
                .is_none()
        );
    }
    render(graph);

    let mut graph = FrameGraph::new(pool.clone());
    {
        let mut builder = graph.add_compute_pass("reuse");
        let buffer = builder.declare_buffer_for::<f32>(data.len()).unwrap();
        let prev = builder
            .make_persistent_and_get_prev_buffer(buffer, HISTORY)
            .unwrap()
            .expect("buffer carried over");
        builder.add_uniform_input(prev).unwrap();
        builder.add_storage_output(buffer).unwrap();
        let device = device.clone();
        builder
            .set_compute_func(move |_, ctx| {
                let carried = ctx.resources.buffer(prev)?;
                assert_eq!(carried.size, 16);
                assert_eq!(
                    device.buffer_contents(carried.key).unwrap(),
                    bytemuck::cast_slice::<f32, u8>(&data)
                );
                Ok(())
            })
            .unwrap();
    }
    render(graph);
}

#[test]
fn test_idle_image_survives_retention_window() {
    let (device, pool) = setup(3);
    render(storage_frame(&pool));
    render(FrameGraph::new(pool.clone()));
    render(storage_frame(&pool));

    assert_eq!(device.images_created(), 1);
}

#[test]
fn test_idle_image_evicted_after_retention_window() {
    let (device, pool) = setup(3);
    render(storage_frame(&pool));
    for _ in 0..3 {
        render(FrameGraph::new(pool.clone()));
    }
    assert_eq!(device.live_images(), 0);
    assert_eq!(pool.idle_images(), 0);

    render(storage_frame(&pool));
    assert_eq!(device.images_created(), 2);
}

#[test]
fn test_inexact_buffers_reuse_larger_idle_buffer() {
    let (device, pool) = setup(6);
    let settings = FrameGraphSettings::default().inexact_buffers(true);

    let storage = |size: u64| {
        let mut graph = FrameGraph::with_settings(pool.clone(), settings);
        {
            let mut builder = graph.add_compute_pass("scatter");
            let buffer = builder.declare_buffer(size).unwrap();
            builder.add_storage_output(buffer).unwrap();
            builder
                .set_compute_func(move |_, ctx| {
                    assert_eq!(ctx.resources.buffer(buffer)?.size, size);
                    Ok(())
                })
                .unwrap();
        }
        graph
    };

    render(storage(100));
    render(storage(80));
    assert_eq!(device.buffers_created(), 1);

    render(storage(30));
    assert_eq!(device.buffers_created(), 2);
}

#[test]
fn test_same_graph_records_same_commands() {
    fn build(pool: &Arc<ResourcePool>) -> FrameGraph {
        let mut graph = FrameGraph::new(pool.clone());
        let (color, params) = {
            let mut builder = graph.add_pass("gbuffer");
            let params = builder.declare_buffer(64).unwrap();
            builder.map_buffer_with(params, &[0u8; 64]).unwrap();
            builder.add_uniform_input(params).unwrap();
            let color = builder
                .declare_image(vk::Format::R16G16B16A16_SFLOAT, SIZE)
                .unwrap();
            let depth = builder.declare_image(vk::Format::D32_SFLOAT, SIZE).unwrap();
            builder.add_color_output(color).unwrap();
            builder.add_depth_output(depth).unwrap();
            (color, params)
        };
        let copy = graph.add_pass("copy").declare_copy(color).unwrap();
        {
            let mut builder = graph.add_compute_pass("lighting");
            let lit = builder
                .declare_image(vk::Format::R16G16B16A16_SFLOAT, SIZE)
                .unwrap();
            builder.add_uniform_input(copy).unwrap();
            builder.add_uniform_input(params).unwrap();
            builder.add_storage_output(lit).unwrap();
        }
        graph
    }

    let (_, first_pool) = setup(6);
    let (_, second_pool) = setup(6);
    let first = render(build(&first_pool));
    let second = render(build(&second_pool));

    assert_eq!(first.commands(), second.commands());
    assert_eq!(first.copies(), 0);
}

#[test]
fn test_regions_wrap_their_passes() {
    let (_device, pool) = setup(6);
    let mut graph = FrameGraph::new(pool);

    let outer = graph.begin_region("outer");
    graph.add_compute_pass("a");
    let inner = graph.begin_region("inner");
    graph.add_compute_pass("b");
    graph.end_region(inner).unwrap();
    graph.end_region(outer).unwrap();
    graph.add_compute_pass("c");

    let recorder = render(graph);
    let labels: Vec<_> = recorder
        .commands()
        .iter()
        .filter(|c| {
            matches!(
                c,
                RecordedCommand::BeginLabel(_) | RecordedCommand::EndLabel | RecordedCommand::Label(_)
            )
        })
        .cloned()
        .collect();

    assert_eq!(
        labels,
        vec![
            RecordedCommand::BeginLabel("outer".into()),
            RecordedCommand::Label("a".into()),
            RecordedCommand::BeginLabel("inner".into()),
            RecordedCommand::Label("b".into()),
            RecordedCommand::EndLabel,
            RecordedCommand::EndLabel,
            RecordedCommand::Label("c".into()),
        ]
    );
}

#[test]
fn test_unused_image_gets_default_usage() {
    let (device, pool) = setup(6);
    let mut graph = FrameGraph::new(pool);
    graph
        .add_pass("idle")
        .declare_image(vk::Format::R8G8B8A8_UNORM, SIZE)
        .unwrap();

    let images = prepared_images(&render(graph));
    assert_eq!(images.len(), 1);
    let spec = device.image_spec(images[0]).unwrap();
    assert!(spec.usage.contains(vk::ImageUsageFlags::SAMPLED));
}

#[test]
fn test_pool_drop_destroys_everything() {
    let (device, pool) = setup(6);
    let (graph, _) = accumulate_frame(&pool);
    render(graph);
    render(storage_frame(&pool));
    assert!(device.live_images() > 0);

    drop(pool);
    assert_eq!(device.live_images(), 0);
    assert_eq!(device.live_buffers(), 0);
}

/// A history image written by compute, then sampled by the next frame.
fn sampled_history_frame(pool: &Arc<ResourcePool>, sampled_usage: bool) -> FrameGraph {
    let mut graph = FrameGraph::new(pool.clone());
    {
        let mut builder = graph.add_compute_pass("resolve");
        let history = builder
            .declare_image(vk::Format::R16G16B16A16_SFLOAT, SIZE)
            .unwrap();
        if sampled_usage {
            builder
                .add_input_usage(history, vk::ImageUsageFlags::SAMPLED)
                .unwrap();
        }
        if let Some(prev) = builder
            .make_persistent_and_get_prev_image(history, HISTORY)
            .unwrap()
        {
            builder.add_uniform_input(prev).unwrap();
        }
        builder.add_storage_output(history).unwrap();
    }
    graph
}

#[test]
fn test_carried_image_missing_usage_is_rejected() {
    let (_device, pool) = setup(6);
    render(sampled_history_frame(&pool, false));

    let mut recorder = RecordingCommands::new();
    let err = sampled_history_frame(&pool, false)
        .render(&mut recorder)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GraphError>(),
        Some(GraphError::CarriedImageUsage { missing, .. })
            if *missing == vk::ImageUsageFlags::SAMPLED
    ));
    assert!(recorder.commands().is_empty());

    // The rejected history is recycled rather than kept.
    assert_eq!(pool.persistent_count(), 0);
    assert_eq!(pool.idle_images(), 1);
}

#[test]
fn test_carried_image_with_declared_usage_is_accepted() {
    let (_device, pool) = setup(6);
    render(sampled_history_frame(&pool, true));
    render(sampled_history_frame(&pool, true));
    assert_eq!(pool.persistent_count(), 1);
}
