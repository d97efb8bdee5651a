//! Runs a small shadow -> opaque -> present graph on the headless backend and prints what reached the "GPU".
//!
//! Usage: `frame_loop [frames]`, frames defaults to 6.

use std::sync::Arc;

use anyhow::Result;
use frameloom::{QueueType, ResourceUsage};
use frameloom_graph::{NodeDesc, PresentNodeDesc, RenderGraph, RenderGraphDesc};
use frameloom_headless::{Event, HeadlessDesc, HeadlessDevice};

///64 instances of one 4x4 float matrix.
const INSTANCE_BYTES: u64 = 64 * 64;

fn main() -> Result<(), anyhow::Error> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init()?;

    let frames: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 6,
    };

    let device = HeadlessDevice::new(HeadlessDesc::default());
    let swapchain = device.create_swapchain(3);
    let shadow_map = device.create_texture(Some("ShadowMap"));
    let color = device.create_texture(Some("Color"));
    let instances = device.create_buffer(Some("Instances"));
    let staging = device.create_buffer(Some("InstanceStaging"));

    let mut graph = RenderGraph::new(
        RenderGraphDesc::new(Arc::new(device.clone()))
            .with_num_frames(2)
            .with_worker_threads(2),
    )?;

    graph
        .add_node({
            let (src, dst) = (staging.clone(), instances.clone());
            NodeDesc::new("Upload", move |_, cmd| {
                cmd.copy_buffer_region(&src, 0, &dst, 0, INSTANCE_BYTES);
                Ok(())
            })
            .on_queue(QueueType::Copy)
            .uses_buffer(staging, ResourceUsage::CopySrc)
            .uses_buffer(instances.clone(), ResourceUsage::CopyDst)
        })
        .add_node(
            NodeDesc::new("Shadow", |_, cmd| {
                cmd.draw(3, 64);
                Ok(())
            })
            .uses_texture(shadow_map.clone(), ResourceUsage::DepthWrite),
        )
        .add_node(
            NodeDesc::new("Opaque", |_, cmd| {
                cmd.draw(36, 64);
                Ok(())
            })
            .with_dependencies(["Upload", "Shadow"])
            .uses_buffer(instances, ResourceUsage::VertexAndConstantBuffer)
            .uses_texture(shadow_map, ResourceUsage::ShaderResource)
            .uses_texture(color.clone(), ResourceUsage::RenderTarget),
        )
        .set_present_node(
            PresentNodeDesc::new(swapchain)
                .depends_on("Opaque")
                .uses_texture(color, ResourceUsage::ShaderResource)
                .with_callback(|_, cmd, _target| {
                    //fullscreen blit
                    cmd.draw(3, 1);
                    Ok(())
                }),
        );

    graph.build_graph()?;
    if let Some(dag) = graph.dag() {
        log::info!("Schedule:\n{}", dag);
    }

    for _ in 0..frames {
        let result = graph.update()?;
        log::debug!("Frame {}: {:?}", graph.frame_count(), result);
    }
    graph.wait_idle()?;

    let journal = device.journal();
    log::info!(
        "{} frame(s): {} submission(s), {} barrier call(s), {} present(s), {} fence wait(s)",
        frames,
        journal.executions().len(),
        journal.count(|e| matches!(e, Event::Barrier { .. })),
        journal.presents().len(),
        device.fence_wait_count()
    );
    for label in ["Upload", "Shadow", "Opaque", "present"] {
        log::info!(
            "{}: {} barrier(s) in {} call(s)",
            label,
            journal.barriers_of(label).len(),
            journal.barrier_calls_of(label)
        );
    }

    Ok(())
}
