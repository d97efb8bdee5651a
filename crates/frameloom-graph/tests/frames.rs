mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use frameloom::{DeviceError, PresentResult, ResourceUsage};
use frameloom_graph::{FrameError, NodeDesc, PresentNodeDesc, RenderGraph, SlotState};
use frameloom_headless::{Event, HeadlessDevice, HeadlessSwapchain};

///Shadow -> Opaque -> present over one shadow map.
fn shadow_opaque(device: &HeadlessDevice, num_frames: u32) -> (RenderGraph, Arc<HeadlessSwapchain>) {
    let mut graph = common::graph(device, num_frames);
    let shadow_map = device.create_texture(Some("ShadowMap"));
    let swapchain = device.create_swapchain(3);
    graph
        .add_node(
            NodeDesc::new("Shadow", |_, cmd| {
                cmd.draw(3, 1);
                Ok(())
            })
            .uses_texture(shadow_map.clone(), ResourceUsage::DepthWrite),
        )
        .add_node(
            NodeDesc::new("Opaque", |_, cmd| {
                cmd.draw(36, 1);
                Ok(())
            })
            .depends_on("Shadow")
            .uses_texture(shadow_map, ResourceUsage::ShaderResource),
        )
        .set_present_node(PresentNodeDesc::new(swapchain.clone()).depends_on("Opaque"));
    graph.build_graph().unwrap();
    (graph, swapchain)
}

#[test]
fn opaque_waits_on_shadow() {
    let device = common::device();
    let (mut graph, _swapchain) = shadow_opaque(&device, 2);
    assert_eq!(graph.update().unwrap(), PresentResult::Success);

    let journal = device.journal();
    let shadow = journal.executions_of("Shadow");
    let opaque = journal.executions_of("Opaque");
    assert_eq!(shadow.len(), 1);
    assert_eq!(opaque.len(), 1);
    assert!(!shadow[0].signal.is_empty());
    for sem in shadow[0].signal.iter() {
        assert!(opaque[0].wait.contains(sem));
    }
    assert!(shadow[0].fence.is_none());
    assert!(opaque[0].fence.is_none());

    //recording of Opaque only starts after Shadow finished
    let shadow_end = journal
        .position(|e| matches!(e, Event::End { label, .. } if label == "Shadow"))
        .unwrap();
    let opaque_begin = journal
        .position(|e| matches!(e, Event::Begin { label, .. } if label == "Opaque"))
        .unwrap();
    assert!(shadow_end < opaque_begin);

    let labels: Vec<String> = journal.executions().into_iter().map(|e| e.label).collect();
    assert_eq!(labels, vec!["Shadow", "Opaque", "present"]);
}

#[test]
fn present_is_fenced_and_waits_for_the_image() {
    let device = common::device();
    let (mut graph, _swapchain) = shadow_opaque(&device, 2);
    graph.update().unwrap();

    let journal = device.journal();
    let acquired = journal
        .events()
        .into_iter()
        .find_map(|e| match e {
            Event::Acquire { semaphore, image } => Some((semaphore, image)),
            _ => None,
        })
        .unwrap();
    let opaque = journal.executions_of("Opaque").remove(0);
    let present = journal.executions_of("present").remove(0);

    assert!(present.wait.contains(&acquired.0));
    assert!(opaque.signal.iter().all(|s| present.wait.contains(s)));
    assert!(present.fence.is_some());
    assert_eq!(present.signal.len(), 1);

    let presents = journal.presents();
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0].0, present.signal);
    assert_eq!(presents[0].1, acquired.1);

    //render target transitions around the present callback
    let barriers = journal.barriers_of("present");
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].new_state, ResourceUsage::RenderTarget);
    assert_eq!(barriers[1].old_state, ResourceUsage::RenderTarget);
    assert_eq!(barriers[1].new_state, ResourceUsage::Present);
}

#[test]
fn fence_waits_equal_frames_minus_slots() {
    let device = common::device();
    let (mut graph, _swapchain) = shadow_opaque(&device, 3);

    for frame in 0..7u64 {
        assert_eq!(graph.current_slot(), (frame % 3) as u32);
        graph.update().unwrap();
    }
    assert_eq!(graph.frame_count(), 7);
    assert_eq!(device.fence_wait_count(), 4);
    assert_eq!(device.journal().presents().len(), 7);

    graph.wait_idle().unwrap();
    for slot in 0..3 {
        assert_eq!(graph.slot_state(slot), Some(SlotState::Idle));
    }
}

#[test]
fn slot_is_only_reused_after_its_fence_signaled() {
    let device = common::deferred_device();
    let (mut graph, _swapchain) = shadow_opaque(&device, 2);

    graph.update().unwrap();
    graph.update().unwrap();
    assert_eq!(device.fence_wait_count(), 0);
    assert_eq!(graph.slot_state(0), Some(SlotState::Submitted));
    assert_eq!(graph.slot_state(1), Some(SlotState::Submitted));

    //the "GPU" finishes both frames, revisiting slot 0 waits on an already signaled fence
    assert_eq!(device.retire_submissions(), 2);
    graph.update().unwrap();
    assert_eq!(device.fence_wait_count(), 1);

    device.retire_submissions();
    graph.wait_idle().unwrap();
    assert_eq!(device.fence_wait_count(), 3);
}

#[test]
fn failing_node_aborts_the_whole_frame() {
    let device = common::device();
    let mut graph = common::graph(&device, 2);
    let gbuffer = device.create_texture(Some("GBuffer"));
    let hdr = device.create_texture(Some("Hdr"));
    let fail = Arc::new(AtomicBool::new(false));

    let should_fail = fail.clone();
    graph
        .add_node(
            NodeDesc::new("Geometry", |_, _| Ok(()))
                .uses_texture(gbuffer.clone(), ResourceUsage::RenderTarget),
        )
        .add_node(
            NodeDesc::new("Lighting", move |_, _| {
                if should_fail.load(Ordering::SeqCst) {
                    anyhow::bail!("lighting pipeline is missing");
                }
                Ok(())
            })
            .depends_on("Geometry")
            .uses_texture(hdr.clone(), ResourceUsage::RenderTarget),
        )
        .set_present_node(
            PresentNodeDesc::new(device.create_swapchain(2))
                .depends_on("Lighting")
                .uses_texture(gbuffer.clone(), ResourceUsage::ShaderResource),
        );
    graph.build_graph().unwrap();

    graph.update().unwrap();
    let gbuffer_before = graph.registry().current_state(&gbuffer);
    let hdr_before = graph.registry().current_state(&hdr);
    assert_eq!(gbuffer_before.state, ResourceUsage::ShaderResource);

    fail.store(true, Ordering::SeqCst);
    device.journal().clear();
    match graph.update() {
        Err(FrameError::NodeFailed { node, .. }) => assert_eq!(node, "Lighting"),
        other => panic!("unexpected frame result {:?}", other),
    }

    let journal = device.journal();
    assert_eq!(journal.count(|e| matches!(e, Event::Execute(_))), 0);
    assert_eq!(journal.count(|e| matches!(e, Event::Acquire { .. })), 0);
    assert!(journal.presents().is_empty());
    assert_eq!(graph.registry().current_state(&gbuffer), gbuffer_before);
    assert_eq!(graph.registry().current_state(&hdr), hdr_before);
    assert_eq!(graph.slot_state(1), Some(SlotState::Idle));

    fail.store(false, Ordering::SeqCst);
    graph.update().unwrap();
    //the aborted slot submitted nothing, so revisiting it does not wait
    graph.update().unwrap();
    assert_eq!(device.fence_wait_count(), 1);
}

#[test]
fn failing_present_callback_hands_the_image_back() {
    let device = common::device();
    let mut graph = common::graph(&device, 2);
    let color = device.create_texture(Some("Color"));
    let fail = Arc::new(AtomicBool::new(false));

    let should_fail = fail.clone();
    graph
        .add_node(
            NodeDesc::new("Opaque", |_, cmd| {
                cmd.draw(36, 1);
                Ok(())
            })
            .uses_texture(color.clone(), ResourceUsage::RenderTarget),
        )
        .set_present_node(
            PresentNodeDesc::new(device.create_swapchain(2))
                .depends_on("Opaque")
                .uses_texture(color.clone(), ResourceUsage::ShaderResource)
                .with_callback(move |_, _, _| {
                    if should_fail.load(Ordering::SeqCst) {
                        anyhow::bail!("blit pipeline is missing");
                    }
                    Ok(())
                }),
        );
    graph.build_graph().unwrap();
    graph.update().unwrap();
    let color_before = graph.registry().current_state(&color);

    fail.store(true, Ordering::SeqCst);
    device.journal().clear();
    match graph.update() {
        Err(FrameError::NodeFailed { node, .. }) => assert_eq!(node, "present"),
        other => panic!("unexpected frame result {:?}", other),
    }

    let journal = device.journal();
    let acquired = journal
        .events()
        .into_iter()
        .find_map(|e| match e {
            Event::Acquire { semaphore, image } => Some((semaphore, image)),
            _ => None,
        })
        .unwrap();

    //only the release reaches the queue: it consumes the acquire semaphore and retires the slot
    let executions = journal.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].label, "present");
    assert_eq!(executions[0].wait, vec![acquired.0]);
    assert_eq!(executions[0].signal.len(), 1);
    assert!(executions[0].fence.is_some());

    let presents = journal.presents();
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0].0, executions[0].signal);
    assert_eq!(presents[0].1, acquired.1);
    let last = journal.barriers_of("present").pop().unwrap();
    assert_eq!(last.old_state, ResourceUsage::RenderTarget);
    assert_eq!(last.new_state, ResourceUsage::Present);

    assert_eq!(graph.registry().current_state(&color), color_before);
    assert_eq!(graph.slot_state(1), Some(SlotState::Submitted));

    fail.store(false, Ordering::SeqCst);
    graph.update().unwrap();
    //revisiting the aborted slot waits on the fence of its release
    graph.update().unwrap();
    assert_eq!(device.fence_wait_count(), 2);
}

#[test]
fn out_of_date_present_is_surfaced() {
    let device = common::device();
    let (mut graph, swapchain) = shadow_opaque(&device, 2);
    graph.update().unwrap();

    swapchain.fail_next_present(DeviceError::OutOfDate);
    assert!(matches!(
        graph.update(),
        Err(FrameError::Device(DeviceError::OutOfDate))
    ));
    graph.update().unwrap();
}

#[test]
fn device_loss_is_surfaced() {
    let device = common::device();
    let (mut graph, _swapchain) = shadow_opaque(&device, 1);
    graph.update().unwrap();

    device.lose_device();
    assert!(matches!(
        graph.update(),
        Err(FrameError::Device(DeviceError::DeviceLost))
    ));
    assert_eq!(device.journal().presents().len(), 1);
}

#[test]
fn independent_nodes_record_concurrently() {
    let device = common::device();
    let mut graph = RenderGraph::new(
        common::desc(&device)
            .with_num_frames(1)
            .with_worker_threads(4),
    )
    .unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let names = ["Cascade0", "Cascade1", "Cascade2", "Cascade3"];
    for name in names {
        let active = active.clone();
        let peak = peak.clone();
        graph.add_node(NodeDesc::new(name, move |_, _| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }));
    }
    graph.set_present_node(PresentNodeDesc::new(device.create_swapchain(2)).with_dependencies(names));
    graph.build_graph().unwrap();
    graph.update().unwrap();

    assert!(peak.load(Ordering::SeqCst) >= 2);
    assert_eq!(device.journal().executions().len(), 5);
}

#[test]
fn frame_index_is_the_slot() {
    let device = common::device();
    let mut graph = common::graph(&device, 3);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = seen.clone();
    graph
        .add_node(NodeDesc::new("Upload", move |frame, _| {
            record.lock().push(frame);
            Ok(())
        }))
        .set_present_node(PresentNodeDesc::new(device.create_swapchain(2)).depends_on("Upload"));
    graph.build_graph().unwrap();

    for _ in 0..5 {
        graph.update().unwrap();
    }
    assert_eq!(*seen.lock(), vec![0, 1, 2, 0, 1]);
}
