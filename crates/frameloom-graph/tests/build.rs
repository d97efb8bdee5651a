mod common;

use std::sync::Arc;

use frameloom::{QueueType, ResourceUsage, Swapchain};
use frameloom_graph::{BuildError, FrameError, NodeDesc, PresentNodeDesc, RenderGraph};
use frameloom_headless::HeadlessDevice;

fn noop(name: &str) -> NodeDesc {
    NodeDesc::new(name, |_, _| Ok(()))
}

///Diamond feeding a post chain.
fn describe(graph: &mut RenderGraph, device: &HeadlessDevice, swapchain: Arc<dyn Swapchain>) {
    let depth = device.create_texture(Some("Depth"));
    let hdr = device.create_texture(Some("Hdr"));
    graph
        .add_node(noop("DepthPrepass").uses_texture(depth.clone(), ResourceUsage::DepthWrite))
        .add_node(
            noop("Opaque")
                .depends_on("DepthPrepass")
                .uses_texture(depth.clone(), ResourceUsage::DepthRead)
                .uses_texture(hdr.clone(), ResourceUsage::RenderTarget),
        )
        .add_node(
            noop("Ssao")
                .on_queue(QueueType::Compute)
                .depends_on("DepthPrepass")
                .uses_texture(depth, ResourceUsage::DepthRead),
        )
        .add_node(
            noop("Tonemap")
                .with_dependencies(["Opaque", "Ssao"])
                .uses_texture(hdr, ResourceUsage::ShaderResource),
        )
        .set_present_node(PresentNodeDesc::new(swapchain).depends_on("Tonemap"));
}

#[test]
fn topological_order_respects_declared_edges() {
    let device = common::device();
    let mut graph = common::graph(&device, 2);
    describe(&mut graph, &device, device.create_swapchain(2));
    graph.build_graph().unwrap();

    let dag = graph.dag().unwrap();
    let order = dag.topological_order();
    let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
    for (from, to) in dag.edges() {
        assert!(pos(from) < pos(to), "{} must come before {}", from, to);
    }
    assert_eq!(order.first(), Some(&"DepthPrepass"));
    assert_eq!(order.last(), Some(&"present"));
    assert_eq!(dag.present_predecessors(), vec!["Tonemap"]);
    assert!(dag.reaches("DepthPrepass", "present"));
    assert!(!dag.reaches("Ssao", "Opaque"));
    assert_eq!(dag.queue_of("Ssao"), Some(QueueType::Compute));
}

#[test]
fn missing_dependency_names_the_dependency() {
    let device = common::device();
    let mut graph = common::graph(&device, 2);
    graph
        .add_node(noop("A").depends_on("B"))
        .set_present_node(PresentNodeDesc::new(device.create_swapchain(2)).depends_on("A"));

    let err = graph.build_graph().unwrap_err();
    assert_eq!(
        err,
        BuildError::MissingDependency {
            node: "A".to_owned(),
            dependency: "B".to_owned()
        }
    );
    assert!(err.to_string().contains("\"B\""));
    assert!(!graph.is_built());
}

#[test]
fn cycles_fail_the_same_way_every_time() {
    let device = common::device();
    let mut graph = common::graph(&device, 2);
    graph
        .add_node(noop("A").depends_on("B"))
        .add_node(noop("B").depends_on("A"))
        .set_present_node(PresentNodeDesc::new(device.create_swapchain(2)).depends_on("A"));

    let first = graph.build_graph().unwrap_err();
    let second = graph.build_graph().unwrap_err();
    assert!(matches!(first, BuildError::Cycle { .. }));
    assert_eq!(first, second);
    assert!(!graph.is_built());
    assert!(matches!(graph.update(), Err(FrameError::NotBuilt)));
}

#[test]
fn exactly_one_present_node() {
    let device = common::device();
    let mut graph = common::graph(&device, 1);
    graph.add_node(noop("A"));
    assert_eq!(graph.build_graph(), Err(BuildError::MissingPresentNode));

    let swapchain = device.create_swapchain(2);
    graph
        .set_present_node(PresentNodeDesc::new(swapchain.clone()).depends_on("A"))
        .set_present_node(PresentNodeDesc::new(swapchain).depends_on("A"));
    assert_eq!(graph.build_graph(), Err(BuildError::DuplicatePresentNode(2)));
}

#[test]
fn rebuilding_after_reset_yields_the_same_dag() {
    let device = common::device();
    let swapchain = device.create_swapchain(3);
    let mut graph = common::graph(&device, 2);

    describe(&mut graph, &device, swapchain.clone());
    graph.build_graph().unwrap();
    graph.update().unwrap();
    let dag = graph.dag().unwrap();
    let edges = dag.edge_set();
    let sink: Vec<String> = dag
        .present_predecessors()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let order: Vec<String> = dag
        .topological_order()
        .into_iter()
        .map(str::to_owned)
        .collect();

    graph.reset().unwrap();
    assert!(!graph.is_built());
    assert!(graph.registry().is_empty());

    describe(&mut graph, &device, swapchain);
    graph.build_graph().unwrap();
    let dag = graph.dag().unwrap();
    assert_eq!(dag.edge_set(), edges);
    assert_eq!(dag.present_predecessors(), sink);
    assert_eq!(dag.topological_order(), order);
    assert_eq!(dag.present_index(), dag.node_count() - 1);
    graph.update().unwrap();
}

#[test]
fn race_detection_can_be_disabled() {
    let device = common::device();
    let target = device.create_texture(Some("Target"));
    let add = |graph: &mut RenderGraph| {
        graph
            .add_node(noop("Sky").uses_texture(target.clone(), ResourceUsage::RenderTarget))
            .add_node(noop("Sprites").uses_texture(target.clone(), ResourceUsage::RenderTarget))
            .set_present_node(
                PresentNodeDesc::new(device.create_swapchain(2))
                    .with_dependencies(["Sky", "Sprites"]),
            );
    };

    let mut checked = RenderGraph::new(common::desc(&device).with_race_detection(true)).unwrap();
    add(&mut checked);
    assert!(matches!(
        checked.build_graph(),
        Err(BuildError::UnorderedResourceAccess { ref resource, .. }) if resource == "Target"
    ));

    let mut trusted = RenderGraph::new(common::desc(&device).with_race_detection(false)).unwrap();
    add(&mut trusted);
    trusted.build_graph().unwrap();
}

#[test]
fn command_lists_are_budgeted_per_queue() {
    let device = common::device();
    let mut graph = RenderGraph::new(
        common::desc(&device).with_command_lists(QueueType::Compute, 1),
    )
    .unwrap();
    graph
        .add_node(noop("Cull").on_queue(QueueType::Compute))
        .add_node(noop("Skin").on_queue(QueueType::Compute))
        .set_present_node(
            PresentNodeDesc::new(device.create_swapchain(2)).with_dependencies(["Cull", "Skin"]),
        );

    assert_eq!(
        graph.build_graph(),
        Err(BuildError::OutOfCommandLists {
            queue: QueueType::Compute,
            requested: 2,
            available: 1
        })
    );
}
