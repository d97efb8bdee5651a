use std::sync::Arc;

use ahash::AHashMap;
use frameloom::{
    BufferHandle, DeviceError, LogicalDevice, PresentResult, QueueType, ResourceUsage,
    TextureHandle,
};

use crate::{
    BuildError, FrameError, GraphError,
    builder::{BuildInput, Dag, ListBudget, build},
    executor::{NodeCallback, run_frame},
    frame::{FrameRing, SlotState, pool_sizes},
    node::{NodeDesc, NodeResourceUsage, PresentNodeDesc},
    state::{ResourceState, StateRegistry},
};

///Configuration of a [RenderGraph].
#[derive(Clone)]
pub struct RenderGraphDesc {
    pub device: Arc<dyn LogicalDevice>,
    ///Frames that can be in flight at once. Must be at least 1.
    pub num_frames: u32,
    ///Command lists available to user nodes per frame slot and queue type.
    pub num_graphics_command_lists: usize,
    pub num_compute_command_lists: usize,
    pub num_copy_command_lists: usize,
    pub num_ray_tracing_command_lists: usize,
    ///Recording threads. `None` lets the pool decide.
    pub worker_threads: Option<usize>,
    ///Rejects graphs in which unordered nodes access one resource in a conflicting way.
    pub detect_races: bool,
}

impl RenderGraphDesc {
    pub fn new(device: Arc<dyn LogicalDevice>) -> Self {
        RenderGraphDesc {
            device,
            num_frames: 3,
            num_graphics_command_lists: 8,
            num_compute_command_lists: 2,
            num_copy_command_lists: 1,
            num_ray_tracing_command_lists: 0,
            worker_threads: None,
            detect_races: cfg!(debug_assertions),
        }
    }

    pub fn with_num_frames(mut self, num_frames: u32) -> Self {
        self.num_frames = num_frames;
        self
    }

    pub fn with_command_lists(mut self, queue: QueueType, count: usize) -> Self {
        match queue {
            QueueType::Graphics => self.num_graphics_command_lists = count,
            QueueType::Compute => self.num_compute_command_lists = count,
            QueueType::Copy => self.num_copy_command_lists = count,
            QueueType::RayTracing => self.num_ray_tracing_command_lists = count,
        }
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_race_detection(mut self, enabled: bool) -> Self {
        self.detect_races = enabled;
        self
    }

    fn command_lists(&self) -> AHashMap<QueueType, usize> {
        let mut lists = AHashMap::with_capacity(QueueType::ALL.len());
        lists.insert(QueueType::Graphics, self.num_graphics_command_lists);
        lists.insert(QueueType::Compute, self.num_compute_command_lists);
        lists.insert(QueueType::Copy, self.num_copy_command_lists);
        lists.insert(QueueType::RayTracing, self.num_ray_tracing_command_lists);
        lists
    }
}

impl std::fmt::Debug for RenderGraphDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderGraphDesc")
            .field("num_frames", &self.num_frames)
            .field("num_graphics_command_lists", &self.num_graphics_command_lists)
            .field("num_compute_command_lists", &self.num_compute_command_lists)
            .field("num_copy_command_lists", &self.num_copy_command_lists)
            .field(
                "num_ray_tracing_command_lists",
                &self.num_ray_tracing_command_lists,
            )
            .field("worker_threads", &self.worker_threads)
            .field("detect_races", &self.detect_races)
            .finish_non_exhaustive()
    }
}

struct BuiltGraph {
    dag: Dag,
    callbacks: Vec<NodeCallback>,
}

///Schedules a set of nodes once per [update](RenderGraph::update).
///
/// Nodes are added with [add_node](RenderGraph::add_node), the terminal present node with
/// [set_present_node](RenderGraph::set_present_node). After [build_graph](RenderGraph::build_graph) succeeded, every
/// `update` records all nodes in parallel, inserts the barriers their declared resource states need, submits them with
/// semaphores along every dependency and presents the result.
///
/// Changing the node set invalidates the build. Dropping the graph waits for all in-flight frames.
pub struct RenderGraph {
    device: Arc<dyn LogicalDevice>,
    workers: rayon::ThreadPool,
    nodes: Vec<NodeDesc>,
    present: Vec<PresentNodeDesc>,
    built: Option<BuiltGraph>,
    registry: StateRegistry,
    frames: FrameRing,
    budget: ListBudget,
    detect_races: bool,
}

impl RenderGraph {
    pub fn new(desc: RenderGraphDesc) -> Result<Self, GraphError> {
        if desc.num_frames == 0 {
            return Err(GraphError::InvalidDescription(
                "num_frames must be at least 1".to_owned(),
            ));
        }

        let mut workers =
            rayon::ThreadPoolBuilder::new().thread_name(|idx| format!("frameloom-worker-{}", idx));
        if let Some(threads) = desc.worker_threads {
            if threads == 0 {
                return Err(GraphError::InvalidDescription(
                    "worker_threads must be at least 1".to_owned(),
                ));
            }
            workers = workers.num_threads(threads);
        }
        let workers = workers.build()?;

        let lists = desc.command_lists();
        let frames = FrameRing::new(desc.device.clone(), desc.num_frames, &pool_sizes(&lists))?;

        #[cfg(feature = "logging")]
        log::info!(
            "Created render graph with {} worker(s): {:?}",
            workers.current_num_threads(),
            desc
        );

        Ok(RenderGraph {
            device: desc.device,
            workers,
            nodes: Vec::new(),
            present: Vec::new(),
            built: None,
            registry: StateRegistry::new(),
            frames,
            budget: ListBudget { available: lists },
            detect_races: desc.detect_races,
        })
    }

    pub fn device(&self) -> &Arc<dyn LogicalDevice> {
        &self.device
    }

    ///Adds a node. Takes effect with the next [build_graph](RenderGraph::build_graph).
    pub fn add_node(&mut self, node: NodeDesc) -> &mut Self {
        self.built = None;
        self.nodes.push(node);
        self
    }

    ///Sets the present node. A graph must have exactly one, which is checked when building.
    pub fn set_present_node(&mut self, present: PresentNodeDesc) -> &mut Self {
        self.built = None;
        self.present.push(present);
        self
    }

    ///Validates the added nodes and derives the schedule. On failure the graph stays unbuilt.
    ///
    /// Waits for in-flight frames first, since their command lists and semaphores are reassigned.
    pub fn build_graph(&mut self) -> Result<(), BuildError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.built = None;
        if self.frames.has_inflight() {
            self.frames.wait_idle()?;
        }

        let dag = match build(BuildInput {
            nodes: &self.nodes,
            present: &self.present,
            budget: &self.budget,
            detect_races: self.detect_races,
        }) {
            Ok(dag) => dag,
            Err(err) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to build render graph: {}", err);
                return Err(err);
            }
        };

        for usages in dag.usages.iter() {
            for usage in usages.iter() {
                match usage {
                    NodeResourceUsage::Buffer(b) => self.registry.register(&b.buffer),
                    NodeResourceUsage::Texture(t) => self.registry.register(&t.texture),
                }
            }
        }

        self.frames.assign_edge_semaphores(dag.edge_count())?;

        let mut callbacks: Vec<NodeCallback> = self
            .nodes
            .iter()
            .map(|n| NodeCallback::Node(n.execute.clone()))
            .collect();
        //exactly one present node, checked by the builder
        for present in self.present.iter() {
            callbacks.push(NodeCallback::Present {
                swapchain: present.swapchain.clone(),
                execute: present.execute.clone(),
            });
        }

        #[cfg(feature = "logging")]
        log::info!(
            "Built render graph: {} node(s), {} edge(s), {} batch(es), {} tracked resource(s)",
            dag.node_count(),
            dag.edge_count(),
            dag.batches.len(),
            self.registry.len()
        );

        self.built = Some(BuiltGraph { dag, callbacks });
        Ok(())
    }

    ///Records, submits and presents one frame.
    ///
    /// Blocks only if the frame slot that is reused was submitted and its fence did not signal yet. If a node fails
    /// to record, nothing of the frame is submitted and all resource states are restored to their pre-frame values.
    pub fn update(&mut self) -> Result<PresentResult, FrameError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let Some(built) = &self.built else {
            return Err(FrameError::NotBuilt);
        };

        let slot = self.frames.current_slot_mut();
        slot.begin_recording()?;

        #[cfg(feature = "logging")]
        log::trace!(
            "Frame {} records into slot {}",
            self.frames.frame_count(),
            self.frames.current_index()
        );

        let slot = self.frames.current_slot_mut();
        let result = run_frame(
            &self.workers,
            &built.dag,
            &built.callbacks,
            &self.registry,
            slot,
        );
        if result.is_err() {
            slot.abort_recording();
        }

        self.frames.advance();
        result
    }

    ///Blocks until all submitted frames retired.
    pub fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.frames.wait_idle()
    }

    ///Drops all nodes, the present node, the schedule and all tracked states. Frame slots are kept.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        self.wait_idle()?;
        self.nodes.clear();
        self.present.clear();
        self.built = None;
        self.registry.clear();

        #[cfg(feature = "logging")]
        log::debug!("Render graph reset");
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    ///The schedule of the last successful build.
    pub fn dag(&self) -> Option<&Dag> {
        self.built.as_ref().map(|b| &b.dag)
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    ///Number of updates that ran, including aborted ones.
    pub fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    ///Slot the next update records into.
    pub fn current_slot(&self) -> u32 {
        self.frames.current_index()
    }

    pub fn num_frames(&self) -> u32 {
        self.frames.num_frames()
    }

    pub fn slot_state(&self, slot: u32) -> Option<SlotState> {
        self.frames.slot_state(slot)
    }

    ///Sets the known state of a buffer, for instance after it was written outside the graph.
    pub fn track_buffer(&mut self, buffer: &BufferHandle, state: ResourceUsage, queue: QueueType) {
        self.registry.track(buffer, state, queue);
    }

    pub fn track_texture(&mut self, texture: &TextureHandle, state: ResourceUsage, queue: QueueType) {
        self.registry.track(texture, state, queue);
    }

    ///Forgets the state of `buffer`. If a node of the current build declares it, it is tracked again from its
    /// initial state.
    pub fn untrack_buffer(&mut self, buffer: &BufferHandle) -> Option<ResourceState> {
        let old = self.registry.untrack(buffer);
        self.reregister_declared();
        old
    }

    pub fn untrack_texture(&mut self, texture: &TextureHandle) -> Option<ResourceState> {
        let old = self.registry.untrack(texture);
        self.reregister_declared();
        old
    }

    fn reregister_declared(&mut self) {
        let Some(built) = &self.built else {
            return;
        };
        for usage in built.dag.usages.iter().flatten() {
            match usage {
                NodeResourceUsage::Buffer(b) => self.registry.register(&b.buffer),
                NodeResourceUsage::Texture(t) => self.registry.register(&t.texture),
            }
        }
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        if let Err(e) = self.frames.wait_idle() {
            #[cfg(feature = "logging")]
            log::error!("Failed to wait for in-flight frames on drop: {}", e);
            #[cfg(not(feature = "logging"))]
            let _ = e;
        }
    }
}
