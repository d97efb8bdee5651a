//! # Frameloom graph
//!
//! Render graph on top of the [frameloom] contracts. Work is described as a set of [NodeDesc]s, each naming the nodes
//! it runs after and the states it needs its resources in. A single [PresentNodeDesc] ends every frame.
//!
//! From that description the [RenderGraph]
//!
//! - validates and orders the nodes into a [Dag] (missing dependencies, cycles and unreachable nodes are rejected),
//! - records all nodes of a frame in parallel on a worker pool, respecting the dependency order on the CPU,
//! - tracks the state of every declared buffer and texture and inserts exactly the barriers a node needs before it
//!   records,
//! - threads semaphores along every dependency edge so the GPU observes the same order,
//! - keeps up to `num_frames` frames in flight, each retired by its own fence.
//!
//! ```ignore
//! let mut graph = RenderGraph::new(RenderGraphDesc::new(device.clone()))?;
//! graph
//!     .add_node(
//!         NodeDesc::new("Shadow", |_frame, cmd| { cmd.draw(3, 1); Ok(()) })
//!             .uses_texture(shadow_map.clone(), ResourceUsage::DepthWrite),
//!     )
//!     .add_node(
//!         NodeDesc::new("Opaque", |_frame, cmd| { cmd.draw(36, 1); Ok(()) })
//!             .depends_on("Shadow")
//!             .uses_texture(shadow_map.clone(), ResourceUsage::ShaderResource),
//!     )
//!     .set_present_node(PresentNodeDesc::new(swapchain).depends_on("Opaque"));
//! graph.build_graph()?;
//! loop {
//!     graph.update()?;
//! }
//! ```
//!
//! # Features
//!
//! - `logging`: messages through the `log` crate.
//! - `log_reasoning`: explains every barrier decision and the computed schedule on the trace level.
//! - `profiling`: puffin scopes around recording, submission and fence waits.

mod barrier;
mod builder;
mod error;
mod executor;
mod frame;
mod graph;
mod node;
mod state;

pub use builder::Dag;
pub use error::{BuildError, FrameError, GraphError};
pub use frame::SlotState;
pub use graph::{RenderGraph, RenderGraphDesc};
pub use node::{
    BufferUsage, NodeDesc, NodeExecute, NodeResourceUsage, PRESENT_NODE_NAME, PresentExecute,
    PresentNodeDesc, TextureUsage,
};
pub use state::{ResourceState, StateRegistry, TrackedResource};

pub use frameloom;
