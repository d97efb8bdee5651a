//! Declarative description of graph nodes.
//!
//! A node is one unit of GPU work. It names the nodes it has to run after, the states it needs its resources in, the
//! queue it runs on, and the callback that records its commands. The graph derives barriers, semaphores and the
//! schedule from that declaration alone, so the declared resource usages double as the node's synchronisation
//! contract: a resource that is written by one node and touched by another must be covered by a dependency chain.

use std::{fmt::Debug, sync::Arc};

use frameloom::{
    BufferHandle, CommandList, QueueType, ResourceKey, ResourceUsage, Swapchain, TextureHandle,
};

///Name reserved for the present node. User nodes may not use it, and may not depend on it.
pub const PRESENT_NODE_NAME: &str = "present";

///Records the commands of a node.
pub trait NodeExecute: Send + Sync {
    ///`frame_index` is the frame slot the node records for.
    fn execute(&self, frame_index: u32, command_list: &mut dyn CommandList) -> anyhow::Result<()>;
}

impl<F> NodeExecute for F
where
    F: Fn(u32, &mut dyn CommandList) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, frame_index: u32, command_list: &mut dyn CommandList) -> anyhow::Result<()> {
        self(frame_index, command_list)
    }
}

///Records the commands of the present node. `render_target` is the acquired swapchain image, already in
/// [RenderTarget](ResourceUsage::RenderTarget) state.
pub trait PresentExecute: Send + Sync {
    fn execute(
        &self,
        frame_index: u32,
        command_list: &mut dyn CommandList,
        render_target: &TextureHandle,
    ) -> anyhow::Result<()>;
}

impl<F> PresentExecute for F
where
    F: Fn(u32, &mut dyn CommandList, &TextureHandle) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(
        &self,
        frame_index: u32,
        command_list: &mut dyn CommandList,
        render_target: &TextureHandle,
    ) -> anyhow::Result<()> {
        self(frame_index, command_list, render_target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferUsage {
    pub buffer: BufferHandle,
    pub state: ResourceUsage,
    ///If set, the usage only applies when recording for this frame slot.
    pub frame: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureUsage {
    pub texture: TextureHandle,
    pub state: ResourceUsage,
    pub frame: Option<u32>,
}

///State a node requires a buffer or texture to be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeResourceUsage {
    Buffer(BufferUsage),
    Texture(TextureUsage),
}

impl NodeResourceUsage {
    pub fn key(&self) -> ResourceKey {
        match self {
            NodeResourceUsage::Buffer(b) => ResourceKey::from(&b.buffer),
            NodeResourceUsage::Texture(t) => ResourceKey::from(&t.texture),
        }
    }

    pub fn state(&self) -> ResourceUsage {
        match self {
            NodeResourceUsage::Buffer(b) => b.state,
            NodeResourceUsage::Texture(t) => t.state,
        }
    }

    pub fn frame(&self) -> Option<u32> {
        match self {
            NodeResourceUsage::Buffer(b) => b.frame,
            NodeResourceUsage::Texture(t) => t.frame,
        }
    }

    pub fn resource_name(&self) -> &str {
        match self {
            NodeResourceUsage::Buffer(b) => b.buffer.name(),
            NodeResourceUsage::Texture(t) => t.texture.name(),
        }
    }

    ///True if the usage is active when recording frame slot `slot`.
    pub fn applies_to(&self, slot: u32) -> bool {
        self.frame().is_none_or(|f| f == slot)
    }

    ///True if both usages can be active in the same frame slot.
    pub(crate) fn overlaps(&self, other: &NodeResourceUsage) -> bool {
        match (self.frame(), other.frame()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

///Builder style description of a graph node.
#[derive(Clone)]
pub struct NodeDesc {
    pub name: String,
    pub queue: QueueType,
    pub dependencies: Vec<String>,
    pub usages: Vec<NodeResourceUsage>,
    pub execute: Arc<dyn NodeExecute>,
}

impl NodeDesc {
    pub fn new<F>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(u32, &mut dyn CommandList) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_executor(name, Arc::new(execute))
    }

    pub fn with_executor(name: impl Into<String>, execute: Arc<dyn NodeExecute>) -> Self {
        NodeDesc {
            name: name.into(),
            queue: QueueType::Graphics,
            dependencies: Vec::new(),
            usages: Vec::new(),
            execute,
        }
    }

    pub fn on_queue(mut self, queue: QueueType) -> Self {
        self.queue = queue;
        self
    }

    pub fn depends_on(mut self, node: impl Into<String>) -> Self {
        self.dependencies.push(node.into());
        self
    }

    pub fn with_dependencies<S: Into<String>>(mut self, nodes: impl IntoIterator<Item = S>) -> Self {
        self.dependencies.extend(nodes.into_iter().map(|n| n.into()));
        self
    }

    pub fn uses_buffer(self, buffer: BufferHandle, state: ResourceUsage) -> Self {
        self.with_usage(NodeResourceUsage::Buffer(BufferUsage {
            buffer,
            state,
            frame: None,
        }))
    }

    pub fn uses_texture(self, texture: TextureHandle, state: ResourceUsage) -> Self {
        self.with_usage(NodeResourceUsage::Texture(TextureUsage {
            texture,
            state,
            frame: None,
        }))
    }

    ///Declares a buffer that is only used when recording for frame slot `frame`.
    pub fn uses_buffer_in_frame(self, buffer: BufferHandle, state: ResourceUsage, frame: u32) -> Self {
        self.with_usage(NodeResourceUsage::Buffer(BufferUsage {
            buffer,
            state,
            frame: Some(frame),
        }))
    }

    pub fn uses_texture_in_frame(
        self,
        texture: TextureHandle,
        state: ResourceUsage,
        frame: u32,
    ) -> Self {
        self.with_usage(NodeResourceUsage::Texture(TextureUsage {
            texture,
            state,
            frame: Some(frame),
        }))
    }

    pub fn with_usage(mut self, usage: NodeResourceUsage) -> Self {
        self.usages.push(usage);
        self
    }
}

impl Debug for NodeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDesc")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .field("dependencies", &self.dependencies)
            .field("usages", &self.usages)
            .finish_non_exhaustive()
    }
}

///The terminal node of a graph. Acquires a swapchain image, runs its optional callback on it and presents it.
#[derive(Clone)]
pub struct PresentNodeDesc {
    pub dependencies: Vec<String>,
    pub usages: Vec<NodeResourceUsage>,
    pub swapchain: Arc<dyn Swapchain>,
    pub execute: Option<Arc<dyn PresentExecute>>,
}

impl PresentNodeDesc {
    pub fn new(swapchain: Arc<dyn Swapchain>) -> Self {
        PresentNodeDesc {
            dependencies: Vec::new(),
            usages: Vec::new(),
            swapchain,
            execute: None,
        }
    }

    pub fn with_callback<F>(mut self, execute: F) -> Self
    where
        F: Fn(u32, &mut dyn CommandList, &TextureHandle) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.execute = Some(Arc::new(execute));
        self
    }

    pub fn depends_on(mut self, node: impl Into<String>) -> Self {
        self.dependencies.push(node.into());
        self
    }

    pub fn with_dependencies<S: Into<String>>(mut self, nodes: impl IntoIterator<Item = S>) -> Self {
        self.dependencies.extend(nodes.into_iter().map(|n| n.into()));
        self
    }

    pub fn uses_buffer(mut self, buffer: BufferHandle, state: ResourceUsage) -> Self {
        self.usages.push(NodeResourceUsage::Buffer(BufferUsage {
            buffer,
            state,
            frame: None,
        }));
        self
    }

    pub fn uses_texture(mut self, texture: TextureHandle, state: ResourceUsage) -> Self {
        self.usages.push(NodeResourceUsage::Texture(TextureUsage {
            texture,
            state,
            frame: None,
        }));
        self
    }
}

impl Debug for PresentNodeDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentNodeDesc")
            .field("dependencies", &self.dependencies)
            .field("usages", &self.usages)
            .field("has_callback", &self.execute.is_some())
            .finish_non_exhaustive()
    }
}
