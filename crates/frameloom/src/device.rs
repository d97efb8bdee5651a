use std::{fmt::Display, sync::Arc};

use crate::{CommandList, DeviceError, Fence, Semaphore};

///Queue a command list is executed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum QueueType {
    #[default]
    Graphics,
    Compute,
    Copy,
    RayTracing,
}

impl QueueType {
    pub const ALL: [QueueType; 4] = [
        QueueType::Graphics,
        QueueType::Compute,
        QueueType::Copy,
        QueueType::RayTracing,
    ];
}

impl Display for QueueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueueType::Graphics => "graphics",
            QueueType::Compute => "compute",
            QueueType::Copy => "copy",
            QueueType::RayTracing => "ray-tracing",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandListPoolDesc {
    pub queue_type: QueueType,
    pub num_command_lists: usize,
}

///Fixed set of command lists for one queue. Lists are reused, the pool never grows.
pub trait CommandListPool: Send {
    fn queue_type(&self) -> QueueType;
    fn command_lists(&mut self) -> &mut [Box<dyn CommandList>];
}

///The device capability set the graph is written against. One implementation exists per backend; the graph never
/// branches on which one it talks to.
pub trait LogicalDevice: Send + Sync {
    ///Creates a binary GPU semaphore.
    fn create_semaphore(&self) -> Result<Arc<dyn Semaphore>, DeviceError>;
    ///Creates an unsignaled CPU-waitable fence.
    fn create_fence(&self) -> Result<Arc<dyn Fence>, DeviceError>;
    fn create_command_list_pool(
        &self,
        desc: &CommandListPoolDesc,
    ) -> Result<Box<dyn CommandListPool>, DeviceError>;
    ///Blocks until all queues are idle.
    fn wait_idle(&self) -> Result<(), DeviceError>;
}
