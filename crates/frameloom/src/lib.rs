//! # frameloom
//!
//! The contracts a graphics backend implements so the frameloom render graph can drive it.
//!
//! The graph is written once against these traits and never asks which backend it talks to. A backend provides
//!
//! - a [LogicalDevice] that creates [Semaphore]s, [Fence]s and [CommandListPool]s,
//! - [CommandList]s that record barriers and opaque work and submit it,
//! - a [Swapchain] to acquire and present images,
//! - resource identities through [BufferResource] / [TextureResource].
//!
//! Barriers are described backend independent by [PipelineBarrier].

pub mod barrier;
pub mod command_list;
pub mod device;
pub mod error;
pub mod resources;
pub mod swapchain;
pub mod sync;
pub mod util;

pub use barrier::{BufferBarrier, PipelineBarrier, QueueTransfer, Subresource, TextureBarrier};
pub use command_list::{CommandList, ExecuteDesc};
pub use device::{CommandListPool, CommandListPoolDesc, LogicalDevice, QueueType};
pub use error::DeviceError;
pub use resources::{
    BufferHandle, BufferResource, ResourceKey, ResourceUsage, TextureHandle, TextureResource,
};
pub use swapchain::{PresentResult, Swapchain};
pub use sync::{Fence, Semaphore, same_semaphore};
pub use util::SequenceGenerator;

pub use smallvec;
