//! # Synchronisation
//!
//! Two primitives are needed to run a graph:
//!
//! - semaphores: binary GPU-side signals. One submission signals, exactly one later submission (or a present) waits.
//!   They order GPU work between nodes, between queues, and between swapchain acquisition, rendering and presentation.
//! - fences: signalled by the device once everything submitted with it has retired. The host waits on them before
//!   reusing a frame slot. There is no timeout; a stuck device is reported as [DeviceLost](crate::DeviceError::DeviceLost)
//!   by the backend.
//!
//! Memory barriers are not a primitive of their own. They are described by [PipelineBarrier](crate::PipelineBarrier)
//! and recorded into a command list.

use std::{any::Any, fmt::Debug};

use crate::DeviceError;

///Binary GPU semaphore.
pub trait Semaphore: Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

///CPU-waitable completion fence.
pub trait Fence: Debug + Send + Sync {
    ///Blocks until the fence is signaled.
    fn wait(&self) -> Result<(), DeviceError>;
    ///Moves the fence back to the unsignaled state.
    fn reset(&self) -> Result<(), DeviceError>;
    fn is_signaled(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

///True if both references point to the same semaphore object.
pub fn same_semaphore(a: &dyn Semaphore, b: &dyn Semaphore) -> bool {
    std::ptr::addr_eq(a as *const dyn Semaphore, b as *const dyn Semaphore)
}
