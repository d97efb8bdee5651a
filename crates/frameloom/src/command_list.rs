use std::{any::Any, sync::Arc};

use crate::{BufferHandle, DeviceError, Fence, PipelineBarrier, QueueType, Semaphore};

///Describes one submission of a recorded command list.
#[derive(Default)]
pub struct ExecuteDesc<'a> {
    ///Debug label of the submission, usually the name of the node that recorded it.
    pub label: &'a str,
    ///Semaphores the submission waits on before executing.
    pub wait: &'a [Arc<dyn Semaphore>],
    ///Semaphores signaled once the submission has executed.
    pub signal: &'a [Arc<dyn Semaphore>],
    ///Fence signaled once the submission has retired.
    pub fence: Option<&'a dyn Fence>,
}

///A reusable command recording buffer bound to one queue.
///
/// Lists are used in the order `begin`, any number of recording calls, `end`, `execute`. Calling `begin` again
/// discards whatever was recorded before. The draw, dispatch and copy calls are opaque to the graph; backend specific
/// recording is reachable through [as_any_mut](CommandList::as_any_mut).
pub trait CommandList: Send {
    fn queue_type(&self) -> QueueType;
    fn begin(&mut self, label: &str) -> Result<(), DeviceError>;
    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier);
    fn end(&mut self) -> Result<(), DeviceError>;
    fn execute(&mut self, desc: &ExecuteDesc<'_>) -> Result<(), DeviceError>;

    fn draw(&mut self, vertex_count: u32, instance_count: u32);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn copy_buffer_region(
        &mut self,
        src: &BufferHandle,
        src_offset: u64,
        dst: &BufferHandle,
        dst_offset: u64,
        size: u64,
    );

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
