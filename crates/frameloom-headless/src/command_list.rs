use std::{any::Any, sync::Arc};

use frameloom::{
    BufferHandle, CommandList, DeviceError, ExecuteDesc, PipelineBarrier, QueueType,
};

use crate::{
    device::Shared,
    journal::{BarrierRecord, Event, ExecuteRecord},
    sync::{HeadlessFence, semaphore_id},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    Initial,
    Recording,
    Executable,
}

pub struct HeadlessCommandList {
    pub id: u64,
    queue_type: QueueType,
    state: ListState,
    label: String,
    shared: Arc<Shared>,
}

impl HeadlessCommandList {
    pub(crate) fn new(id: u64, queue_type: QueueType, shared: Arc<Shared>) -> Self {
        HeadlessCommandList {
            id,
            queue_type,
            state: ListState::Initial,
            label: String::new(),
            shared,
        }
    }

    ///Label given to the last `begin`.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn is_recording(&self) -> bool {
        if self.state != ListState::Recording {
            #[cfg(feature = "logging")]
            log::warn!("Command list {} recorded to while not recording", self.id);
            false
        } else {
            true
        }
    }
}

impl CommandList for HeadlessCommandList {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn begin(&mut self, label: &str) -> Result<(), DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        self.label = label.to_owned();
        self.state = ListState::Recording;
        self.shared.journal.push(Event::Begin {
            list: self.id,
            label: self.label.clone(),
        });
        Ok(())
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) {
        if !self.is_recording() {
            return;
        }
        let textures = barrier
            .textures
            .iter()
            .map(|b| BarrierRecord {
                resource: b.texture.name().to_owned(),
                old_state: b.old_state,
                new_state: b.new_state,
                queue_transfer: b.queue_transfer,
            })
            .collect();
        let buffers = barrier
            .buffers
            .iter()
            .map(|b| BarrierRecord {
                resource: b.buffer.name().to_owned(),
                old_state: b.old_state,
                new_state: b.new_state,
                queue_transfer: None,
            })
            .collect();
        self.shared.journal.push(Event::Barrier {
            list: self.id,
            label: self.label.clone(),
            textures,
            buffers,
        });
    }

    fn end(&mut self) -> Result<(), DeviceError> {
        if self.state != ListState::Recording {
            return Err(DeviceError::InvalidState(format!(
                "command list {} ended without begin",
                self.id
            )));
        }
        self.state = ListState::Executable;
        self.shared.journal.push(Event::End {
            list: self.id,
            label: self.label.clone(),
        });
        Ok(())
    }

    fn execute(&mut self, desc: &ExecuteDesc<'_>) -> Result<(), DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        if self.state != ListState::Executable {
            return Err(DeviceError::InvalidState(format!(
                "command list {} executed while {:?}",
                self.id, self.state
            )));
        }

        let ids = |sems: &[Arc<dyn frameloom::Semaphore>]| {
            sems.iter()
                .filter_map(|s| semaphore_id(s.as_ref()))
                .collect::<Vec<_>>()
        };

        let fence = match desc.fence {
            Some(f) => Some(
                f.as_any()
                    .downcast_ref::<HeadlessFence>()
                    .ok_or_else(|| DeviceError::Backend("foreign fence".to_owned()))?,
            ),
            None => None,
        };

        self.shared.journal.push(Event::Execute(ExecuteRecord {
            list: self.id,
            label: desc.label.to_owned(),
            wait: ids(desc.wait),
            signal: ids(desc.signal),
            fence: fence.map(|f| f.id),
        }));

        if let Some(fence) = fence {
            self.shared.submit_fence(fence);
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        if self.is_recording() {
            self.shared.journal.push(Event::Draw {
                label: self.label.clone(),
                vertex_count,
                instance_count,
            });
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if self.is_recording() {
            self.shared.journal.push(Event::Dispatch {
                label: self.label.clone(),
                groups: [x, y, z],
            });
        }
    }

    fn copy_buffer_region(
        &mut self,
        src: &BufferHandle,
        _src_offset: u64,
        dst: &BufferHandle,
        _dst_offset: u64,
        size: u64,
    ) {
        if self.is_recording() {
            self.shared.journal.push(Event::Copy {
                label: self.label.clone(),
                src: src.name().to_owned(),
                dst: dst.name().to_owned(),
                size,
            });
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
