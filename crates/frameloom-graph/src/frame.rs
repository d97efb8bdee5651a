//! Frame slots and the command list recycler.
//!
//! The ring holds one [FrameSlot] per frame in flight. A slot owns everything a frame needs exclusively: its command
//! list pools (one per queue type), the fence that retires it, the image-acquired and work-finished semaphores, and
//! one semaphore per DAG edge. Slots are revisited every `num_frames` updates. A revisited slot that was submitted is
//! only reused after its fence signaled.
//!
//! Slot lifecycle:
//! ```ignore
//! Idle -> Recording -> Submitted -> (fence wait on revisit) Retired -> Idle
//!              \-> (aborted frame) Idle
//! ```
//!
//! An aborted frame that already acquired a swapchain image still submits the image's release, so it ends up
//! `Submitted` like a finished frame.

use std::sync::Arc;

use ahash::AHashMap;
use frameloom::{
    CommandListPool, CommandListPoolDesc, DeviceError, Fence, LogicalDevice, QueueType, Semaphore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
    Retired,
}

pub(crate) struct FrameSlot {
    pub(crate) index: u32,
    pub(crate) fence: Arc<dyn Fence>,
    pub(crate) image_acquired: Arc<dyn Semaphore>,
    pub(crate) work_finished: Arc<dyn Semaphore>,
    pub(crate) pools: Vec<Box<dyn CommandListPool>>,
    ///Semaphore of every DAG edge, indexed like [Dag::edges](crate::Dag).
    pub(crate) edge_semaphores: Vec<Arc<dyn Semaphore>>,
    state: SlotState,
}

impl FrameSlot {
    fn new(
        device: &dyn LogicalDevice,
        index: u32,
        pool_sizes: &[(QueueType, usize)],
    ) -> Result<Self, DeviceError> {
        let mut pools = Vec::with_capacity(pool_sizes.len());
        for (queue_type, count) in pool_sizes.iter().filter(|(_, c)| *c > 0) {
            pools.push(device.create_command_list_pool(&CommandListPoolDesc {
                queue_type: *queue_type,
                num_command_lists: *count,
            })?);
        }

        Ok(FrameSlot {
            index,
            fence: device.create_fence()?,
            image_acquired: device.create_semaphore()?,
            work_finished: device.create_semaphore()?,
            pools,
            edge_semaphores: Vec::new(),
            state: SlotState::Idle,
        })
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state
    }

    ///Moves the slot into `Recording`. If the slot's previous frame is still in flight, blocks on its fence first.
    /// Returns true if the fence was waited on.
    pub(crate) fn begin_recording(&mut self) -> Result<bool, DeviceError> {
        let waited = self.retire()?;
        self.fence.reset()?;
        self.state = SlotState::Recording;
        Ok(waited)
    }

    pub(crate) fn mark_submitted(&mut self) {
        debug_assert_eq!(self.state, SlotState::Recording);
        self.state = SlotState::Submitted;
    }

    ///Nothing of this frame reached the device, the slot can be reused without waiting. Has no effect once the slot
    /// was submitted.
    pub(crate) fn abort_recording(&mut self) {
        if self.state == SlotState::Recording {
            self.state = SlotState::Idle;
        }
    }

    ///Waits for the slot's submitted work, if any. Leaves the slot `Idle`.
    pub(crate) fn retire(&mut self) -> Result<bool, DeviceError> {
        let waited = if self.state == SlotState::Submitted {
            #[cfg(feature = "profiling")]
            puffin::profile_scope!("wait frame fence");

            self.fence.wait()?;
            self.state = SlotState::Retired;

            #[cfg(feature = "logging")]
            log::trace!("Frame slot {} retired", self.index);
            true
        } else {
            false
        };
        self.state = SlotState::Idle;
        Ok(waited)
    }
}

///Recycles semaphores across graph rebuilds.
#[derive(Default)]
pub(crate) struct SemaphorePool {
    free: Vec<Arc<dyn Semaphore>>,
    created: usize,
}

impl SemaphorePool {
    fn take(&mut self, device: &dyn LogicalDevice) -> Result<Arc<dyn Semaphore>, DeviceError> {
        if let Some(sem) = self.free.pop() {
            Ok(sem)
        } else {
            self.created += 1;
            device.create_semaphore()
        }
    }

    fn give_back(&mut self, semaphores: impl IntoIterator<Item = Arc<dyn Semaphore>>) {
        self.free.extend(semaphores);
    }
}

pub(crate) struct FrameRing {
    device: Arc<dyn LogicalDevice>,
    slots: Vec<FrameSlot>,
    semaphores: SemaphorePool,
    frame_count: u64,
}

impl FrameRing {
    pub(crate) fn new(
        device: Arc<dyn LogicalDevice>,
        num_frames: u32,
        pool_sizes: &[(QueueType, usize)],
    ) -> Result<Self, DeviceError> {
        let slots = (0..num_frames)
            .map(|index| FrameSlot::new(device.as_ref(), index, pool_sizes))
            .collect::<Result<Vec<_>, _>>()?;

        #[cfg(feature = "logging")]
        log::info!(
            "Created {} frame slot(s) with pools {:?}",
            num_frames,
            pool_sizes
        );

        Ok(FrameRing {
            device,
            slots,
            semaphores: SemaphorePool::default(),
            frame_count: 0,
        })
    }

    pub(crate) fn num_frames(&self) -> u32 {
        self.slots.len() as u32
    }

    ///Slot the next frame records into.
    pub(crate) fn current_index(&self) -> u32 {
        (self.frame_count % self.slots.len() as u64) as u32
    }

    pub(crate) fn current_slot_mut(&mut self) -> &mut FrameSlot {
        let idx = self.current_index() as usize;
        &mut self.slots[idx]
    }

    pub(crate) fn slot_state(&self, index: u32) -> Option<SlotState> {
        self.slots.get(index as usize).map(|s| s.state())
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    ///Moves on to the next slot.
    pub(crate) fn advance(&mut self) {
        self.frame_count += 1;
    }

    pub(crate) fn has_inflight(&self) -> bool {
        self.slots.iter().any(|s| s.state() == SlotState::Submitted)
    }

    ///Waits until every submitted slot retired.
    pub(crate) fn wait_idle(&mut self) -> Result<(), DeviceError> {
        for slot in self.slots.iter_mut() {
            slot.retire()?;
        }
        Ok(())
    }

    ///Gives every slot `edge_count` edge semaphores. Semaphores of a previous build are reused.
    pub(crate) fn assign_edge_semaphores(&mut self, edge_count: usize) -> Result<(), DeviceError> {
        debug_assert!(!self.has_inflight());
        for slot in self.slots.iter_mut() {
            self.semaphores
                .give_back(std::mem::take(&mut slot.edge_semaphores));
        }
        for slot in self.slots.iter_mut() {
            let mut sems = Vec::with_capacity(edge_count);
            for _ in 0..edge_count {
                sems.push(self.semaphores.take(self.device.as_ref())?);
            }
            slot.edge_semaphores = sems;
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "Assigned {} edge semaphore(s) per slot, {} created in total",
            edge_count,
            self.semaphores.created
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn semaphores_created(&self) -> usize {
        self.semaphores.created
    }
}

///Pool sizes of every slot. The graphics pool holds one extra list for the present node.
pub(crate) fn pool_sizes(lists: &AHashMap<QueueType, usize>) -> Vec<(QueueType, usize)> {
    QueueType::ALL
        .iter()
        .map(|q| {
            let count = lists.get(q).copied().unwrap_or(0);
            if *q == QueueType::Graphics {
                (*q, count + 1)
            } else {
                (*q, count)
            }
        })
        .collect()
}
