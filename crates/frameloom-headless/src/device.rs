use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use frameloom::{
    BufferHandle, CommandList, CommandListPool, CommandListPoolDesc, DeviceError, Fence,
    LogicalDevice, QueueType, ResourceUsage, Semaphore, SequenceGenerator, TextureHandle,
};
use parking_lot::Mutex;

use crate::{
    command_list::HeadlessCommandList,
    journal::{Event, Journal},
    resources::{HeadlessBuffer, HeadlessTexture},
    swapchain::HeadlessSwapchain,
    sync::{FenceState, HeadlessFence, HeadlessSemaphore},
};

///Configuration of the headless device.
#[derive(Debug, Clone, Default)]
pub struct HeadlessDesc {
    ///If set, fences submitted with work are only signaled by [HeadlessDevice::retire_submissions].
    /// Otherwise the "GPU" retires work the moment it is submitted.
    pub deferred_completion: bool,
}

pub(crate) struct Shared {
    pub(crate) desc: HeadlessDesc,
    pub(crate) ids: SequenceGenerator,
    pub(crate) journal: Journal,
    pending: Mutex<Vec<Arc<FenceState>>>,
    fence_waits: AtomicUsize,
    lost: AtomicBool,
}

impl Shared {
    pub(crate) fn count_fence_wait(&self) {
        self.fence_waits.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    ///Called for every submission that carries a fence.
    pub(crate) fn submit_fence(&self, fence: &HeadlessFence) {
        if self.desc.deferred_completion {
            self.pending.lock().push(fence.state.clone());
        } else {
            self.journal.push(Event::FenceSignal { fence: fence.id });
            fence.state.signal();
        }
    }
}

///Device of the headless backend. Cheap to clone, all clones share one journal.
#[derive(Clone)]
pub struct HeadlessDevice {
    pub(crate) shared: Arc<Shared>,
}

impl HeadlessDevice {
    pub fn new(desc: HeadlessDesc) -> Self {
        HeadlessDevice {
            shared: Arc::new(Shared {
                desc,
                ids: SequenceGenerator::starting_at(1),
                journal: Journal::default(),
                pending: Mutex::new(Vec::new()),
                fence_waits: AtomicUsize::new(0),
                lost: AtomicBool::new(false),
            }),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.shared.journal
    }

    ///How often any fence of this device was waited on.
    pub fn fence_wait_count(&self) -> usize {
        self.shared.fence_waits.load(Ordering::SeqCst)
    }

    ///Signals every fence submitted since the last call. Only meaningful with deferred completion.
    pub fn retire_submissions(&self) -> usize {
        let pending = std::mem::take(&mut *self.shared.pending.lock());
        for state in pending.iter() {
            state.signal();
        }

        #[cfg(feature = "logging")]
        log::trace!("Retired {} submission(s)", pending.len());

        pending.len()
    }

    ///Simulates device loss. Blocked and future fence waits fail with [DeviceError::DeviceLost].
    pub fn lose_device(&self) {
        self.shared.lost.store(true, Ordering::SeqCst);
        for state in self.shared.pending.lock().iter() {
            state.wake();
        }
    }

    ///Creates a buffer. Unnamed buffers get a generated name.
    pub fn create_buffer(&self, name: Option<&str>) -> BufferHandle {
        self.create_buffer_in_state(name, ResourceUsage::Undefined)
    }

    pub fn create_buffer_in_state(
        &self,
        name: Option<&str>,
        initial_state: ResourceUsage,
    ) -> BufferHandle {
        let name = name
            .map(|n| n.to_owned())
            .unwrap_or_else(|| self.shared.ids.next_name("Buffer"));
        BufferHandle::new(HeadlessBuffer {
            name,
            initial_state,
        })
    }

    pub fn create_texture(&self, name: Option<&str>) -> TextureHandle {
        self.create_texture_in_state(name, ResourceUsage::Undefined)
    }

    pub fn create_texture_in_state(
        &self,
        name: Option<&str>,
        initial_state: ResourceUsage,
    ) -> TextureHandle {
        let name = name
            .map(|n| n.to_owned())
            .unwrap_or_else(|| self.shared.ids.next_name("Texture"));
        TextureHandle::new(HeadlessTexture {
            name,
            initial_state,
        })
    }

    pub fn create_swapchain(&self, image_count: u32) -> Arc<HeadlessSwapchain> {
        let images = (0..image_count)
            .map(|i| self.create_texture(Some(&format!("SwapchainImage{}", i))))
            .collect();
        Arc::new(HeadlessSwapchain::new(self.shared.clone(), images))
    }
}

struct HeadlessPool {
    queue_type: QueueType,
    lists: Vec<Box<dyn CommandList>>,
}

impl CommandListPool for HeadlessPool {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn command_lists(&mut self) -> &mut [Box<dyn CommandList>] {
        &mut self.lists
    }
}

impl LogicalDevice for HeadlessDevice {
    fn create_semaphore(&self) -> Result<Arc<dyn Semaphore>, DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        Ok(Arc::new(HeadlessSemaphore {
            id: self.shared.ids.next(),
        }))
    }

    fn create_fence(&self) -> Result<Arc<dyn Fence>, DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        Ok(Arc::new(HeadlessFence {
            id: self.shared.ids.next(),
            state: Arc::new(FenceState::default()),
            shared: self.shared.clone(),
        }))
    }

    fn create_command_list_pool(
        &self,
        desc: &CommandListPoolDesc,
    ) -> Result<Box<dyn CommandListPool>, DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        let lists = (0..desc.num_command_lists)
            .map(|_| {
                Box::new(HeadlessCommandList::new(
                    self.shared.ids.next(),
                    desc.queue_type,
                    self.shared.clone(),
                )) as Box<dyn CommandList>
            })
            .collect();

        #[cfg(feature = "logging")]
        log::debug!(
            "Created {} pool with {} command list(s)",
            desc.queue_type,
            desc.num_command_lists
        );

        Ok(Box::new(HeadlessPool {
            queue_type: desc.queue_type,
            lists,
        }))
    }

    fn wait_idle(&self) -> Result<(), DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        self.retire_submissions();
        Ok(())
    }
}
