use std::{any::Any, sync::Arc};

use frameloom::{DeviceError, Fence, Semaphore};
use parking_lot::{Condvar, Mutex};

use crate::{device::Shared, journal::Event};

#[derive(Debug)]
pub struct HeadlessSemaphore {
    pub id: u64,
}

impl Semaphore for HeadlessSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

///Id of a semaphore created by the headless device.
pub fn semaphore_id(semaphore: &dyn Semaphore) -> Option<u64> {
    semaphore
        .as_any()
        .downcast_ref::<HeadlessSemaphore>()
        .map(|s| s.id)
}

#[derive(Debug, Default)]
pub(crate) struct FenceState {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl FenceState {
    pub(crate) fn signal(&self) {
        *self.signaled.lock() = true;
        self.cond.notify_all();
    }

    ///Wakes waiters without signaling, they re-check the device state.
    pub(crate) fn wake(&self) {
        let _guard = self.signaled.lock();
        self.cond.notify_all();
    }
}

pub struct HeadlessFence {
    pub id: u64,
    pub(crate) state: Arc<FenceState>,
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for HeadlessFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessFence")
            .field("id", &self.id)
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

impl Fence for HeadlessFence {
    fn wait(&self) -> Result<(), DeviceError> {
        self.shared.count_fence_wait();
        self.shared.journal.push(Event::FenceWait { fence: self.id });

        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            if self.shared.is_lost() {
                return Err(DeviceError::DeviceLost);
            }
            self.state.cond.wait(&mut signaled);
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), DeviceError> {
        self.shared.journal.push(Event::FenceReset { fence: self.id });
        *self.state.signaled.lock() = false;
        Ok(())
    }

    fn is_signaled(&self) -> bool {
        *self.state.signaled.lock()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
