use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use frameloom::{DeviceError, PresentResult, Semaphore, Swapchain, TextureHandle};
use parking_lot::Mutex;

use crate::{
    device::Shared,
    journal::Event,
    sync::semaphore_id,
};

///Swapchain that hands out its images round robin.
pub struct HeadlessSwapchain {
    images: Vec<TextureHandle>,
    next: AtomicU32,
    fail_next_present: Mutex<Option<DeviceError>>,
    shared: Arc<Shared>,
}

impl HeadlessSwapchain {
    pub(crate) fn new(shared: Arc<Shared>, images: Vec<TextureHandle>) -> Self {
        HeadlessSwapchain {
            images,
            next: AtomicU32::new(0),
            fail_next_present: Mutex::new(None),
            shared,
        }
    }

    ///Makes the next `present` call fail with `error`.
    pub fn fail_next_present(&self, error: DeviceError) {
        *self.fail_next_present.lock() = Some(error);
    }

    pub fn images(&self) -> &[TextureHandle] {
        &self.images
    }
}

impl Swapchain for HeadlessSwapchain {
    fn acquire_next_image(&self, signal: &dyn Semaphore) -> Result<u32, DeviceError> {
        if self.shared.is_lost() {
            return Err(DeviceError::DeviceLost);
        }
        if self.images.is_empty() {
            return Err(DeviceError::InvalidState(
                "swapchain has no images".to_owned(),
            ));
        }

        let image = self.next.fetch_add(1, Ordering::SeqCst) % self.images.len() as u32;
        self.shared.journal.push(Event::Acquire {
            semaphore: semaphore_id(signal).unwrap_or(0),
            image,
        });
        Ok(image)
    }

    fn present(
        &self,
        wait: &[&dyn Semaphore],
        image_index: u32,
    ) -> Result<PresentResult, DeviceError> {
        if let Some(err) = self.fail_next_present.lock().take() {
            return Err(err);
        }
        self.shared.journal.push(Event::Present {
            wait: wait.iter().filter_map(|s| semaphore_id(*s)).collect(),
            image: image_index,
        });
        Ok(PresentResult::Success)
    }

    fn render_target(&self, image_index: u32) -> TextureHandle {
        self.images[image_index as usize % self.images.len()].clone()
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }
}
