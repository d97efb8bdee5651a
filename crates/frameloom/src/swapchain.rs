use crate::{DeviceError, Semaphore, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Success,
    ///Presented, but the swapchain no longer matches the surface exactly. Recreating it is advised.
    Suboptimal,
}

///Presentation surface with a fixed ring of images.
pub trait Swapchain: Send + Sync {
    ///Acquires the next image. `signal` is signaled once the image may be rendered to.
    fn acquire_next_image(&self, signal: &dyn Semaphore) -> Result<u32, DeviceError>;
    ///Queues `image_index` for presentation once all `wait` semaphores are signaled.
    fn present(
        &self,
        wait: &[&dyn Semaphore],
        image_index: u32,
    ) -> Result<PresentResult, DeviceError>;
    fn render_target(&self, image_index: u32) -> TextureHandle;
    fn image_count(&self) -> u32;
}
