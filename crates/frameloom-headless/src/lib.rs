//! # frameloom-headless
//!
//! A backend for the frameloom contracts that never touches a GPU. Every call made through the contracts is appended to
//! a [Journal], which makes the backend useful to test and inspect what a render graph does each frame.
//!
//! "GPU work" retires the moment it is submitted, unless [HeadlessDesc::deferred_completion] is set. In that case
//! fences only signal when [HeadlessDevice::retire_submissions] is called, which lets tests observe blocking frame slots.

pub mod command_list;
pub mod device;
pub mod journal;
pub mod resources;
pub mod swapchain;
pub mod sync;

pub use command_list::HeadlessCommandList;
pub use device::{HeadlessDesc, HeadlessDevice};
pub use journal::{BarrierRecord, Event, ExecuteRecord, Journal};
pub use resources::{HeadlessBuffer, HeadlessTexture};
pub use swapchain::HeadlessSwapchain;
pub use sync::{HeadlessFence, HeadlessSemaphore, semaphore_id};
