use thiserror::Error;

///Errors a backend reports through the device contracts. The graph surfaces them verbatim and never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device was lost")]
    DeviceLost,
    #[error("Swapchain is out of date")]
    OutOfDate,
    #[error("Device ran out of memory")]
    OutOfMemory,
    #[error("Object is in an invalid state: {0}")]
    InvalidState(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DeviceError {
    ///True for errors after which no further work can be submitted to the device.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::DeviceLost | DeviceError::OutOfMemory)
    }
}
