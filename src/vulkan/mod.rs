mod backend;
mod context;
mod debug;
mod device;
mod device_context;
mod frame;
mod instance;
mod physical;
mod recorder;

pub use backend::VulkanDevice;

pub use context::VulkanContext;

pub use device_context::DeviceContext;

pub use frame::Frame;
pub use physical::QueueFamily;
pub use recorder::VulkanRecorder;
