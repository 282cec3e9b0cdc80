pub mod buffer;
pub mod device;
pub mod framegraph;
pub mod image;
pub mod vulkan;
