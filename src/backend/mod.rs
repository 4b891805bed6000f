// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with paired handle/memory ownership
// Every wrapper holds an Arc<VulkanDevice> so the device outlives it

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use buffer::Buffer;
pub use device::VulkanDevice;
pub use error::BackendError;
pub use swapchain::Swapchain;
