// Fatal backend conditions
//
// Everything here means the environment cannot run the renderer.
// They travel inside anyhow::Error and unwind to main.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("No Vulkan-capable GPU found")]
    NoDevices,

    #[error("No GPU satisfies the renderer's requirements")]
    NoSuitableDevice,

    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("Format {0:?} does not support linear blitting")]
    LinearBlitUnsupported(vk::Format),

    #[error("None of the candidate formats {0:?} is supported")]
    NoSupportedFormat(Vec<vk::Format>),

    #[error("Shader binary {0:?} is empty")]
    EmptyShader(std::path::PathBuf),
}
