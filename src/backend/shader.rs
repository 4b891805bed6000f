// Shader module loading
//
// Shaders arrive as pre-compiled SPIR-V blobs on disk (see build.rs).
// The whole file is read up front; an empty or unreadable file is fatal.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::{BackendError, VulkanDevice};

/// Read a SPIR-V binary from disk into 4-byte words
pub fn read_shader_file(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader binary {:?}", path))?;
    parse_spirv(&bytes, path)
}

/// Reinterpret raw bytes as SPIR-V words, handling alignment and endianness
pub fn parse_spirv(bytes: &[u8], path: &Path) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(BackendError::EmptyShader(path.to_path_buf()).into());
    }

    ash::util::read_spv(&mut std::io::Cursor::new(bytes))
        .with_context(|| format!("Invalid SPIR-V in {:?}", path))
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn empty_binary_is_rejected() {
        let err = parse_spirv(&[], Path::new("empty.spv")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BackendError>(),
            Some(BackendError::EmptyShader(p)) if p == Path::new("empty.spv")
        ));
    }

    #[test]
    fn truncated_binary_is_rejected() {
        assert!(parse_spirv(&[0x03, 0x02, 0x23], Path::new("short.spv")).is_err());
    }

    #[test]
    fn words_are_read_whole() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());

        let words = parse_spirv(&bytes, Path::new("ok.spv")).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_shader_file("definitely/not/here.spv").unwrap_err();
        assert!(err.to_string().contains("Failed to read shader binary"));
    }
}
