// Shader module loading and management
//
// Vulkan uses SPIR-V bytecode for shaders. This module provides
// utilities to load compiled shaders and create shader modules.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use super::VulkanDevice;

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module(device: &VulkanDevice, bytes: &[u8]) -> Result<vk::ShaderModule> {
    // read_spv handles the byte-to-word conversion and validates alignment
    let mut cursor = std::io::Cursor::new(bytes);
    let code = ash::util::read_spv(&mut cursor).context("Invalid SPIR-V bytecode")?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

/// Load a compiled .spv file from disk and create a shader module
pub fn load_shader<P: AsRef<Path>>(device: &VulkanDevice, path: P) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader {:?} (run glslc? see build.rs)", path))?;
    create_shader_module(device, &bytes)
}
