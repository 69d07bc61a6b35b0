// Shader module loading
//
// The triangle shaders are precompiled SPIR-V read from disk at startup.
// A missing, empty or malformed file aborts the bootstrap.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use crate::error::BootstrapError;

/// Read a SPIR-V binary into 32-bit words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>, BootstrapError> {
    let bytes = std::fs::read(path).map_err(|source| BootstrapError::ShaderUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(BootstrapError::ShaderEmpty {
            path: path.to_path_buf(),
        });
    }

    // read_spv checks word alignment and the magic number, and fixes endianness
    ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|source| BootstrapError::InvalidSpirv {
        path: path.to_path_buf(),
        source,
    })
}

pub fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe { device.create_shader_module(&create_info, None) }
        .context("Failed to create shader module")
}
