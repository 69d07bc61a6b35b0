// Fatal bootstrap signals
//
// Everything else travels as a plain anyhow error with context. These are the
// failures a caller (or a test) needs to tell apart, recovered from an
// `anyhow::Error` with `downcast_ref::<BootstrapError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("validation layers requested, but not available: {}", .missing.join(", "))]
    ValidationLayersUnavailable { missing: Vec<String> },

    #[error("failed to find GPUs with Vulkan support")]
    NoVulkanDevice,

    #[error("failed to find a suitable GPU")]
    NoSuitableDevice,

    #[error("queue family set is incomplete (graphics: {graphics:?}, present: {present:?})")]
    IncompleteQueueFamilies {
        graphics: Option<u32>,
        present: Option<u32>,
    },

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("failed to open shader file {}", .path.display())]
    ShaderUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader file {} is empty", .path.display())]
    ShaderEmpty { path: PathBuf },

    #[error("shader file {} is not valid SPIR-V", .path.display())]
    InvalidSpirv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
