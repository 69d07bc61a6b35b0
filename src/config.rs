// =============================================================================
// CONFIGURATION - Fixed settings
// =============================================================================
//
// Nothing here is read from a file or the command line. The only runtime knob
// is RUST_LOG, handled by env_logger.

/// Window title
pub const WINDOW_TITLE: &str = "Vulkan";

/// Window size, also the swapchain extent when the surface leaves it open
pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

/// Precompiled SPIR-V binaries, relative to the working directory
pub const VERT_SHADER_PATH: &str = "shaders/vert.spv";
pub const FRAG_SHADER_PATH: &str = "shaders/frag.spv";

/// Khronos validation is requested in debug builds only
pub const ENABLE_VALIDATION_LAYERS: bool = cfg!(debug_assertions);

/// Log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "info";
