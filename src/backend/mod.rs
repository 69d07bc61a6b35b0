// Backend module - Vulkan bootstrap
//
// Design: thin functions over ash, one per step of the sequence, with the
// decision logic (device selection, surface negotiation) kept driver-free.

pub mod context;
pub mod device;
pub mod pipeline;
pub mod selection;
pub mod shader;
pub mod swapchain;
pub mod teardown;

pub use context::VulkanContext;
