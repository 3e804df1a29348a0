// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics

pub mod buffer;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use device::{VulkanDevice, WindowSurface};
pub use swapchain::Swapchain;
