// Swapchain - Window presentation
//
// Negotiates format, present mode, extent and image count with the surface,
// then creates the swapchain and one view per image. Nothing here is ever
// recreated: no resize handling.

use anyhow::{Context, Result};
use ash::vk;

use super::selection::{QueueFamilies, SurfaceSupport};
use crate::error::BootstrapError;

/// Preferred surface format: 8-bit BGRA in the sRGB color space
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Surface-reported width meaning "the swapchain decides the extent"
const UNDEFINED_EXTENT: u32 = u32::MAX;

/// Everything negotiated with the surface before creating the swapchain
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    pub fn negotiate(support: &SurfaceSupport, width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            format: choose_surface_format(&support.formats).ok_or(BootstrapError::NoSurfaceFormat)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: choose_image_count(&support.capabilities),
        })
    }
}

/// The preferred format wherever it appears, otherwise the first one listed.
/// There is no ranking among the other formats.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX (triple buffering) when offered, else FIFO which is always supported
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface extent, unless the surface leaves it to us
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != UNDEFINED_EXTENT {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: clamp_axis(width, caps.min_image_extent.width, caps.max_image_extent.width),
        height: clamp_axis(height, caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

// Not `u32::clamp`: that panics when a driver reports min > max
fn clamp_axis(value: u32, min: u32, max: u32) -> u32 {
    min.max(max.min(value))
}

/// One more than the minimum, capped by the maximum (0 means no maximum)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// Image sharing across the graphics and present families
pub fn sharing_mode(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, vec![families.graphics, families.present])
    }
}

pub fn create_swapchain(
    loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    support: &SurfaceSupport,
    config: &SwapchainConfig,
    families: &QueueFamilies,
) -> Result<vk::SwapchainKHR> {
    let (sharing, family_indices) = sharing_mode(families);

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(config.image_count)
        .image_format(config.format.format)
        .image_color_space(config.format.color_space)
        .image_extent(config.extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing)
        .queue_family_indices(&family_indices)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(config.present_mode)
        .clipped(true);

    unsafe { loader.create_swapchain(&create_info, None) }.context("Failed to create swap chain")
}

pub fn create_image_view(device: &ash::Device, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.context("Failed to create image view")
}
