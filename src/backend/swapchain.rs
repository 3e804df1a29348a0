// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Format/present-mode/extent negotiation is kept in pure functions over the
// queried capability data so it can be tested without a device.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::WindowSurface;
use super::VulkanDevice;

/// Outcome of an image acquire. Staleness is ordinary control flow (the
/// caller recreates the swapchain and retries next tick), never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredImage {
    /// An image was claimed. `suboptimal` means present will still work but
    /// the swapchain should be rebuilt once this frame completes.
    Ready { index: u32, suboptimal: bool },
    /// The surface changed under us; nothing was acquired.
    Stale,
}

/// Outcome of a present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Ok { suboptimal: bool },
    Stale,
}

/// Prefer 8-bit BGRA with non-linear sRGB; fall back to whatever the
/// platform offers first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when offered (low latency, no tearing), otherwise FIFO, which
/// every implementation must support. Never any third mode.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// If the platform reports the "any size" sentinel, derive the extent from
/// the framebuffer pixel size (not logical coordinates) clamped to the
/// reported bounds; otherwise the platform extent is authoritative.
pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    fb_width: u32,
    fb_height: u32,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: fb_width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: fb_height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// `min + 1` so we never stall on driver-internal image reuse, clamped to
/// the maximum when the driver declares one (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        count = caps.max_image_count;
    }
    count
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Negotiate and create the swapchain for the given framebuffer pixel
    /// size. The caller guarantees the size is nonzero.
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: &WindowSurface,
        fb_width: u32,
        fb_height: u32,
    ) -> Result<Self> {
        let surface_caps = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(device.physical_device, surface.handle)
        }?;

        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device.physical_device, surface.handle)
        }?;

        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(device.physical_device, surface.handle)
        }?;

        let surface_format =
            choose_surface_format(&formats).context("No surface formats offered")?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&surface_caps, fb_width, fb_height);
        let image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        // Images must be shareable across families when graphics and present
        // differ; exclusive ownership otherwise.
        let family_indices = [device.graphics_queue_family, device.present_queue_family];
        let (sharing_mode, family_slice): (vk::SharingMode, &[u32]) =
            if device.graphics_queue_family != device.present_queue_family {
                (vk::SharingMode::CONCURRENT, &family_indices)
            } else {
                (vk::SharingMode::EXCLUSIVE, &[])
            };

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // The driver may hand back more images than requested
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;

        log::info!("Swapchain created with {} images", images.len());

        let image_views: Result<Vec<_>> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
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

                unsafe {
                    device
                        .device
                        .create_image_view(&create_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect();

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views: image_views?,
            format: surface_format.format,
            extent,
            device,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image, signaling `semaphore` on the GPU timeline
    /// once the image is actually free. Infinite wait; a hung GPU is not
    /// recoverable here.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquiredImage> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::Stale),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Queue the image for presentation, gated on `wait_semaphores`
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<Presented> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(Presented::Ok { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        min_count: u32,
        max_count: u32,
        current: (u32, u32),
        min_extent: (u32, u32),
        max_extent: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min_extent.0,
                height: min_extent.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_extent.0,
                height: max_extent.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_bgra_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_falls_back_to_first_offered() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn format_empty_is_none() {
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_never_picks_a_third_mode() {
        // IMMEDIATE offered, MAILBOX not: must still land on FIFO
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO_RELAXED,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_platform_value_when_fixed() {
        let caps = caps(2, 4, (800, 600), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_from_framebuffer_when_sentinel() {
        let caps = caps(2, 4, (u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn extent_clamped_to_capability_bounds() {
        let caps = caps(2, 4, (u32::MAX, u32::MAX), (640, 480), (1600, 900));
        let small = choose_extent(&caps, 100, 100);
        assert_eq!((small.width, small.height), (640, 480));
        let big = choose_extent(&caps, 5000, 5000);
        assert_eq!((big.width, big.height), (1600, 900));
    }

    #[test]
    fn image_count_is_min_plus_one() {
        let caps = caps(2, 4, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_clamped_to_max() {
        let caps = caps(3, 3, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_unbounded_when_max_zero() {
        let caps = caps(4, 0, (800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 5);
    }

    #[test]
    fn negotiation_scenario_sentinel_1080p() {
        // min=2, max=4, sentinel extent, framebuffer 1920x1080
        let caps = caps(2, 4, (u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (1920, 1080));
        assert_eq!(choose_image_count(&caps), 3);
    }
}
