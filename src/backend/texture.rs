// Images: sampled textures and the depth target
//
// Textures are uploaded from raw RGBA pixels through a staging buffer with
// explicit layout transitions. The depth target lives and dies with the
// swapchain extent.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::buffer::{self, Buffer};
use super::VulkanDevice;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// A sampled 2D texture (image + view + sampler)
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    allocation: Option<Allocation>,
}

impl Texture {
    /// Upload raw RGBA8 pixels into a device-local sampled image
    pub fn from_rgba8(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        anyhow::ensure!(
            pixels.len() == (width * height * 4) as usize,
            "pixel buffer size does not match {}x{} RGBA",
            width,
            height
        );

        let format = vk::Format::R8G8B8A8_SRGB;

        let mut staging = Buffer::new(
            device,
            "texture staging",
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(pixels)?;

        let (image, allocation) = create_image(
            device,
            "texture",
            width,
            height,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        // UNDEFINED -> TRANSFER_DST, copy, TRANSFER_DST -> SHADER_READ_ONLY
        transition_image_layout(
            device,
            command_pool,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        copy_buffer_to_image(device, command_pool, staging.buffer, image, width, height)?;
        transition_image_layout(
            device,
            command_pool,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        staging.destroy(device);

        let view = create_image_view(device, image, format, vk::ImageAspectFlags::COLOR)?;
        let sampler = create_sampler(device)?;

        Ok(Self {
            image,
            view,
            sampler,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_sampler(self.sampler, None);
            device.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = device.allocator().free(allocation);
        }
        unsafe {
            device.device.destroy_image(self.image, None);
        }
    }
}

/// Depth attachment sized to the swapchain extent; rebuilt on recreation
pub struct DepthTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl DepthTarget {
    pub fn new(device: &VulkanDevice, extent: vk::Extent2D) -> Result<Self> {
        let (image, allocation) = create_image(
            device,
            "depth target",
            extent.width,
            extent.height,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let view = create_image_view(device, image, DEPTH_FORMAT, vk::ImageAspectFlags::DEPTH)?;

        Ok(Self {
            image,
            view,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            let _ = device.allocator().free(allocation);
        }
        unsafe {
            device.device.destroy_image(self.image, None);
        }
    }
}

fn create_image(
    device: &VulkanDevice,
    name: &str,
    width: u32,
    height: u32,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> Result<(vk::Image, Allocation)> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .samples(vk::SampleCountFlags::TYPE_1)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe {
        device
            .device
            .create_image(&image_info, None)
            .context("Failed to create image")?
    };

    let requirements = unsafe { device.device.get_image_memory_requirements(image) };

    let allocation = device.allocator().allocate(&AllocationCreateDesc {
        name,
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;

    unsafe {
        device
            .device
            .bind_image_memory(image, allocation.memory(), allocation.offset())
            .context("Failed to bind image memory")?;
    }

    Ok((image, allocation))
}

fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .device
            .create_image_view(&view_info, None)
            .context("Failed to create image view")
    }
}

fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    // Anisotropy is guaranteed by the device suitability predicate
    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(device.max_sampler_anisotropy())
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

    unsafe {
        device
            .device
            .create_sampler(&sampler_info, None)
            .context("Failed to create sampler")
    }
}

/// Transition an image between the layouts the upload path uses. Anything
/// else is a configuration bug, not a runtime condition.
fn transition_image_layout(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => anyhow::bail!(
            "Unsupported layout transition: {:?} -> {:?}",
            old_layout,
            new_layout
        ),
    };

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build();

    let cmd = buffer::begin_one_time_commands(device, command_pool)?;
    unsafe {
        device.device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    buffer::end_one_time_commands(device, command_pool, cmd)
}

fn copy_buffer_to_image(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    let region = vk::BufferImageCopy::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .build();

    let cmd = buffer::begin_one_time_commands(device, command_pool)?;
    unsafe {
        device.device.cmd_copy_buffer_to_image(
            cmd,
            src,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }
    buffer::end_one_time_commands(device, command_pool, cmd)
}
