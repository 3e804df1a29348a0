// Descriptor layout, pool, and per-image sets
//
// One uniform buffer + one combined image sampler per swapchain image. The
// pool is sized exactly to the image count and torn down wholesale on
// swapchain recreation; sets are never freed individually.

use anyhow::{Context, Result};
use ash::vk;

use super::buffer::Buffer;
use super::texture::Texture;
use super::VulkanDevice;

/// Binding 0: transforms UBO (vertex stage). Binding 1: texture sampler
/// (fragment stage).
pub fn create_descriptor_set_layout(device: &VulkanDevice) -> Result<vk::DescriptorSetLayout> {
    let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .build();

    let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(1)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::FRAGMENT)
        .build();

    let bindings = [ubo_binding, sampler_binding];
    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    unsafe {
        device
            .device
            .create_descriptor_set_layout(&layout_info, None)
            .context("Failed to create descriptor set layout")
    }
}

/// Pool capacity: image_count of each descriptor type, image_count sets
pub fn pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: image_count,
        },
    ]
}

pub fn create_descriptor_pool(
    device: &VulkanDevice,
    image_count: u32,
) -> Result<vk::DescriptorPool> {
    let sizes = pool_sizes(image_count);
    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(&sizes)
        .max_sets(image_count);

    unsafe {
        device
            .device
            .create_descriptor_pool(&pool_info, None)
            .context("Failed to create descriptor pool")
    }
}

/// Allocate and write one set per swapchain image, each binding that
/// image's uniform buffer and the shared texture.
pub fn allocate_descriptor_sets(
    device: &VulkanDevice,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    uniform_buffers: &[Buffer],
    texture: &Texture,
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; uniform_buffers.len()];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe {
        device
            .device
            .allocate_descriptor_sets(&alloc_info)
            .context("Failed to allocate descriptor sets")?
    };

    for (set, buffer) in sets.iter().zip(uniform_buffers) {
        let buffer_info = vk::DescriptorBufferInfo::builder()
            .buffer(buffer.buffer)
            .offset(0)
            .range(buffer.size)
            .build();

        let image_info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(texture.view)
            .sampler(texture.sampler)
            .build();

        let buffer_infos = [buffer_info];
        let image_infos = [image_info];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_infos)
                .build(),
        ];

        unsafe {
            device.device.update_descriptor_sets(&writes, &[]);
        }
    }

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sized_per_image_and_type() {
        let sizes = pool_sizes(3);
        assert_eq!(sizes.len(), 2);
        for size in &sizes {
            assert_eq!(size.descriptor_count, 3);
        }
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }
}
