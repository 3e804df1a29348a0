// Buffer utilities for vertex, index, and uniform buffers
//
// All memory comes from the device's gpu-allocator. Host-visible buffers
// stay persistently mapped; device-local buffers are filled through a
// staging copy.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::VulkanDevice;

/// A GPU buffer and its backing allocation
pub struct Buffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
}

impl Buffer {
    pub fn new(
        device: &VulkanDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        Ok(Self {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Uniform buffer: host-visible, host-coherent, persistently mapped.
    /// Writes need no explicit flush with this memory type.
    pub fn uniform(device: &VulkanDevice, name: &str, size: vk::DeviceSize) -> Result<Self> {
        Self::new(
            device,
            name,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )
    }

    /// Copy `data` into the mapped allocation. Only valid for host-visible
    /// buffers; the caller is responsible for fence-gating GPU reads.
    pub fn write<T: Copy>(&mut self, data: &[T]) -> Result<()> {
        let byte_len = std::mem::size_of_val(data);
        anyhow::ensure!(
            byte_len as vk::DeviceSize <= self.size,
            "write of {} bytes exceeds buffer size {}",
            byte_len,
            self.size
        );

        let mapped = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .context("Buffer is not host-visible")?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr() as *const u8,
                mapped.as_ptr() as *mut u8,
                byte_len,
            );
        }
        Ok(())
    }

    pub fn write_value<T: Copy>(&mut self, value: &T) -> Result<()> {
        self.write(std::slice::from_ref(value))
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            let _ = device.allocator().free(allocation);
        }
        unsafe {
            device.device.destroy_buffer(self.buffer, None);
        }
        self.buffer = vk::Buffer::null();
    }
}

/// Upload `data` into a device-local buffer through a staging copy
pub fn create_device_local_buffer<T: Copy>(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<Buffer> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let mut staging = Buffer::new(
        device,
        "staging",
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    staging.write(data)?;

    let buffer = Buffer::new(
        device,
        "device-local",
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
    )?;

    let cmd = begin_one_time_commands(device, command_pool)?;
    let region = vk::BufferCopy::builder().size(size).build();
    unsafe {
        device
            .device
            .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
    }
    end_one_time_commands(device, command_pool, cmd)?;

    staging.destroy(device);

    Ok(buffer)
}

/// Begin a throwaway command buffer for setup work (uploads, transitions)
pub fn begin_one_time_commands(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
) -> Result<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info)? }[0];

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device.device.begin_command_buffer(cmd, &begin_info)?;
    }

    Ok(cmd)
}

/// Submit and wait for a one-time command buffer, then free it
pub fn end_one_time_commands(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
) -> Result<()> {
    unsafe {
        device.device.end_command_buffer(cmd)?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        device
            .device
            .queue_submit(device.graphics_queue, &[submit_info.build()], vk::Fence::null())?;
        // Setup-time only; a fence would be overkill here
        device.device.queue_wait_idle(device.graphics_queue)?;

        device.device.free_command_buffers(command_pool, &command_buffers);
    }
    Ok(())
}
