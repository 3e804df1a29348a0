// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// The scheduler bounds in-flight frames to N slots and tracks, per swapchain
// image, which slot fence last claimed it. The claim bookkeeping is kept as
// plain handle math so it can be tested without a device.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Created signaled so the first wait on each slot passes immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: device.device.create_fence(&fence_info, None)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Rotating frame slots plus the per-image fence map.
///
/// The slot index lives here, not in a global; resize and recreation events
/// reach the scheduler through its owner once per tick.
pub struct FrameScheduler {
    frames: Vec<FrameSync>,
    current: usize,
    /// Swapchain image index -> fence of the slot currently using it
    /// (null = free). Waiting this fence before reuse is what prevents a new
    /// frame from overwriting an image the GPU is still reading.
    images_in_flight: Vec<vk::Fence>,
}

impl FrameScheduler {
    pub fn new(device: &Arc<VulkanDevice>, frames_in_flight: usize) -> Result<Self> {
        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(device))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frames,
            current: 0,
            images_in_flight: Vec::new(),
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> &FrameSync {
        &self.frames[self.current]
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
    }

    /// Reset the fence map for a fresh image set (swapchain recreation)
    pub fn track_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, vk::Fence::null());
    }

    pub fn tracked_images(&self) -> usize {
        self.images_in_flight.len()
    }

    /// The fence that must be signaled before `image_index` may be written
    /// again, if any. The current slot's own fence was already waited this
    /// tick, so only a *different* slot's claim blocks.
    fn blocking_fence(&self, image_index: u32) -> Option<vk::Fence> {
        let fence = self.images_in_flight[image_index as usize];
        if fence == vk::Fence::null() || fence == self.current().in_flight_fence {
            None
        } else {
            Some(fence)
        }
    }

    fn stamp(&mut self, image_index: u32) {
        self.images_in_flight[image_index as usize] = self.current().in_flight_fence;
    }

    /// Block until the current slot's previous submission (N frames ago) has
    /// retired. This is the bound on CPU run-ahead.
    pub fn wait_for_slot(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.wait_for_fences(&[self.current().in_flight_fence], true, u64::MAX)?;
        }
        Ok(())
    }

    /// Cross-check: if an older, out-of-order frame still holds this image,
    /// wait it out, then stamp the map with the current slot's fence. After
    /// this returns the image's per-frame resources are safe to mutate.
    pub fn claim_image(&mut self, device: &ash::Device, image_index: u32) -> Result<()> {
        if let Some(fence) = self.blocking_fence(image_index) {
            unsafe {
                device.wait_for_fences(&[fence], true, u64::MAX)?;
            }
        }
        self.stamp(image_index);
        Ok(())
    }

    /// Unsignal the current slot's fence just before submission
    pub fn reset_current_fence(&self, device: &ash::Device) -> Result<()> {
        unsafe {
            device.reset_fences(&[self.current().in_flight_fence])?;
        }
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        for frame in &self.frames {
            frame.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    /// Scheduler with synthetic handles, no device required
    fn scheduler(slot_fences: &[u64], image_count: usize) -> FrameScheduler {
        let frames = slot_fences
            .iter()
            .map(|&raw| FrameSync {
                image_available: vk::Semaphore::null(),
                render_finished: vk::Semaphore::null(),
                in_flight_fence: fence(raw),
            })
            .collect();
        let mut s = FrameScheduler {
            frames,
            current: 0,
            images_in_flight: Vec::new(),
        };
        s.track_images(image_count);
        s
    }

    #[test]
    fn slots_cycle_modulo_n() {
        let mut s = scheduler(&[1, 2], 3);
        assert_eq!(s.current().in_flight_fence, fence(1));
        s.advance();
        assert_eq!(s.current().in_flight_fence, fence(2));
        s.advance();
        assert_eq!(s.current().in_flight_fence, fence(1));
    }

    #[test]
    fn free_image_has_no_blocking_fence() {
        let s = scheduler(&[1, 2], 3);
        assert_eq!(s.blocking_fence(0), None);
        assert_eq!(s.blocking_fence(2), None);
    }

    #[test]
    fn image_claimed_by_other_slot_blocks() {
        let mut s = scheduler(&[1, 2], 3);
        s.stamp(1); // slot 0 claims image 1
        s.advance();
        // Slot 1 reusing image 1 must wait slot 0's fence
        assert_eq!(s.blocking_fence(1), Some(fence(1)));
    }

    #[test]
    fn image_claimed_by_current_slot_does_not_block() {
        let mut s = scheduler(&[1, 2], 3);
        s.stamp(1);
        // Same slot coming back around (its fence was already waited)
        assert_eq!(s.blocking_fence(1), None);
    }

    #[test]
    fn stamp_overwrites_previous_claim() {
        let mut s = scheduler(&[1, 2], 3);
        s.stamp(0);
        s.advance();
        s.stamp(0);
        s.advance();
        // Back at slot 0: image 0 now belongs to slot 1's fence
        assert_eq!(s.blocking_fence(0), Some(fence(2)));
    }

    #[test]
    fn track_images_resets_all_claims() {
        let mut s = scheduler(&[1, 2], 3);
        s.stamp(0);
        s.stamp(2);
        s.track_images(4);
        assert_eq!(s.tracked_images(), 4);
        s.advance();
        for i in 0..4 {
            assert_eq!(s.blocking_fence(i), None);
        }
    }

    #[test]
    fn fence_map_length_follows_image_count() {
        let mut s = scheduler(&[1, 2], 3);
        assert_eq!(s.tracked_images(), 3);
        s.track_images(5);
        assert_eq!(s.tracked_images(), 5);
        s.track_images(2);
        assert_eq!(s.tracked_images(), 2);
    }
}
