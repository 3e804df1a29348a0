// =============================================================================
// VKFRAME - Vulkan presentation and frame-lifecycle engine
// =============================================================================
//
// Single-threaded frame loop over an ash-based backend:
//
// FRAME FLOW:
// 1. Wait the current frame slot's fence (bounds CPU run-ahead to N frames)
// 2. Acquire a swapchain image (stale surface aborts the frame and triggers
//    recreation)
// 3. Cross-check the image against the in-flight fence map, stamp it
// 4. Write this image's uniform buffer
// 5. Submit the pre-recorded command buffer, gated on the acquire semaphore
// 6. Present, gated on the render-finished semaphore
// 7. Advance the frame slot
//
// Swapchain-dependent resources (depth, framebuffers, pipeline, uniform
// buffers, descriptor sets, command buffers) are rebuilt together whenever
// the surface goes stale or the window resizes.
//
// =============================================================================

mod backend;
mod config;
mod mesh;

use anyhow::{Context, Result};
use ash::vk;
use backend::buffer::{self, Buffer};
use backend::descriptor;
use backend::pipeline;
use backend::shader;
use backend::sync::FrameScheduler;
use backend::texture::{DepthTarget, Texture};
use backend::{Swapchain, VulkanDevice, WindowSurface};
use config::Config;
use mesh::{Mesh, Transforms};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging();
    log::info!("Starting vkframe");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding all Vulkan resources.
///
/// IMPORTANT: teardown order matters. Drop tears down swapchain-dependent
/// resources, then static resources, then the surface; the device goes last
/// when its Arc count reaches zero.
pub struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW & SURFACE
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    surface: Option<WindowSurface>,
    is_fullscreen: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // STATIC RESOURCES (outlive swapchain recreation)
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: Option<vk::CommandPool>,
    vertex_buffer: Option<Buffer>,
    index_buffer: Option<Buffer>,
    index_count: u32,
    texture: Option<Texture>,
    descriptor_set_layout: Option<vk::DescriptorSetLayout>,

    // ─────────────────────────────────────────────────────────────────────────
    // SWAPCHAIN-DEPENDENT RESOURCES (rebuilt together on recreation)
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: Option<vk::RenderPass>,
    pipeline: Option<vk::Pipeline>,
    pipeline_layout: Option<vk::PipelineLayout>,
    depth_target: Option<DepthTarget>,
    framebuffers: Vec<vk::Framebuffer>,
    /// One uniform buffer per swapchain image
    uniform_buffers: Vec<Buffer>,
    descriptor_pool: Option<vk::DescriptorPool>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    /// One pre-recorded command buffer per swapchain image
    command_buffers: Vec<vk::CommandBuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // SYNCHRONIZATION
    // ─────────────────────────────────────────────────────────────────────────
    scheduler: Option<FrameScheduler>,
    wait_stages: [vk::PipelineStageFlags; 1],

    // ─────────────────────────────────────────────────────────────────────────
    // STATE FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    /// Set by the resize event or a stale/suboptimal surface, polled once
    /// per frame
    needs_resize: bool,
    /// Window has a zero-sized framebuffer; park in the event wait
    is_minimized: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // TIMING
    // ─────────────────────────────────────────────────────────────────────────
    start_time: Instant,
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            window: None,
            surface: None,
            is_fullscreen,
            device: None,
            swapchain: None,
            command_pool: None,
            vertex_buffer: None,
            index_buffer: None,
            index_count: 0,
            texture: None,
            descriptor_set_layout: None,
            render_pass: None,
            pipeline: None,
            pipeline_layout: None,
            depth_target: None,
            framebuffers: Vec::new(),
            uniform_buffers: Vec::new(),
            descriptor_pool: None,
            descriptor_sets: Vec::new(),
            command_buffers: Vec::new(),
            scheduler: None,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            needs_resize: false,
            is_minimized: false,
            start_time: now,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Initialize all Vulkan resources.
    ///
    /// Called once when the window is created:
    /// 1. Device + surface (selection happens against the surface)
    /// 2. Command pool, mesh upload, texture upload
    /// 3. Frame scheduler
    /// 4. Swapchain and everything hanging off it
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;

        let (display_handle, window_handle) = {
            use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
            (window.raw_display_handle(), window.raw_window_handle())
        };

        let (device, surface) = VulkanDevice::new(
            &self.config.window.title,
            enable_validation,
            display_handle,
            window_handle,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Static resources: command pool, geometry, texture, set layout
        // ─────────────────────────────────────────────────────────────────────
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None)? };

        let mesh = Mesh::demo_quads();
        log::info!(
            "Mesh: {} unique vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        let vertex_buffer = buffer::create_device_local_buffer(
            &device,
            command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &mesh.vertices,
        )?;
        let index_buffer = buffer::create_device_local_buffer(
            &device,
            command_pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &mesh.indices,
        )?;

        let texture_size = 256;
        let pixels = mesh::checkerboard_pixels(texture_size);
        let texture =
            Texture::from_rgba8(&device, command_pool, &pixels, texture_size, texture_size)?;

        let descriptor_set_layout = descriptor::create_descriptor_set_layout(&device)?;

        // ─────────────────────────────────────────────────────────────────────
        // Frame scheduler (independent of swapchain image count)
        // ─────────────────────────────────────────────────────────────────────
        let scheduler = FrameScheduler::new(&device, self.config.frames_in_flight())?;
        log::info!("Frames in flight: {}", scheduler.frames_in_flight());

        self.device = Some(device);
        self.surface = Some(surface);
        self.command_pool = Some(command_pool);
        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.index_count = mesh.index_count();
        self.texture = Some(texture);
        self.descriptor_set_layout = Some(descriptor_set_layout);
        self.scheduler = Some(scheduler);

        // ─────────────────────────────────────────────────────────────────────
        // Swapchain and dependent resources
        // ─────────────────────────────────────────────────────────────────────
        self.create_swapchain_resources(&window)?;

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Create the swapchain and everything that depends on its image set.
    ///
    /// Separated from init_vulkan because it runs again on every recreation.
    /// Invariant afterwards: uniform_buffers, descriptor_sets, framebuffers
    /// and command_buffers all have length == swapchain image count.
    fn create_swapchain_resources(&mut self, window: &Window) -> Result<()> {
        let device = self.device.clone().context("Device not initialized")?;

        // Framebuffer pixel size, not logical coordinates
        let size = window.inner_size();

        // A zero-extent swapchain is invalid; park until the platform
        // reports a real size again
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        // Tear down the old set first; the surface can only back one
        // swapchain at a time
        self.destroy_swapchain_resources();

        let surface = self.surface.as_ref().context("Surface not initialized")?;
        let swapchain = Swapchain::new(device.clone(), surface, size.width, size.height)?;
        let extent = swapchain.extent;
        let image_count = swapchain.image_count();

        let render_pass = pipeline::create_render_pass(&device, swapchain.format)?;

        let depth_target = DepthTarget::new(&device, extent)?;

        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            depth_target.view,
            render_pass,
            extent,
        )?;

        // Shader modules are only needed while building the pipeline
        let vert_shader = shader::load_shader(&device, "shaders/mesh.vert.spv")?;
        let frag_shader = shader::load_shader(&device, "shaders/mesh.frag.spv")?;

        let layout = self
            .descriptor_set_layout
            .context("Descriptor set layout not initialized")?;

        let pipeline_result = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            extent,
            layout,
            vert_shader,
            frag_shader,
        );

        unsafe {
            device.device.destroy_shader_module(vert_shader, None);
            device.device.destroy_shader_module(frag_shader, None);
        }
        let (graphics_pipeline, pipeline_layout) = pipeline_result?;

        // ─────────────────────────────────────────────────────────────────────
        // Per-image resources: uniform buffers + descriptor sets
        // ─────────────────────────────────────────────────────────────────────
        let uniform_buffers = (0..image_count)
            .map(|i| {
                Buffer::uniform(
                    &device,
                    &format!("transforms[{}]", i),
                    std::mem::size_of::<Transforms>() as vk::DeviceSize,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let descriptor_pool = descriptor::create_descriptor_pool(&device, image_count as u32)?;
        let descriptor_sets = descriptor::allocate_descriptor_sets(
            &device,
            layout,
            descriptor_pool,
            &uniform_buffers,
            self.texture.as_ref().context("Texture not initialized")?,
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // Command buffers: one per image, recorded once, replayed every frame
        // ─────────────────────────────────────────────────────────────────────
        let command_pool = self.command_pool.context("Command pool not initialized")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(image_count as u32);

        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };

        self.record_command_buffers(
            &device,
            &command_buffers,
            &framebuffers,
            &descriptor_sets,
            render_pass,
            graphics_pipeline,
            pipeline_layout,
            extent,
        )?;

        log::info!(
            "Swapchain resources ready: {} images, extent {}x{}",
            image_count,
            extent.width,
            extent.height
        );

        // Fresh image set: reset the in-flight fence map to match
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.track_images(image_count);
        }

        self.swapchain = Some(swapchain);
        self.render_pass = Some(render_pass);
        self.pipeline = Some(graphics_pipeline);
        self.pipeline_layout = Some(pipeline_layout);
        self.depth_target = Some(depth_target);
        self.framebuffers = framebuffers;
        self.uniform_buffers = uniform_buffers;
        self.descriptor_pool = Some(descriptor_pool);
        self.descriptor_sets = descriptor_sets;
        self.command_buffers = command_buffers;
        self.needs_resize = false;

        Ok(())
    }

    /// Tear down swapchain-dependent resources in reverse dependency order.
    /// Caller guarantees the GPU is idle.
    fn destroy_swapchain_resources(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };

        unsafe {
            if !self.command_buffers.is_empty() {
                if let Some(pool) = self.command_pool {
                    device.device.free_command_buffers(pool, &self.command_buffers);
                }
                self.command_buffers.clear();
            }

            // Sets are freed with the pool, never individually
            if let Some(pool) = self.descriptor_pool.take() {
                device.device.destroy_descriptor_pool(pool, None);
            }
            self.descriptor_sets.clear();

            for mut buffer in self.uniform_buffers.drain(..) {
                buffer.destroy(&device);
            }

            for framebuffer in self.framebuffers.drain(..) {
                device.device.destroy_framebuffer(framebuffer, None);
            }

            if let Some(pipeline) = self.pipeline.take() {
                device.device.destroy_pipeline(pipeline, None);
            }
            if let Some(layout) = self.pipeline_layout.take() {
                device.device.destroy_pipeline_layout(layout, None);
            }
            if let Some(render_pass) = self.render_pass.take() {
                device.device.destroy_render_pass(render_pass, None);
            }
        }

        if let Some(mut depth) = self.depth_target.take() {
            depth.destroy(&device);
        }

        // Swapchain last (Drop destroys views + swapchain object)
        self.swapchain = None;
    }

    /// Recreate the swapchain after a resize or a stale surface
    fn recreate_swapchain(&mut self) -> Result<()> {
        // Nothing may be torn down while the GPU still references it
        if let Some(ref device) = self.device {
            device.wait_idle()?;
        }

        let window = self.window.clone();
        if let Some(ref win) = window {
            self.create_swapchain_resources(win)?;
        }

        Ok(())
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    /// Record the fixed per-image command sequence. Replayed unchanged every
    /// frame; per-frame data flows exclusively through the uniform buffers.
    #[allow(clippy::too_many_arguments)]
    fn record_command_buffers(
        &self,
        device: &VulkanDevice,
        command_buffers: &[vk::CommandBuffer],
        framebuffers: &[vk::Framebuffer],
        descriptor_sets: &[vk::DescriptorSet],
        render_pass: vk::RenderPass,
        graphics_pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let vertex_buffer = self
            .vertex_buffer
            .as_ref()
            .context("Vertex buffer not initialized")?;
        let index_buffer = self
            .index_buffer
            .as_ref()
            .context("Index buffer not initialized")?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.config.graphics.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0, // Far plane
                    stencil: 0,
                },
            },
        ];

        for (i, &cmd) in command_buffers.iter().enumerate() {
            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::builder();
                device.device.begin_command_buffer(cmd, &begin_info)?;

                let render_pass_begin = vk::RenderPassBeginInfo::builder()
                    .render_pass(render_pass)
                    .framebuffer(framebuffers[i])
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent,
                    })
                    .clear_values(&clear_values);

                device.device.cmd_begin_render_pass(
                    cmd,
                    &render_pass_begin,
                    vk::SubpassContents::INLINE,
                );

                device.device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    graphics_pipeline,
                );

                device
                    .device
                    .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.buffer], &[0]);
                device.device.cmd_bind_index_buffer(
                    cmd,
                    index_buffer.buffer,
                    0,
                    vk::IndexType::UINT32,
                );

                device.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline_layout,
                    0,
                    &[descriptor_sets[i]],
                    &[],
                );

                device
                    .device
                    .cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);

                device.device.cmd_end_render_pass(cmd);
                device.device.end_command_buffer(cmd)?;
            }
        }

        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. This is the hot path.
    pub fn render_frame(&mut self) -> Result<bool> {
        // Zero-sized framebuffer: nothing to do until the platform reports
        // a real size
        if self.is_minimized {
            return Ok(false);
        }

        if self.needs_resize {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        let device = self.device.clone().context("Device not initialized")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait this slot's fence (the frame N submissions ago)
        // ─────────────────────────────────────────────────────────────────────
        // The slot's semaphores and fence may not be reused before the GPU
        // has retired their previous submission.
        let (image_available, render_finished) = {
            let scheduler = self.scheduler.as_ref().context("Scheduler not initialized")?;
            scheduler.wait_for_slot(&device.device)?;
            let sync = scheduler.current();
            (sync.image_available, sync.render_finished)
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire the next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let acquired = {
            let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
            swapchain.acquire_next_image(image_available)?
        };

        let image_index = match acquired {
            backend::swapchain::AcquiredImage::Ready { index, suboptimal } => {
                // Suboptimal still delivered an image; render this frame and
                // rebuild afterwards
                if suboptimal {
                    self.needs_resize = true;
                }
                index
            }
            backend::swapchain::AcquiredImage::Stale => {
                // Nothing was acquired; abort this frame and retry next tick
                self.needs_resize = true;
                return Ok(false);
            }
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Cross-check the in-flight fence map and stamp the image
        // ─────────────────────────────────────────────────────────────────────
        // An older frame may still be reading this image; its uniform buffer
        // must not be touched before that fence signals.
        {
            let scheduler = self.scheduler.as_mut().context("Scheduler not initialized")?;
            scheduler.claim_image(&device.device, image_index)?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Write this image's uniform buffer (mapped, coherent)
        // ─────────────────────────────────────────────────────────────────────
        let extent = self
            .swapchain
            .as_ref()
            .context("Swapchain not initialized")?
            .extent;
        let aspect = extent.width as f32 / extent.height as f32;
        let transforms = Transforms::spinning(self.start_time.elapsed().as_secs_f32(), aspect);
        self.uniform_buffers[image_index as usize].write_value(&transforms)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Submit, fence reset just before use
        // ─────────────────────────────────────────────────────────────────────
        let in_flight_fence = {
            let scheduler = self.scheduler.as_ref().context("Scheduler not initialized")?;
            scheduler.reset_current_fence(&device.device)?;
            scheduler.current().in_flight_fence
        };

        let cmd = self.command_buffers[image_index as usize];
        let wait_semaphores = [image_available];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        // The GPU waits the acquire at color-attachment output; vertex work
        // may start immediately
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                in_flight_fence,
            )?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Present, gated on render-finished
        // ─────────────────────────────────────────────────────────────────────
        let presented = {
            let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
            swapchain.present(device.present_queue, image_index, &signal_semaphores)?
        };

        match presented {
            backend::swapchain::Presented::Ok { suboptimal } => {
                if suboptimal {
                    self.needs_resize = true;
                }
            }
            backend::swapchain::Presented::Stale => {
                self.needs_resize = true;
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: Advance to the next frame slot
        // ─────────────────────────────────────────────────────────────────────
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.advance();
        }

        Ok(true)
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.needs_resize = true;
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    pub fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen {
                    "fullscreen"
                } else {
                    "windowed"
                };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(window.clone()) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => {
                match self.render_frame() {
                    Ok(rendered) => {
                        if rendered {
                            self.update_fps();
                        }
                    }
                    Err(e) => {
                        log::error!("Render error: {:?}", e);
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// While minimized no redraw is requested, so the loop parks in the
    /// platform wait until an event (e.g. restore/resize) arrives.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.is_minimized {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let Some(device) = self.device.clone() else {
            return;
        };

        // Nothing is torn down while in-flight commands may reference it
        let _ = device.wait_idle();

        self.destroy_swapchain_resources();

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.destroy(&device.device);
        }

        if let Some(mut texture) = self.texture.take() {
            texture.destroy(&device);
        }
        if let Some(mut buffer) = self.index_buffer.take() {
            buffer.destroy(&device);
        }
        if let Some(mut buffer) = self.vertex_buffer.take() {
            buffer.destroy(&device);
        }

        unsafe {
            if let Some(layout) = self.descriptor_set_layout.take() {
                device.device.destroy_descriptor_set_layout(layout, None);
            }
            if let Some(pool) = self.command_pool.take() {
                device.device.destroy_command_pool(pool, None);
            }
        }

        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }

        // Device itself is dropped with the last Arc
        self.device = None;

        log::info!("Cleanup complete");
    }
}
