// Vulkan context - the whole bootstrap sequence
//
// Each step creates one object and registers how to destroy it. On success
// the context owns the teardown stack; on failure the stack is dropped with
// the partially built prefix, which unwinds exactly what was created.

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::Path;
use std::sync::Arc;
use winit::window::Window;

use super::device;
use super::pipeline;
use super::selection::{self, DeviceProbe, VulkanProbe};
use super::shader;
use super::swapchain::{self, SwapchainConfig};
use super::teardown::Teardown;
use crate::config::{ENABLE_VALIDATION_LAYERS, FRAG_SHADER_PATH, HEIGHT, VERT_SHADER_PATH, WIDTH};

/// All live Vulkan handles for the triangle pipeline.
///
/// IMPORTANT: field order matters for Drop. The teardown stack must run
/// before the instance function table, the loader and the window go away.
pub struct VulkanContext {
    teardown: Teardown,

    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub swapchain: vk::SwapchainKHR,
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
    pub image_views: Vec<vk::ImageView>,

    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,

    _instance: ash::Instance,
    _entry: Entry,
    _window: Arc<Window>,
}

impl VulkanContext {
    /// Run the bootstrap sequence against `window`.
    ///
    /// Steps, in order: instance, debug messenger (validation only), surface,
    /// physical device, logical device + queues, swapchain, image views,
    /// render pass, pipeline layout, graphics pipeline.
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let enable_validation = ENABLE_VALIDATION_LAYERS;
        log::info!(
            "Initializing Vulkan (validation layers {})",
            if enable_validation { "on" } else { "off" }
        );

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let mut teardown = Teardown::new();

        // ─────────────────────────────────────────────────────────────────────
        // Instance + debug messenger
        // ─────────────────────────────────────────────────────────────────────
        let instance = device::create_instance(&entry, display_handle, enable_validation)?;
        teardown.push("instance", {
            let instance = instance.clone();
            move || unsafe { instance.destroy_instance(None) }
        });

        if enable_validation {
            let (debug_utils, messenger) = device::setup_debug_messenger(&entry, &instance)?;
            teardown.push("debug messenger", move || unsafe {
                debug_utils.destroy_debug_utils_messenger(messenger, None)
            });
        }

        // ─────────────────────────────────────────────────────────────────────
        // Surface
        // ─────────────────────────────────────────────────────────────────────
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        }
        .context("Failed to create window surface")?;
        teardown.push("surface", {
            let surface_loader = surface_loader.clone();
            move || unsafe { surface_loader.destroy_surface(surface, None) }
        });

        // ─────────────────────────────────────────────────────────────────────
        // Physical device + logical device
        // ─────────────────────────────────────────────────────────────────────
        let probe = VulkanProbe {
            instance: &instance,
            surface_loader: &surface_loader,
            surface,
        };

        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;
        let physical_device = selection::pick_physical_device(&probe, &devices)?;

        let families = selection::find_queue_families(&probe, physical_device)?.resolve()?;
        log::info!(
            "Queue families: graphics {}, present {}",
            families.graphics,
            families.present
        );

        let (device, graphics_queue, present_queue) =
            device::create_logical_device(&instance, physical_device, &families)?;
        teardown.push("logical device", {
            let device = device.clone();
            move || unsafe { device.destroy_device(None) }
        });

        // ─────────────────────────────────────────────────────────────────────
        // Swapchain + image views
        // ─────────────────────────────────────────────────────────────────────
        let support = probe.surface_support(physical_device)?;
        let swapchain_config =
            SwapchainConfig::negotiate(&support, WIDTH, HEIGHT)?;
        log::info!(
            "Swapchain: {}x{}, {:?} / {:?}, {:?}, {} images requested",
            swapchain_config.extent.width,
            swapchain_config.extent.height,
            swapchain_config.format.format,
            swapchain_config.format.color_space,
            swapchain_config.present_mode,
            swapchain_config.image_count
        );

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let swapchain = swapchain::create_swapchain(
            &swapchain_loader,
            surface,
            &support,
            &swapchain_config,
            &families,
        )?;
        teardown.push("swapchain", {
            let swapchain_loader = swapchain_loader.clone();
            move || unsafe { swapchain_loader.destroy_swapchain(swapchain, None) }
        });

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;
        log::info!("Created swapchain with {} images", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = swapchain::create_image_view(&device, image, swapchain_config.format.format)?;
            teardown.push("image view", {
                let device = device.clone();
                move || unsafe { device.destroy_image_view(view, None) }
            });
            image_views.push(view);
        }

        // ─────────────────────────────────────────────────────────────────────
        // Render pass + pipeline
        // ─────────────────────────────────────────────────────────────────────
        let render_pass = pipeline::create_render_pass(&device, swapchain_config.format.format)?;
        teardown.push("render pass", {
            let device = device.clone();
            move || unsafe { device.destroy_render_pass(render_pass, None) }
        });

        let pipeline_layout = pipeline::create_pipeline_layout(&device)?;
        teardown.push("pipeline layout", {
            let device = device.clone();
            move || unsafe { device.destroy_pipeline_layout(pipeline_layout, None) }
        });

        let vert_code = shader::read_spirv(Path::new(VERT_SHADER_PATH))?;
        let frag_code = shader::read_spirv(Path::new(FRAG_SHADER_PATH))?;
        log::debug!(
            "Loaded shaders {} ({} words), {} ({} words)",
            VERT_SHADER_PATH,
            vert_code.len(),
            FRAG_SHADER_PATH,
            frag_code.len()
        );

        let vert_shader = shader::create_shader_module(&device, &vert_code)?;
        let frag_shader = match shader::create_shader_module(&device, &frag_code) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_shader, None) };
                return Err(e);
            }
        };

        let pipeline = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            pipeline_layout,
            swapchain_config.extent,
            vert_shader,
            frag_shader,
        )?;
        teardown.push("graphics pipeline", {
            let device = device.clone();
            move || unsafe { device.destroy_pipeline(pipeline, None) }
        });

        log::info!("Vulkan initialized successfully ({} objects)", teardown.len());
        log::debug!("Creation order: {}", teardown.names().collect::<Vec<_>>().join(", "));

        Ok(Self {
            teardown,
            device,
            physical_device,
            graphics_queue,
            present_queue,
            swapchain,
            swapchain_format: swapchain_config.format.format,
            swapchain_extent: swapchain_config.extent,
            image_views,
            render_pass,
            pipeline_layout,
            pipeline,
            _instance: instance,
            _entry: entry,
            _window: window,
        })
    }

    /// Number of objects the teardown stack will destroy
    pub fn live_objects(&self) -> usize {
        self.teardown.len()
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan context...");

        // Nothing is ever submitted, but the device must be idle before teardown
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }

        self.teardown.unwind();
        log::info!("Cleanup complete");
    }
}
