// Vulkan instance and device
//
// Responsibilities:
// - Validation layer availability check
// - Instance creation (window-system extensions, optional debug utils)
// - Debug messenger and its stdout/stderr message channel
// - Logical device + graphics/present queues

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr};
use std::io::Write;

use super::selection::{QueueFamilies, REQUIRED_DEVICE_EXTENSIONS};
use crate::error::BootstrapError;

pub const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

const APP_NAME: &CStr = c"Hello Vulkan";
const ENGINE_NAME: &CStr = c"No Engine";

/// Required layers missing from `available`, in request order
pub fn missing_layers<'a>(required: &[&'a CStr], available: &[vk::LayerProperties]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|required| {
            !available
                .iter()
                .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == *required))
        })
        .collect()
}

/// Fails with `ValidationLayersUnavailable` unless every validation layer is installed
pub fn ensure_validation_layers(available: &[vk::LayerProperties]) -> Result<(), BootstrapError> {
    let missing = missing_layers(&VALIDATION_LAYERS, available);
    if missing.is_empty() {
        return Ok(());
    }

    Err(BootstrapError::ValidationLayersUnavailable {
        missing: missing
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect(),
    })
}

fn log_available_extensions(entry: &Entry) {
    match unsafe { entry.enumerate_instance_extension_properties(None) } {
        Ok(extensions) => {
            log::debug!("Available instance extensions:");
            for ext in &extensions {
                if let Ok(name) = ext.extension_name_as_c_str() {
                    log::debug!("\t{}", name.to_string_lossy());
                }
            }
        }
        Err(e) => log::debug!("Could not enumerate instance extensions: {}", e),
    }
}

/// Create the instance.
///
/// With validation enabled the layer check runs first, before anything is
/// created, and the messenger settings are chained into the instance so that
/// instance creation and destruction are reported as well.
pub fn create_instance(
    entry: &Entry,
    display_handle: RawDisplayHandle,
    enable_validation: bool,
) -> Result<ash::Instance> {
    if enable_validation {
        let available = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;
        ensure_validation_layers(&available)?;
    }

    log_available_extensions(entry);

    let app_info = vk::ApplicationInfo::default()
        .application_name(APP_NAME)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    // Window-system surface extensions, plus debug utils for the messenger
    let mut extensions = ash_window::enumerate_required_extensions(display_handle)
        .context("Failed to query window-system instance extensions")?
        .to_vec();
    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let layer_names: Vec<*const c_char> = if enable_validation {
        VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
    } else {
        Vec::new()
    };

    let mut debug_info = debug_messenger_create_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);
    if enable_validation {
        create_info = create_info.push_next(&mut debug_info);
    }

    unsafe { entry.create_instance(&create_info, None) }
        .context("Failed to create Vulkan instance")
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

pub fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

    let messenger = unsafe {
        debug_utils.create_debug_utils_messenger(&debug_messenger_create_info(), None)
    }
    .context("Failed to set up debug messenger")?;

    Ok((debug_utils, messenger))
}

/// Where a validation message is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageChannel {
    Stdout,
    Stderr,
}

/// WARNING and above go to stderr, everything below to stdout
pub fn message_channel(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> MessageChannel {
    if severity.as_raw() >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw() {
        MessageChannel::Stderr
    } else {
        MessageChannel::Stdout
    }
}

pub fn severity_tag(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> &'static str {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        "ERROR"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        "WARNING"
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        "INFO"
    } else {
        "VERBOSE"
    }
}

fn format_message(severity: vk::DebugUtilsMessageSeverityFlagsEXT, message: &str) -> String {
    format!("validation layer [{}]: {}", severity_tag(severity), message)
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = p_callback_data
        .as_ref()
        .and_then(|data| data.message_as_c_str())
        .map(|message| message.to_string_lossy())
        .unwrap_or_default();
    let line = format_message(message_severity, &message);

    // Write errors have nowhere to go from inside the driver callback
    let _ = match message_channel(message_severity) {
        MessageChannel::Stdout => writeln!(std::io::stdout().lock(), "{}", line),
        MessageChannel::Stderr => writeln!(std::io::stderr().lock(), "{}", line),
    };

    vk::FALSE
}

/// Logical device with one queue per distinct family, and both queue handles
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilies,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let queue_priorities = [1.0];
    let queue_create_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|name| name.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .context("Failed to create logical device")?;

    let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(families.present, 0) };

    Ok((device, graphics_queue, present_queue))
}
