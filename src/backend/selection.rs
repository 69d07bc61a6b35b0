// Physical device selection
//
// Picks the first GPU that can drive our surface: required extensions,
// usable swapchain support, discrete type, and graphics + present queues.
// The queries go through `DeviceProbe` so the decision logic can be
// exercised without a driver.

use anyhow::{Context, Result};
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};

use crate::error::BootstrapError;

/// Device extensions every candidate must expose
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// What a surface supports on a given device
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain needs at least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Capability queries against a physical device and the target surface
pub trait DeviceProbe {
    fn extension_names(&self, device: vk::PhysicalDevice) -> Result<Vec<CString>>;
    fn surface_support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport>;
    fn device_type(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceType;
    fn device_name(&self, device: vk::PhysicalDevice) -> String;
    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, device: vk::PhysicalDevice, family_index: u32) -> Result<bool>;
}

/// `DeviceProbe` backed by a live instance and surface
pub struct VulkanProbe<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl DeviceProbe for VulkanProbe<'_> {
    fn extension_names(&self, device: vk::PhysicalDevice) -> Result<Vec<CString>> {
        let properties = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .context("Failed to enumerate device extensions")?;

        Ok(properties
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(CStr::to_owned)
            .collect())
    }

    fn surface_support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(device, self.surface)
                    .context("Failed to query surface capabilities")?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(device, self.surface)
                    .context("Failed to query surface formats")?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(device, self.surface)
                    .context("Failed to query surface present modes")?,
            })
        }
    }

    fn device_type(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceType {
        unsafe { self.instance.get_physical_device_properties(device) }.device_type
    }

    fn device_name(&self, device: vk::PhysicalDevice) -> String {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed device>".to_string())
    }

    fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(device) }
    }

    fn supports_present(&self, device: vk::PhysicalDevice, family_index: u32) -> Result<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(device, family_index, self.surface)
        }
        .context("Failed to query presentation support")
    }
}

/// Queue families found for graphics and presentation (possibly the same)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// A complete pair of queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Fails with `IncompleteQueueFamilies` unless both families were found
    pub fn resolve(&self) -> Result<QueueFamilies, BootstrapError> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Ok(QueueFamilies { graphics, present }),
            (graphics, present) => Err(BootstrapError::IncompleteQueueFamilies { graphics, present }),
        }
    }
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one queue create info each
    pub fn unique(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics, self.present]).into_iter().collect()
    }
}

/// Scan queue families in reported order until both capabilities are covered.
///
/// A later family replaces an earlier one for a capability as long as the
/// pair is still incomplete, so a family doing both wins over a preceding
/// graphics-only family.
pub fn find_queue_families(
    probe: &impl DeviceProbe,
    device: vk::PhysicalDevice,
) -> Result<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in probe.queue_families(device).iter().enumerate() {
        let index = index as u32;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if probe.supports_present(device, index)? {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

fn supports_required_extensions(probe: &impl DeviceProbe, device: vk::PhysicalDevice) -> Result<bool> {
    let available = probe.extension_names(device)?;
    Ok(REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .all(|required| available.iter().any(|name| name.as_c_str() == *required)))
}

/// Checks run in order and stop at the first failure; a device missing an
/// extension is not queried any further.
pub fn is_device_suitable(probe: &impl DeviceProbe, device: vk::PhysicalDevice) -> Result<bool> {
    if !supports_required_extensions(probe, device)? {
        return Ok(false);
    }
    if !probe.surface_support(device)?.is_adequate() {
        return Ok(false);
    }
    if probe.device_type(device) != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Ok(false);
    }
    Ok(find_queue_families(probe, device)?.is_complete())
}

/// First suitable device in enumeration order. No scoring.
pub fn pick_physical_device(
    probe: &impl DeviceProbe,
    devices: &[vk::PhysicalDevice],
) -> Result<vk::PhysicalDevice> {
    if devices.is_empty() {
        return Err(BootstrapError::NoVulkanDevice.into());
    }

    for &device in devices {
        if is_device_suitable(probe, device)? {
            log::info!("Selected GPU: {}", probe.device_name(device));
            return Ok(device);
        }
        log::debug!("Skipping unsuitable GPU: {}", probe.device_name(device));
    }

    Err(BootstrapError::NoSuitableDevice.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Clone)]
    struct FakeDevice {
        extensions: Vec<&'static CStr>,
        device_type: vk::PhysicalDeviceType,
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
        // (flags, can present)
        families: Vec<(vk::QueueFlags, bool)>,
    }

    impl FakeDevice {
        fn suitable() -> Self {
            Self {
                extensions: vec![c"VK_KHR_maintenance1", ash::khr::swapchain::NAME],
                device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
                families: vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)],
            }
        }
    }

    #[derive(Default)]
    struct FakeProbe {
        devices: HashMap<u64, FakeDevice>,
        queries: RefCell<Vec<(u64, &'static str)>>,
    }

    impl FakeProbe {
        fn with(devices: Vec<FakeDevice>) -> (Self, Vec<vk::PhysicalDevice>) {
            let handles = (1..=devices.len() as u64).map(vk::PhysicalDevice::from_raw).collect();
            let devices = (1..).zip(devices).collect();
            (Self { devices, ..Default::default() }, handles)
        }

        fn get(&self, device: vk::PhysicalDevice, query: &'static str) -> &FakeDevice {
            self.queries.borrow_mut().push((device.as_raw(), query));
            &self.devices[&device.as_raw()]
        }

        fn queries_for(&self, device: vk::PhysicalDevice) -> Vec<&'static str> {
            self.queries
                .borrow()
                .iter()
                .filter(|(raw, _)| *raw == device.as_raw())
                .map(|(_, query)| *query)
                .collect()
        }
    }

    impl DeviceProbe for FakeProbe {
        fn extension_names(&self, device: vk::PhysicalDevice) -> Result<Vec<CString>> {
            Ok(self.get(device, "extensions").extensions.iter().map(|e| (*e).to_owned()).collect())
        }

        fn surface_support(&self, device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
            let fake = self.get(device, "surface");
            Ok(SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: fake.formats.clone(),
                present_modes: fake.present_modes.clone(),
            })
        }

        fn device_type(&self, device: vk::PhysicalDevice) -> vk::PhysicalDeviceType {
            self.get(device, "type").device_type
        }

        fn device_name(&self, device: vk::PhysicalDevice) -> String {
            format!("fake gpu #{}", device.as_raw())
        }

        fn queue_families(&self, device: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
            self.get(device, "families")
                .families
                .iter()
                .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                    queue_flags,
                    queue_count: 1,
                    ..Default::default()
                })
                .collect()
        }

        fn supports_present(&self, device: vk::PhysicalDevice, family_index: u32) -> Result<bool> {
            Ok(self.get(device, "present").families[family_index as usize].1)
        }
    }

    fn selected_index(devices: Vec<FakeDevice>) -> Result<usize> {
        let (probe, handles) = FakeProbe::with(devices);
        let picked = pick_physical_device(&probe, &handles)?;
        Ok(handles.iter().position(|&h| h == picked).unwrap())
    }

    fn expect_signal(result: Result<usize>) -> BootstrapError {
        let err = result.unwrap_err();
        match err.downcast::<BootstrapError>() {
            Ok(signal) => signal,
            Err(other) => panic!("unexpected error: {other:#}"),
        }
    }

    // ── device selection ──────────────────────────────────────────────────

    #[test]
    fn picks_first_suitable_device_in_enumeration_order() {
        let mut integrated = FakeDevice::suitable();
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;

        let devices = vec![integrated, FakeDevice::suitable(), FakeDevice::suitable()];
        assert_eq!(selected_index(devices).unwrap(), 1);
    }

    #[test]
    fn single_suitable_device_is_selected() {
        assert_eq!(selected_index(vec![FakeDevice::suitable()]).unwrap(), 0);
    }

    #[test]
    fn no_devices_is_no_vulkan_device() {
        assert!(matches!(expect_signal(selected_index(vec![])), BootstrapError::NoVulkanDevice));
    }

    #[test]
    fn no_qualifying_device_is_no_suitable_device() {
        let mut no_swapchain = FakeDevice::suitable();
        no_swapchain.extensions = vec![c"VK_KHR_maintenance1"];

        let mut no_formats = FakeDevice::suitable();
        no_formats.formats.clear();

        let mut no_present_modes = FakeDevice::suitable();
        no_present_modes.present_modes.clear();

        let mut integrated = FakeDevice::suitable();
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;

        let mut cpu = FakeDevice::suitable();
        cpu.device_type = vk::PhysicalDeviceType::CPU;

        let mut no_graphics = FakeDevice::suitable();
        no_graphics.families = vec![(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, true)];

        let mut no_present = FakeDevice::suitable();
        no_present.families = vec![(vk::QueueFlags::GRAPHICS, false), (vk::QueueFlags::COMPUTE, false)];

        let devices = vec![
            no_swapchain,
            no_formats,
            no_present_modes,
            integrated,
            cpu,
            no_graphics,
            no_present,
        ];
        assert!(matches!(expect_signal(selected_index(devices)), BootstrapError::NoSuitableDevice));
    }

    #[test]
    fn split_graphics_and_present_families_qualify() {
        let mut split = FakeDevice::suitable();
        split.families = vec![(vk::QueueFlags::GRAPHICS, false), (vk::QueueFlags::TRANSFER, true)];
        assert_eq!(selected_index(vec![split]).unwrap(), 0);
    }

    #[test]
    fn missing_extension_short_circuits_other_queries() {
        let mut no_swapchain = FakeDevice::suitable();
        no_swapchain.extensions.clear();

        let (probe, handles) = FakeProbe::with(vec![no_swapchain]);
        assert!(!is_device_suitable(&probe, handles[0]).unwrap());
        assert_eq!(probe.queries_for(handles[0]), vec!["extensions"]);
    }

    #[test]
    fn checks_run_in_documented_order() {
        let mut no_present = FakeDevice::suitable();
        no_present.families = vec![(vk::QueueFlags::GRAPHICS, false)];

        let (probe, handles) = FakeProbe::with(vec![no_present]);
        assert!(!is_device_suitable(&probe, handles[0]).unwrap());
        assert_eq!(
            probe.queries_for(handles[0]),
            vec!["extensions", "surface", "type", "families", "present"]
        );
    }

    #[test]
    fn integrated_gpu_is_not_asked_for_queue_families() {
        let mut integrated = FakeDevice::suitable();
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;

        let (probe, handles) = FakeProbe::with(vec![integrated]);
        assert!(!is_device_suitable(&probe, handles[0]).unwrap());
        assert!(!probe.queries_for(handles[0]).contains(&"families"));
    }

    // ── queue families ────────────────────────────────────────────────────

    fn families_of(families: Vec<(vk::QueueFlags, bool)>) -> (FakeProbe, vk::PhysicalDevice) {
        let mut device = FakeDevice::suitable();
        device.families = families;
        let (probe, handles) = FakeProbe::with(vec![device]);
        (probe, handles[0])
    }

    #[test]
    fn same_family_can_cover_both() {
        let (probe, device) = families_of(vec![(vk::QueueFlags::GRAPHICS, true), (vk::QueueFlags::GRAPHICS, true)]);
        let indices = find_queue_families(&probe, device).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(0), present: Some(0) });

        let families = indices.resolve().unwrap();
        assert!(families.is_shared());
        assert_eq!(families.unique(), vec![0]);
    }

    #[test]
    fn scan_stops_once_complete() {
        let (probe, device) = families_of(vec![
            (vk::QueueFlags::TRANSFER, true),
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::GRAPHICS, true),
        ]);
        let indices = find_queue_families(&probe, device).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: Some(0) });

        // families 0 and 1 asked for presentation, family 2 never reached
        let present_queries = probe.queries_for(device).iter().filter(|q| **q == "present").count();
        assert_eq!(present_queries, 2);

        let families = indices.resolve().unwrap();
        assert!(!families.is_shared());
        assert_eq!(families.unique(), vec![0, 1]);
    }

    #[test]
    fn later_graphics_family_replaces_earlier_until_complete() {
        let (probe, device) = families_of(vec![
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ]);
        let indices = find_queue_families(&probe, device).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: Some(1), present: Some(1) });
    }

    #[test]
    fn incomplete_indices_refuse_to_resolve() {
        let (probe, device) = families_of(vec![(vk::QueueFlags::COMPUTE, true)]);
        let indices = find_queue_families(&probe, device).unwrap();
        assert!(!indices.is_complete());

        match indices.resolve() {
            Err(BootstrapError::IncompleteQueueFamilies { graphics, present }) => {
                assert_eq!(graphics, None);
                assert_eq!(present, Some(0));
            }
            other => panic!("expected incomplete queue families, got {other:?}"),
        }
    }

    #[test]
    fn no_families_is_incomplete() {
        let (probe, device) = families_of(vec![]);
        assert_eq!(find_queue_families(&probe, device).unwrap(), QueueFamilyIndices::default());
    }
}
