// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Presentation surface for the target window
// - Physical device selection (first suitable GPU wins)
// - Logical device + graphics/present queues
// - Cached properties the rest of the backend queries every time

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::BackendError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Depth formats in order of preference
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Sample counts tried from best to worst
const SAMPLE_COUNT_PREFERENCE: [vk::SampleCountFlags; 6] = [
    vk::SampleCountFlags::TYPE_64,
    vk::SampleCountFlags::TYPE_32,
    vk::SampleCountFlags::TYPE_16,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_2,
];

/// Queue family indices for the two roles the renderer needs.
/// Both may name the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Single pass over the families, recording the first graphics-capable and
    /// the first present-capable index independently. Stops once both are known.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool>,
    ) -> Result<Option<Self>> {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics = Some(index);
            }
            if present.is_none() && supports_present(index)? {
                present = Some(index);
            }

            if let (Some(graphics), Some(present)) = (graphics, present) {
                return Ok(Some(Self { graphics, present }));
            }
        }

        Ok(None)
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one queue create info each
    pub fn unique(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics, self.present]).into_iter().collect()
    }
}

/// Highest sample count usable for both color and depth attachments.
/// Degrades to a single sample, never fails.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;

    SAMPLE_COUNT_PREFERENCE
        .into_iter()
        .find(|&count| counts.contains(count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First candidate whose tiling features include `features`
pub fn pick_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = properties_of(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Compare a NUL-terminated name from a fixed-size Vulkan property array.
/// An array with no terminator never matches.
pub fn fixed_name_is(raw: &[c_char], name: &CStr) -> bool {
    CStr::from_bytes_until_nul(bytemuck::cast_slice(raw)).is_ok_and(|raw_name| raw_name == name)
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: Surface,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub msaa_samples: vk::SampleCountFlags,
    pub sample_rate_shading: bool,
}

impl VulkanDevice {
    /// Create Vulkan device presenting to `window`
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    /// * `enable_msaa` - Use the highest supported sample count instead of one
    pub fn new<W>(
        window: &W,
        app_name: &str,
        enable_validation: bool,
        enable_msaa: bool,
    ) -> Result<Arc<Self>>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Create instance
        let enable_validation = enable_validation && Self::validation_layer_available(&entry)?;
        let instance = Self::create_instance(&entry, window, app_name, enable_validation)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // Step 4: Create surface
        let surface_loader = Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        // Step 5: Pick physical device (GPU)
        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        // Step 6: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let sample_rate_shading = features.sample_rate_shading == vk::TRUE;

        let msaa_samples = if enable_msaa {
            max_usable_sample_count(&properties.limits)
        } else {
            vk::SampleCountFlags::TYPE_1
        };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!("MSAA samples: {:?}", msaa_samples);

        // Step 7: Create logical device
        let device = Self::create_logical_device(
            &instance,
            physical_device,
            queue_families,
            sample_rate_shading,
        )?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
            _entry: entry,
            queue_families,
            graphics_queue,
            present_queue,
            debug_utils,
            properties,
            memory_properties,
            msaa_samples,
            sample_rate_shading,
        }))
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool> {
        #[allow(unused_unsafe)]
        let layers = unsafe { entry.enumerate_instance_layer_properties() }?;

        let available = layers
            .iter()
            .any(|layer| fixed_name_is(&layer.layer_name, VALIDATION_LAYER));

        if !available {
            log::warn!("Validation layers requested but not available");
        }
        Ok(available)
    }

    fn create_instance<W: HasRawDisplayHandle>(
        entry: &Entry,
        window: &W,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("No Engine")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for whatever windowing system we run on
        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(window.raw_display_handle())
                .context("Failed to query required surface extensions")?
                .to_vec();

        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            return Err(BackendError::NoDevices.into());
        }

        // First suitable device wins, no scoring
        for device in devices {
            if let Some(families) =
                Self::check_device(instance, surface_loader, surface, device)?
            {
                return Ok((device, families));
            }
        }

        Err(BackendError::NoSuitableDevice.into())
    }

    fn check_device(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilies>> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let Some(families) = QueueFamilies::find(&queue_families, |index| {
            unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            }
            .context("Failed to query surface support")
        })?
        else {
            return Ok(None);
        };

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }?;
        let has_swapchain = extensions.iter().any(|ext| {
            fixed_name_is(&ext.extension_name, ash::extensions::khr::Swapchain::name())
        });
        if !has_swapchain {
            return Ok(None);
        }

        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }?;
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }?;
        if formats.is_empty() || present_modes.is_empty() {
            return Ok(None);
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            return Ok(None);
        }

        Ok(Some(families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
        sample_rate_shading: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .sample_rate_shading(sample_rate_shading);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    /// Depth format usable as an optimally tiled depth attachment
    pub fn find_depth_format(&self) -> Result<vk::Format> {
        pick_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| self.format_properties(format),
        )
        .ok_or_else(|| BackendError::NoSupportedFormat(DEPTH_FORMAT_CANDIDATES.to_vec()).into())
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn queue_search_shares_family_when_possible() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
        let found = QueueFamilies::find(&families, |_| Ok(true)).unwrap().unwrap();

        assert_eq!(found, QueueFamilies { graphics: 0, present: 0 });
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![0]);
    }

    #[test]
    fn queue_search_records_first_of_each_independently() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        // Only the compute family and the last family can present
        let found = QueueFamilies::find(&families, |index| Ok(index == 0 || index == 3))
            .unwrap()
            .unwrap();

        assert_eq!(found, QueueFamilies { graphics: 1, present: 0 });
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn queue_search_stops_once_both_found() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        QueueFamilies::find(&families, |index| {
            queried.push(index);
            Ok(true)
        })
        .unwrap();

        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn queue_search_fails_without_present_support() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilies::find(&families, |_| Ok(false)).unwrap().is_none());
    }

    fn fixed_name(name: &str) -> [c_char; vk::MAX_EXTENSION_NAME_SIZE] {
        let mut raw = [0 as c_char; vk::MAX_EXTENSION_NAME_SIZE];
        for (dst, &byte) in raw.iter_mut().zip(name.as_bytes()) {
            *dst = byte as c_char;
        }
        raw
    }

    #[test]
    fn layer_and_extension_names_compare_by_content() {
        let layer = vk::LayerProperties {
            layer_name: fixed_name("VK_LAYER_KHRONOS_validation"),
            ..Default::default()
        };
        assert!(fixed_name_is(&layer.layer_name, VALIDATION_LAYER));
        assert!(!fixed_name_is(&fixed_name("VK_LAYER_KHRONOS"), VALIDATION_LAYER));

        let ext = vk::ExtensionProperties {
            extension_name: fixed_name("VK_KHR_swapchain"),
            ..Default::default()
        };
        assert!(fixed_name_is(
            &ext.extension_name,
            ash::extensions::khr::Swapchain::name()
        ));
    }

    #[test]
    fn unterminated_name_never_matches() {
        let raw = [b'x' as c_char; 4];
        assert!(!fixed_name_is(&raw, c"xxxx"));
    }

    #[test]
    fn sample_count_takes_highest_common() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn sample_count_degrades_to_one() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_1);

        let empty = vk::PhysicalDeviceLimits::default();
        assert_eq!(max_usable_sample_count(&empty), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn depth_format_pick_respects_order_and_tiling() {
        let props = |format: vk::Format| match format {
            vk::Format::D32_SFLOAT => vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            vk::Format::D24_UNORM_S8_UINT => vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            _ => vk::FormatProperties::default(),
        };

        let optimal = pick_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            props,
        );
        assert_eq!(optimal, Some(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil_component(optimal.unwrap()));

        let linear = pick_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            props,
        );
        assert_eq!(linear, Some(vk::Format::D32_SFLOAT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }
}
