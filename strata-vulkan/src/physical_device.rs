use std::{borrow::Cow, ffi::CStr, ptr};

use ash::vk;
use log::{debug, info, warn};

use crate::{
    builder::VulkanBuilder,
    errors::{Result, VkErrorExt},
    extensions::{required_device_extensions, REQUIRED_FEATURES_CHECK},
    queues::VulkanPhysicalDeviceQueueIndices,
    VULKAN_VERSION,
};

#[derive(Debug)]
pub struct PhysicalDeviceInfo {
    pub(crate) handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties2,
    pub properties_acceleration_structure: vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
    pub extensions: Vec<vk::ExtensionProperties>,
    pub features_vk12: vk::PhysicalDeviceVulkan12Features,
    pub features_vk13: vk::PhysicalDeviceVulkan13Features,
    pub features_acceleration_structure: vk::PhysicalDeviceAccelerationStructureFeaturesKHR,
    pub queue_families: Vec<vk::QueueFamilyProperties2>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties2,
}

impl PhysicalDeviceInfo {
    pub fn name(&self) -> Cow<'_, str> {
        unsafe { CStr::from_ptr(self.properties.properties.device_name.as_ptr()) }.to_string_lossy()
    }

    pub fn vulkan_version(&self) -> String {
        let version = self.properties.properties.api_version;
        // Ignore variant, it doesn't really matter that much
        format!(
            "{}.{}.{}",
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    pub fn is_discrete(&self) -> bool {
        self.properties.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    pub fn vram_size(&self) -> vk::DeviceSize {
        self.memory_properties
            .memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    pub fn supports_extension(&self, extension: &CStr) -> bool {
        self.extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == extension)
    }

    /// Everything this device lacks to build acceleration structures, empty when
    /// suitable.
    pub fn missing_requirements(&self) -> Vec<String> {
        let mut missing = Vec::new();

        if self.properties.properties.api_version < VULKAN_VERSION {
            missing.push(format!("Vulkan 1.3 (has {})", self.vulkan_version()));
        }

        for ext in required_device_extensions() {
            if !self.supports_extension(ext) {
                missing.push(ext.to_string_lossy().into_owned());
            }
        }

        for (feature, check) in REQUIRED_FEATURES_CHECK.iter() {
            if !check(self) {
                missing.push(feature.to_string());
            }
        }

        if VulkanPhysicalDeviceQueueIndices::from_device(self).is_err() {
            missing.push("Compute queue".to_owned());
        }

        missing
    }
}

impl VulkanBuilder {
    /// Every physical device, suitable or not.
    pub fn list_available_physical_devices(&self) -> Result<Vec<PhysicalDeviceInfo>> {
        let devices = unsafe { self.instance.enumerate_physical_devices().map_err_strata()? };

        devices
            .into_iter()
            .map(|d| unsafe { self.query_physical_device(d) })
            .collect()
    }

    pub fn list_suitable_physical_devices(&self) -> Result<Vec<PhysicalDeviceInfo>> {
        Ok(self
            .list_available_physical_devices()?
            .into_iter()
            .filter(|info| {
                let missing = info.missing_requirements();
                if missing.is_empty() {
                    info!("[{}] [OK] Physical device is suitable !", info.name());
                    true
                } else {
                    for requirement in missing {
                        warn!("[{}] [KO] Missing {}", info.name(), requirement);
                    }
                    false
                }
            })
            .collect())
    }

    unsafe fn query_physical_device(&self, d: vk::PhysicalDevice) -> Result<PhysicalDeviceInfo> {
        // Query features
        let mut features_vk12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features_vk13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features_acceleration_structure =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
        let mut features = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut features_vk12)
            .push_next(&mut features_vk13)
            .push_next(&mut features_acceleration_structure);
        self.instance
            .get_physical_device_features2(d, &mut features);

        features_vk12.p_next = ptr::null_mut();
        features_vk13.p_next = ptr::null_mut();
        features_acceleration_structure.p_next = ptr::null_mut();

        // Query properties
        let mut properties_acceleration_structure =
            vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let mut properties = vk::PhysicalDeviceProperties2::builder()
            .push_next(&mut properties_acceleration_structure)
            .build();
        self.instance
            .get_physical_device_properties2(d, &mut properties);

        properties.p_next = ptr::null_mut();
        properties_acceleration_structure.p_next = ptr::null_mut();

        // Query extensions
        let extensions = self
            .instance
            .enumerate_device_extension_properties(d)
            .map_err_strata()?;

        // Query queue information
        let mut queue_families = vec![
            vk::QueueFamilyProperties2::default();
            self.instance
                .get_physical_device_queue_family_properties2_len(d)
        ];
        self.instance
            .get_physical_device_queue_family_properties2(d, &mut queue_families);

        // Query memory properties
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties2::default();
        self.instance
            .get_physical_device_memory_properties2(d, &mut memory_properties);

        let info = PhysicalDeviceInfo {
            handle: d,
            properties,
            properties_acceleration_structure,
            extensions,
            features_vk12,
            features_vk13,
            features_acceleration_structure,
            queue_families,
            memory_properties,
        };
        debug!(
            "Found {} (Vulkan {}, {} MiB of VRAM)",
            info.name(),
            info.vulkan_version(),
            info.vram_size() / 1024 / 1024
        );

        Ok(info)
    }
}
