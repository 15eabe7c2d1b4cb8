use std::{mem::ManuallyDrop, os::raw::c_char};

use ash::{extensions::khr, vk};
use log::{debug, info};
use parking_lot::Mutex;

use crate::{
    debug_utils::DebugUtils,
    errors::{Result, VkErrorExt, VulkanError},
    extensions::{required_device_extensions, required_features},
    initializer::VulkanInitializer,
    physical_device::PhysicalDeviceInfo,
    queues::{QueueWithPool, VulkanPhysicalDeviceQueueIndices},
    VulkanBackend, VULKAN_VERSION,
};

type DeviceAdapter = (PhysicalDeviceInfo, VulkanPhysicalDeviceQueueIndices);

pub struct VulkanBuilder {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_utils: Option<DebugUtils>,
    physical_device: Option<DeviceAdapter>,
}

impl VulkanBuilder {
    pub fn builder() -> VulkanInitializer {
        VulkanInitializer::default()
    }

    pub(crate) fn new(entry: ash::Entry, instance: ash::Instance, debug_utils: DebugUtils) -> Self {
        Self {
            entry,
            instance,
            debug_utils: Some(debug_utils),
            physical_device: None,
        }
    }

    pub fn set_physical_device(mut self, device: PhysicalDeviceInfo) -> Result<Self> {
        let queues = VulkanPhysicalDeviceQueueIndices::from_device(&device)?;
        self.physical_device = Some((device, queues));
        Ok(self)
    }

    /// Picks a suitable device, discrete ones first, then the one with the most VRAM.
    pub fn pick_physical_device(self) -> Result<Self> {
        let device = self
            .list_suitable_physical_devices()?
            .into_iter()
            .max_by_key(|info| (info.is_discrete(), info.vram_size()))
            .ok_or(VulkanError::NoSuitablePhysicalDevice)?;

        info!("Picked {}", device.name());
        self.set_physical_device(device)
    }

    pub fn build(mut self) -> Result<VulkanBackend> {
        let (physical, queue_indices) = self
            .physical_device
            .take()
            .ok_or(VulkanError::NoPhysicalDevicePicked)?;

        let device = {
            let queue_create_info = queue_indices.as_queue_create_info();
            let device_extensions = required_device_extensions()
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();

            let (mut vk12_features, mut vk13_features, mut acceleration_structure_features) =
                required_features();

            unsafe {
                self.instance
                    .create_device(
                        physical.handle,
                        &vk::DeviceCreateInfo::builder()
                            .push_next(&mut vk12_features)
                            .push_next(&mut vk13_features)
                            .push_next(&mut acceleration_structure_features)
                            .enabled_extension_names(&device_extensions)
                            .queue_create_infos(&queue_create_info),
                        None,
                    )
                    .map_err_strata()?
            }
        };
        debug!("Logical device created on {}", physical.name());

        let vma = vk_mem::Allocator::new(
            vk_mem::AllocatorCreateInfo::new(&self.instance, &device, physical.handle)
                .flags(vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS)
                .vulkan_api_version(VULKAN_VERSION),
        );
        let vma = match vma {
            Ok(vma) => vma,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(VulkanError::VkError(err).into());
            }
        };

        let queue = match unsafe { QueueWithPool::retrieve(&device, queue_indices.compute) } {
            Ok(queue) => queue,
            Err(err) => {
                drop(vma);
                unsafe { device.destroy_device(None) };
                return Err(err);
            }
        };

        let ext_acceleration_structure = khr::AccelerationStructure::new(&self.instance, &device);
        let scratch_alignment = physical
            .properties_acceleration_structure
            .min_acceleration_structure_scratch_offset_alignment
            .max(1) as vk::DeviceSize;

        // From now on the backend owns the instance
        let debug_utils = match self.debug_utils.take() {
            Some(debug_utils) => debug_utils,
            None => unreachable!("Builder already consumed"),
        };

        Ok(VulkanBackend {
            _entry: self.entry.clone(),
            instance: self.instance.clone(),
            debug_utils,
            physical_device: physical.handle,
            device,
            vma: ManuallyDrop::new(vma),
            queue: Mutex::new(queue),
            ext_acceleration_structure,
            scratch_alignment,
        })
    }
}

impl Drop for VulkanBuilder {
    /// Only tears down what the builder still owns, nothing once built.
    fn drop(&mut self) {
        if let Some(debug_utils) = self.debug_utils.take() {
            unsafe {
                debug_utils.destroy();
                self.instance.destroy_instance(None);
            }
        }
    }
}
