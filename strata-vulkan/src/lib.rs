//! Vulkan implementation of [`strata::AccelerationBackend`], on top of `ash` and VMA.
//!
//! Setup goes through [`VulkanInitializer`] (instance) then [`VulkanBuilder`]
//! (physical and logical device).

use std::mem::ManuallyDrop;

use ash::{extensions::khr, vk};
use parking_lot::Mutex;

use crate::{debug_utils::DebugUtils, queues::QueueWithPool};

mod acceleration;
pub mod alloc;
pub mod builder;
mod commands;
pub mod debug_utils;
mod extensions;
pub mod initializer;
pub mod physical_device;
pub mod queues;

pub use alloc::VulkanBuffer;
pub use ash;
pub use builder::VulkanBuilder;
pub use initializer::VulkanInitializer;
pub use physical_device::PhysicalDeviceInfo;

pub mod errors {
    use strata::errors::BackendError;
    use thiserror::Error;

    pub type Result<T> = strata::errors::Result<VulkanError, T>;

    #[derive(Error, Debug)]
    pub enum VulkanError {
        #[error("{0}")]
        LoadingError(#[from] ash::LoadingError),
        #[error("{0}")]
        VkError(#[from] ash::vk::Result),
        #[error("{0}")]
        NulError(#[from] std::ffi::NulError),
        #[error("No compute queue found")]
        NoComputeQueue,
        #[error("No physical device picked")]
        NoPhysicalDevicePicked,
        #[error("No suitable physical device found")]
        NoSuitablePhysicalDevice,
    }

    impl BackendError for VulkanError {}

    // `thiserror` can't convert from two levels of error so we do it ourselves
    pub(crate) trait VkErrorExt<T> {
        fn map_err_strata(self) -> Result<T>;
    }

    impl<T> VkErrorExt<T> for ash::prelude::VkResult<T> {
        fn map_err_strata(self) -> Result<T> {
            Ok(self.map_err(VulkanError::VkError)?)
        }
    }

    pub(crate) trait NulErrorExt<T> {
        fn map_err_strata(self) -> Result<T>;
    }

    impl<T> NulErrorExt<T> for std::result::Result<T, std::ffi::NulError> {
        fn map_err_strata(self) -> Result<T> {
            Ok(self.map_err(VulkanError::NulError)?)
        }
    }
}

pub(crate) const VULKAN_VERSION: u32 = vk::make_api_version(0, 1, 3, 0);

pub struct VulkanBackend {
    pub(crate) _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_utils: DebugUtils,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) vma: ManuallyDrop<vk_mem::Allocator>,
    pub(crate) queue: Mutex<QueueWithPool>,
    pub(crate) ext_acceleration_structure: khr::AccelerationStructure,
    pub(crate) scratch_alignment: vk::DeviceSize,
}

impl VulkanBackend {
    pub fn builder() -> VulkanInitializer {
        VulkanInitializer::default()
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.device
                .destroy_command_pool(self.queue.get_mut().pool, None);

            ManuallyDrop::drop(&mut self.vma);

            self.device.destroy_device(None);
            self.debug_utils.destroy();
            self.instance.destroy_instance(None);
        }
    }
}
