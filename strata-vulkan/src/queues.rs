use ash::vk;

use crate::{
    errors::{Result, VkErrorExt, VulkanError},
    physical_device::PhysicalDeviceInfo,
};

const QUEUE_PRIORITIES_ONE: [f32; 1] = [1.0];

/// Family of the queue every build is submitted to.
///
/// A compute family that isn't shared with graphics is preferred, any compute
/// family will do otherwise.
#[derive(Debug, Copy, Clone)]
pub struct VulkanPhysicalDeviceQueueIndices {
    pub(crate) compute: u32,
}

impl VulkanPhysicalDeviceQueueIndices {
    pub(crate) fn from_device(info: &PhysicalDeviceInfo) -> Result<Self> {
        let compute = try_find_queue_not_shared_with(
            &info.queue_families,
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::GRAPHICS,
        )
        .ok_or(VulkanError::NoComputeQueue)?;

        Ok(Self { compute })
    }

    pub(crate) fn as_queue_create_info(&self) -> [vk::DeviceQueueCreateInfo; 1] {
        [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(self.compute)
            // SAFETY: It's const so its ok
            .queue_priorities(&QUEUE_PRIORITIES_ONE)
            .build()]
    }
}

fn try_find_queue_not_shared_with(
    families: &[vk::QueueFamilyProperties2],
    to_find: vk::QueueFlags,
    to_avoid: vk::QueueFlags,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, queue)| queue.queue_family_properties.queue_flags.contains(to_find))
        .fold(None, |acc: Option<(usize, &vk::QueueFamilyProperties2)>, (i, queue)| {
            match acc {
                // Keep the first one that isn't also used for graphics
                Some((prev_i, prev_queue))
                    if !prev_queue
                        .queue_family_properties
                        .queue_flags
                        .contains(to_avoid) =>
                {
                    Some((prev_i, prev_queue))
                }
                _ => Some((i, queue)),
            }
        })
        .map(|(i, _)| i as _)
}

pub(crate) struct QueueWithPool {
    pub(crate) queue: vk::Queue,
    pub(crate) pool: vk::CommandPool,
}

impl QueueWithPool {
    pub(crate) unsafe fn retrieve(device: &ash::Device, family_index: u32) -> Result<Self> {
        let queue = device.get_device_queue(family_index, 0);
        let pool = device
            .create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )
            .map_err_strata()?;

        Ok(Self { queue, pool })
    }
}
