use std::{fmt, ptr};

use ash::vk;
use log::trace;
use strata::{BufferUsage, DeviceAddress, MemoryLocation};
use vk_mem::Alloc;

use crate::{
    errors::{Result, VkErrorExt},
    VulkanBackend,
};

pub(crate) fn translate_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::from_raw(usage.bits())
}

pub(crate) fn translate_buffer_location(
    location: MemoryLocation,
) -> (vk_mem::MemoryUsage, vk_mem::AllocationCreateFlags) {
    match location {
        MemoryLocation::Gpu => (
            vk_mem::MemoryUsage::AutoPreferDevice,
            vk_mem::AllocationCreateFlags::empty(),
        ),
        MemoryLocation::CpuToGpu => (
            vk_mem::MemoryUsage::AutoPreferHost,
            vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE
                | vk_mem::AllocationCreateFlags::MAPPED,
        ),
    }
}

/// Buffer with its VMA allocation.
///
/// `address` is already aligned to what the usage needs, scratch buffers are over
/// allocated to make room for it.
pub struct VulkanBuffer {
    pub(crate) handle: vk::Buffer,
    pub(crate) allocation: vk_mem::Allocation,
    pub(crate) address: DeviceAddress,
    pub(crate) mapped: *mut u8,
    pub(crate) size: vk::DeviceSize,
}

unsafe impl Send for VulkanBuffer {}
unsafe impl Sync for VulkanBuffer {}

impl fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("handle", &self.handle)
            .field("address", &format_args!("{:#x}", self.address))
            .field("size", &self.size)
            .finish()
    }
}

impl VulkanBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl VulkanBackend {
    pub(crate) fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: BufferUsage,
        location: MemoryLocation,
        name: &str,
    ) -> Result<VulkanBuffer> {
        // Scratch addresses need a stricter alignment than VMA gives
        let padding = if usage.contains(BufferUsage::SCRATCH) {
            self.scratch_alignment - 1
        } else {
            0
        };

        trace!("Creating buffer:");
        trace!("- Size: {} (+{})", size, padding);
        trace!("- {:?}", usage);
        trace!("- {:?}", location);

        let (memory_usage, flags) = translate_buffer_location(location);
        let (handle, allocation) = unsafe {
            self.vma
                .create_buffer(
                    &vk::BufferCreateInfo::builder()
                        .size(size + padding)
                        .usage(translate_buffer_usage(usage))
                        .sharing_mode(vk::SharingMode::EXCLUSIVE),
                    &vk_mem::AllocationCreateInfo {
                        usage: memory_usage,
                        flags,
                        ..Default::default()
                    },
                )
                .map_err_strata()?
        };

        let mut buffer = VulkanBuffer {
            handle,
            allocation,
            address: 0,
            mapped: ptr::null_mut(),
            size,
        };

        if location == MemoryLocation::CpuToGpu {
            buffer.mapped = self.vma.get_allocation_info(&buffer.allocation).mapped_data as _;
        }

        if usage.contains(BufferUsage::SHADER_DEVICE_ADDRESS) {
            let raw = unsafe {
                self.device
                    .get_buffer_device_address(&vk::BufferDeviceAddressInfo::builder().buffer(handle))
            };
            buffer.address = align_up(raw, padding + 1);
        }

        if let Err(err) = self.debug_utils.name_buffer(&self.device, handle, name) {
            unsafe { self.destroy_buffer(buffer) };
            return Err(err);
        }

        Ok(buffer)
    }

    pub(crate) fn store_to_buffer(&self, buffer: &VulkanBuffer, data: &[u8]) -> Result<()> {
        assert!(
            !buffer.mapped.is_null(),
            "Only host visible buffers can be written"
        );
        assert!(data.len() as u64 <= buffer.size, "Write past the end of the buffer");

        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), buffer.mapped, data.len());
        }

        self.vma
            .flush_allocation(&buffer.allocation, 0, data.len() as _)
            .map_err_strata()
    }

    pub(crate) unsafe fn destroy_buffer(&self, mut buffer: VulkanBuffer) {
        self.vma.destroy_buffer(buffer.handle, &mut buffer.allocation);
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
