use std::ffi::CStr;

use ash::{extensions::khr, vk};

use crate::PhysicalDeviceInfo;

pub(crate) fn required_device_extensions() -> [&'static CStr; 2] {
    [
        khr::DeferredHostOperations::name(),
        khr::AccelerationStructure::name(),
    ]
}

pub(crate) static REQUIRED_FEATURES_CHECK: [(&str, fn(&PhysicalDeviceInfo) -> bool); 3] = [
    ("Buffer Device Address", |info| {
        info.features_vk12.buffer_device_address != 0
    }),
    ("Synchronization 2", |info| {
        info.features_vk13.synchronization2 != 0
    }),
    ("Acceleration Structure", |info| {
        info.features_acceleration_structure.acceleration_structure != 0
    }),
];

pub(crate) fn required_features() -> (
    vk::PhysicalDeviceVulkan12Features,
    vk::PhysicalDeviceVulkan13Features,
    vk::PhysicalDeviceAccelerationStructureFeaturesKHR,
) {
    (
        vk::PhysicalDeviceVulkan12Features::builder()
            .buffer_device_address(true)
            .build(),
        vk::PhysicalDeviceVulkan13Features::builder()
            .synchronization2(true)
            .build(),
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder()
            .acceleration_structure(true)
            .build(),
    )
}
