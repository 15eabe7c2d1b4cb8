use std::{
    ffi::{CStr, CString},
    os::raw::c_char,
};

use ash::vk;
use log::{debug, info};

use crate::{
    builder::VulkanBuilder,
    debug_utils::DebugUtils,
    errors::{NulErrorExt, Result, VkErrorExt, VulkanError},
    VULKAN_VERSION,
};

const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

pub struct VulkanInitializer {
    name: Option<String>,
    ext_instance: Vec<*const c_char>,
    validation: bool,
}

impl Default for VulkanInitializer {
    fn default() -> Self {
        Self {
            name: None,
            ext_instance: vec![ash::extensions::ext::DebugUtils::name().as_ptr()],
            validation: cfg!(debug_assertions),
        }
    }
}

impl VulkanInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn with_instance_extension(mut self, name: &'static CStr) -> Self {
        self.ext_instance.push(name.as_ptr());
        self
    }

    /// Enables the Khronos validation layer. On by default in debug builds.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn build(self) -> Result<VulkanBuilder> {
        let entry = unsafe { ash::Entry::load().map_err(VulkanError::LoadingError)? };

        let instance = {
            let app_name = CString::new(self.name.as_deref().unwrap_or("App Name")).map_err_strata()?;
            let engine_name = CString::new(env!("CARGO_PKG_NAME")).map_err_strata()?;

            let vk_app_info = vk::ApplicationInfo::builder()
                .application_name(app_name.as_c_str())
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(engine_name.as_c_str())
                .engine_version(engine_version())
                .api_version(VULKAN_VERSION);

            let layers = if self.validation {
                info!("Enabling validation layer");
                vec![VALIDATION_LAYER.as_ptr() as *const c_char]
            } else {
                Vec::new()
            };

            unsafe {
                entry
                    .create_instance(
                        &vk::InstanceCreateInfo::builder()
                            .enabled_extension_names(&self.ext_instance)
                            .enabled_layer_names(&layers)
                            .application_info(&vk_app_info),
                        None,
                    )
                    .map_err_strata()?
            }
        };
        debug!("Vulkan instance created");

        let debug_utils = match DebugUtils::new(&entry, &instance, self.validation) {
            Ok(debug_utils) => debug_utils,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(err);
            }
        };

        Ok(VulkanBuilder::new(entry, instance, debug_utils))
    }
}

fn engine_version() -> u32 {
    let part = |s: &str| s.parse().unwrap_or(0);
    vk::make_api_version(
        0,
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
    )
}
