use std::{
    borrow::Cow,
    ffi::{CStr, CString},
    os::raw::c_char,
    slice,
};

use ash::{vk, vk::Handle};
use log::{log, Level, LevelFilter};

use crate::errors::{NulErrorExt, Result, VkErrorExt};

type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;

/// `VK_EXT_debug_utils` for the backend: buffer names and, with validation on, a
/// messenger routing layer messages into `log`.
pub struct DebugUtils {
    loader: ash::extensions::ext::DebugUtils,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl DebugUtils {
    pub(crate) fn new(entry: &ash::Entry, instance: &ash::Instance, validation: bool) -> Result<Self> {
        let loader = ash::extensions::ext::DebugUtils::new(entry, instance);
        let severities = severities_for(log::max_level());
        if !validation || severities.is_empty() {
            return Ok(Self {
                loader,
                messenger: None,
            });
        }

        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(
                    &vk::DebugUtilsMessengerCreateInfoEXT::builder()
                        .message_severity(severities)
                        .message_type(
                            vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                        )
                        .pfn_user_callback(Some(forward_to_log)),
                    None,
                )
                .map_err_strata()?
        };

        Ok(Self {
            loader,
            messenger: Some(messenger),
        })
    }

    /// Shows up in validation messages and capture tools.
    pub(crate) fn name_buffer(&self, device: &ash::Device, buffer: vk::Buffer, name: &str) -> Result<()> {
        let name = CString::new(name).map_err_strata()?;
        unsafe {
            self.loader
                .set_debug_utils_object_name(
                    device.handle(),
                    &vk::DebugUtilsObjectNameInfoEXT::builder()
                        .object_type(vk::ObjectType::BUFFER)
                        .object_handle(buffer.as_raw())
                        .object_name(&name),
                )
                .map_err_strata()
        }
    }

    pub(crate) unsafe fn destroy(&self) {
        if let Some(messenger) = self.messenger {
            self.loader.destroy_debug_utils_messenger(messenger, None);
        }
    }
}

/// Only ask the layer for what the logger would print anyway.
fn severities_for(max_level: LevelFilter) -> Severity {
    let mut severities = Severity::empty();
    if max_level >= LevelFilter::Error {
        severities |= Severity::ERROR;
    }
    if max_level >= LevelFilter::Warn {
        severities |= Severity::WARNING;
    }
    if max_level >= LevelFilter::Debug {
        severities |= Severity::INFO;
    }
    if max_level >= LevelFilter::Trace {
        severities |= Severity::VERBOSE;
    }
    severities
}

fn severity_to_level(severity: Severity) -> Level {
    if severity.contains(Severity::ERROR) {
        Level::Error
    } else if severity.contains(Severity::WARNING) {
        Level::Warn
    } else if severity.contains(Severity::INFO) {
        Level::Debug
    } else {
        Level::Trace
    }
}

unsafe fn lossy<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy())
}

unsafe extern "system" fn forward_to_log(
    severity: Severity,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let data = &*data;

    // Names given by `name_buffer`, most messages about a build point at one
    let objects = if data.p_objects.is_null() {
        Vec::new()
    } else {
        slice::from_raw_parts(data.p_objects, data.object_count as usize)
            .iter()
            .filter_map(|object| lossy(object.p_object_name))
            .collect::<Vec<_>>()
    };

    log!(
        target: "strata_vulkan::validation",
        severity_to_level(severity),
        "[{}] {}{}",
        lossy(data.p_message_id_name).unwrap_or(Cow::Borrowed("?")),
        lossy(data.p_message).unwrap_or(Cow::Borrowed("No message")),
        if objects.is_empty() {
            String::new()
        } else {
            format!(" (on {})", objects.join(", "))
        },
    );

    vk::FALSE
}
