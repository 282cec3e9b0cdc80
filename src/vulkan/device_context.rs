use std::{ffi::CString, sync::Arc};

use anyhow::Context;
use ash::vk;

/// The logical device plus the debug-utils entry points used to name
/// objects and label command buffers.
#[derive(Clone)]
pub struct DeviceContext {
    pub device: Arc<ash::Device>,
    pub debug_utils: Option<Arc<ash::ext::debug_utils::Device>>,
}

impl DeviceContext {
    pub fn name_object<T>(&self, handle: T, debug_name: impl AsRef<str>) -> anyhow::Result<()>
    where
        T: vk::Handle,
    {
        let Some(debug) = &self.debug_utils else {
            return Ok(());
        };

        let cname = CString::new(debug_name.as_ref())
            .context("debug name contains interior null byte")?;
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&cname);

        unsafe {
            debug
                .set_debug_utils_object_name(&name_info)
                .map_err(|e| anyhow::anyhow!("failed to set debug name: {:?}", e))
        }
    }

    pub fn begin_label(&self, cmd: vk::CommandBuffer, name: &str) {
        self.with_label(name, |debug, label| unsafe {
            debug.cmd_begin_debug_utils_label(cmd, label)
        });
    }

    pub fn end_label(&self, cmd: vk::CommandBuffer) {
        if let Some(debug) = &self.debug_utils {
            unsafe { debug.cmd_end_debug_utils_label(cmd) };
        }
    }

    pub fn insert_label(&self, cmd: vk::CommandBuffer, name: &str) {
        self.with_label(name, |debug, label| unsafe {
            debug.cmd_insert_debug_utils_label(cmd, label)
        });
    }

    fn with_label(
        &self,
        name: &str,
        f: impl FnOnce(&ash::ext::debug_utils::Device, &vk::DebugUtilsLabelEXT),
    ) {
        let Some(debug) = &self.debug_utils else {
            return;
        };
        let Ok(cname) = CString::new(name) else {
            log::warn!("skipping label with interior null byte: {name:?}");
            return;
        };
        let label = vk::DebugUtilsLabelEXT::default().label_name(&cname);
        f(debug, &label);
    }
}
