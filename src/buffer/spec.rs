use std::fmt;

use ash::vk;

/// Where a buffer's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryType {
    #[default]
    DeviceLocal,
    /// Host visible and mapped, written by the CPU during the frame.
    Staging,
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryType::DeviceLocal => "DeviceLocal",
            MemoryType::Staging => "Staging",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSpec {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory: MemoryType,
    pub debug_name: Option<String>,
}

impl Default for BufferSpec {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            memory: MemoryType::DeviceLocal,
            debug_name: None,
        }
    }
}

impl BufferSpec {
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn memory(mut self, memory: MemoryType) -> Self {
        self.memory = memory;
        self
    }

    pub fn debug_name(mut self, debug_name: impl AsRef<str>) -> Self {
        self.debug_name = Some(debug_name.as_ref().to_owned());
        self
    }

    /// Usage and memory type match; sizes are compared by the caller.
    pub fn same_kind(&self, other: &BufferSpec) -> bool {
        self.usage == other.usage && self.memory == other.memory
    }
}

impl fmt::Display for BufferSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BufferSpec(size={}, usage={:?}, memory={}, debugName={})",
            self.size,
            self.usage,
            self.memory,
            self.debug_name.as_deref().unwrap_or("<none>")
        )
    }
}
