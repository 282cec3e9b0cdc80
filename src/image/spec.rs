use std::fmt;

use ash::vk;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ImageKind {
    Image2D,
    Volume,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageKind::Image2D => "Image2D",
            ImageKind::Volume => "Volume",
        };
        f.write_str(s)
    }
}

/// Shape of a native image. Two specs describe interchangeable images when
/// [`ImageSpec::same_shape`] holds; the debug name never takes part in that.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ImageSpec {
    pub kind: ImageKind,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub mips: u32,
    pub debug_name: Option<String>,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            kind: ImageKind::Image2D,
            format: Default::default(),
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            usage: Default::default(),
            mips: 1,
            debug_name: Default::default(),
        }
    }
}

impl ImageSpec {
    pub fn kind(mut self, kind: ImageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    pub fn extent(mut self, extent: vk::Extent3D) -> Self {
        self.extent = extent;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn mips(mut self, mips: u32) -> Self {
        self.mips = mips;
        self
    }

    pub fn debug_name(mut self, debug_name: impl AsRef<str>) -> Self {
        self.debug_name = Some(debug_name.as_ref().to_owned());
        self
    }

    pub fn same_shape(&self, other: &ImageSpec) -> bool {
        self.same_layout(other) && self.usage == other.usage
    }

    /// Same kind, format, extent and mip count, regardless of usage.
    pub fn same_layout(&self, other: &ImageSpec) -> bool {
        self.kind == other.kind
            && self.format == other.format
            && self.extent == other.extent
            && self.mips == other.mips
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        if is_depth_format(self.format) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: 0,
            level_count: self.mips,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// The layout an image rests in between passes.
    pub fn resting_layout(&self) -> vk::ImageLayout {
        if self.usage.contains(vk::ImageUsageFlags::STORAGE) {
            vk::ImageLayout::GENERAL
        } else if self.usage.contains(vk::ImageUsageFlags::SAMPLED) {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        } else if is_depth_format(self.format) {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else if self.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::GENERAL
        }
    }
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

impl fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageSpec(kind={}, format={:?}, extent={}x{}x{}, usage={:?}, mips={}, debugName={})",
            self.kind,
            self.format,
            self.extent.width,
            self.extent.height,
            self.extent.depth,
            self.usage,
            self.mips,
            match &self.debug_name {
                Some(name) => name,
                None => "<none>",
            }
        )
    }
}
