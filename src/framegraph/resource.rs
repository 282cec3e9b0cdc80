use ash::vk;
use smallvec::SmallVec;

use crate::{
    buffer::{BufferSpec, MemoryType},
    image::{ImageKind, ImageSpec},
};

use super::{
    error::GraphError,
    handle::{PersistentId, ResourceKey},
};

pub type PassIndex = usize;

/// Lifetime bookkeeping shared by every resource kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceCreateInfo {
    pub first_use: Option<PassIndex>,
    pub last_read: Option<PassIndex>,
    pub last_write: Option<PassIndex>,
    pub persistent_ids: SmallVec<[PersistentId; 1]>,
    /// Backed by the previous frame's persistent resource.
    pub carried_over: bool,
    /// Stage that last wrote a carried over resource in the previous frame.
    pub carried_stage: Option<vk::PipelineStageFlags2>,
}

impl ResourceCreateInfo {
    pub fn register_use(
        &mut self,
        key: ResourceKey,
        pass: PassIndex,
        written: bool,
    ) -> Result<(), GraphError> {
        if written && self.carried_over && self.first_use.is_none_or(|first| pass <= first) {
            return Err(GraphError::CarriedOverWrite {
                resource: key,
                pass,
            });
        }

        self.first_use = Some(self.first_use.map_or(pass, |first| first.min(pass)));
        let slot = if written {
            &mut self.last_write
        } else {
            &mut self.last_read
        };
        *slot = Some(slot.map_or(pass, |last| last.max(pass)));
        Ok(())
    }

    pub fn last_use(&self) -> Option<PassIndex> {
        self.last_read.max(self.last_write)
    }

    pub fn is_persistent(&self) -> bool {
        !self.persistent_ids.is_empty()
    }

    pub fn is_used(&self) -> bool {
        self.first_use.is_some()
    }

    pub fn add_persistent_id(&mut self, id: PersistentId) {
        if !self.persistent_ids.contains(&id) {
            self.persistent_ids.push(id);
        }
    }

    /// Extends this resource's lifetime to cover `other`'s.
    pub fn absorb(&mut self, other: &ResourceCreateInfo) {
        fn merge(
            a: Option<PassIndex>,
            b: Option<PassIndex>,
            f: fn(PassIndex, PassIndex) -> PassIndex,
        ) -> Option<PassIndex> {
            match (a, b) {
                (Some(a), Some(b)) => Some(f(a, b)),
                (a, b) => a.or(b),
            }
        }
        self.first_use = merge(self.first_use, other.first_use, PassIndex::min);
        self.last_read = merge(self.last_read, other.last_read, PassIndex::max);
        self.last_write = merge(self.last_write, other.last_write, PassIndex::max);
    }
}

/// Declaration of an image or a volume.
#[derive(Debug, Clone)]
pub struct ImageCreateInfo {
    pub base: ResourceCreateInfo,
    pub kind: ImageKind,
    pub extent: vk::Extent3D,
    pub mips: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// Image this one is declared as a copy of.
    pub copy_src: Option<u32>,
    pub alias_of: Option<u32>,
}

impl ImageCreateInfo {
    pub fn new(kind: ImageKind, format: vk::Format, extent: vk::Extent3D, mips: u32) -> Self {
        Self {
            base: ResourceCreateInfo::default(),
            kind,
            extent,
            mips,
            format,
            usage: vk::ImageUsageFlags::empty(),
            copy_src: None,
            alias_of: None,
        }
    }

    pub fn size_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub fn to_spec(&self) -> ImageSpec {
        ImageSpec::default()
            .kind(self.kind)
            .format(self.format)
            .extent(self.extent)
            .mips(self.mips)
            .usage(self.usage)
    }
}

#[derive(Debug, Clone)]
pub struct BufferCreateInfo {
    pub base: ResourceCreateInfo,
    pub byte_size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory: MemoryType,
    pub copy_src: Option<u32>,
    pub alias_of: Option<u32>,
}

impl BufferCreateInfo {
    pub fn new(byte_size: u64) -> Self {
        Self {
            base: ResourceCreateInfo::default(),
            byte_size,
            usage: vk::BufferUsageFlags::empty(),
            memory: MemoryType::DeviceLocal,
            copy_src: None,
            alias_of: None,
        }
    }

    pub fn to_spec(&self) -> BufferSpec {
        BufferSpec::default()
            .size(self.byte_size)
            .usage(self.usage)
            .memory(self.memory)
    }
}

/// Declarations that a copy may be folded into.
pub(crate) trait Aliasable {
    fn base(&self) -> &ResourceCreateInfo;
    fn base_mut(&mut self) -> &mut ResourceCreateInfo;
    fn copy_src(&self) -> Option<u32>;
    fn alias_of(&self) -> Option<u32>;
    fn set_alias_of(&mut self, target: u32);
    fn same_shape(&self, other: &Self) -> bool;
    /// Folds `other`'s usage into `self` once `other` becomes an alias of it.
    fn absorb_usage(&mut self, other: &Self);
}

impl Aliasable for ImageCreateInfo {
    fn base(&self) -> &ResourceCreateInfo {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceCreateInfo {
        &mut self.base
    }

    fn copy_src(&self) -> Option<u32> {
        self.copy_src
    }

    fn alias_of(&self) -> Option<u32> {
        self.alias_of
    }

    fn set_alias_of(&mut self, target: u32) {
        self.alias_of = Some(target);
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.format == other.format
            && self.extent == other.extent
            && self.mips == other.mips
    }

    fn absorb_usage(&mut self, other: &Self) {
        self.usage |= other.usage;
    }
}

impl Aliasable for BufferCreateInfo {
    fn base(&self) -> &ResourceCreateInfo {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceCreateInfo {
        &mut self.base
    }

    fn copy_src(&self) -> Option<u32> {
        self.copy_src
    }

    fn alias_of(&self) -> Option<u32> {
        self.alias_of
    }

    fn set_alias_of(&mut self, target: u32) {
        self.alias_of = Some(target);
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.byte_size == other.byte_size && self.memory == other.memory
    }

    fn absorb_usage(&mut self, other: &Self) {
        self.usage |= other.usage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_use_tracks_extents() {
        let key = ResourceKey::Image(0);
        let mut info = ResourceCreateInfo::default();
        info.register_use(key, 3, true).unwrap();
        info.register_use(key, 1, false).unwrap();
        info.register_use(key, 5, false).unwrap();

        assert_eq!(info.first_use, Some(1));
        assert_eq!(info.last_write, Some(3));
        assert_eq!(info.last_read, Some(5));
        assert_eq!(info.last_use(), Some(5));
    }

    #[test]
    fn test_carried_over_must_be_read_first() {
        let key = ResourceKey::Image(0);
        let mut info = ResourceCreateInfo {
            carried_over: true,
            ..Default::default()
        };
        assert_eq!(
            info.register_use(key, 0, true),
            Err(GraphError::CarriedOverWrite {
                resource: key,
                pass: 0
            })
        );
        info.register_use(key, 0, false).unwrap();
        info.register_use(key, 1, true).unwrap();
    }

    #[test]
    fn test_absorb_extends_lifetime() {
        let mut a = ResourceCreateInfo {
            first_use: Some(0),
            last_write: Some(0),
            ..Default::default()
        };
        let b = ResourceCreateInfo {
            first_use: Some(1),
            last_read: Some(4),
            last_write: Some(2),
            ..Default::default()
        };
        a.absorb(&b);
        assert_eq!(a.first_use, Some(0));
        assert_eq!(a.last_write, Some(2));
        assert_eq!(a.last_read, Some(4));
    }
}
