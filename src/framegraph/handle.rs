//! Frame-local resource handles.
//!
//! A handle is an index into the graph's per-kind declaration arrays. The
//! `M` parameter separates handles that may be written ([`Mutable`]) from
//! those that may only be read ([`ReadOnly`]); a mutable handle converts into
//! its read-only counterpart, never the other way around.

use std::{fmt, hash::Hash, marker::PhantomData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mutable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadOnly;

/// Identifies any declared resource regardless of its kind or mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    Image(u32),
    Volume(u32),
    Buffer(u32),
}

impl ResourceKey {
    pub fn index(self) -> usize {
        match self {
            ResourceKey::Image(i) | ResourceKey::Volume(i) | ResourceKey::Buffer(i) => i as usize,
        }
    }

    pub fn is_buffer(self) -> bool {
        matches!(self, ResourceKey::Buffer(_))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Image(i) => write!(f, "image#{i}"),
            ResourceKey::Volume(i) => write!(f, "volume#{i}"),
            ResourceKey::Buffer(i) => write!(f, "buffer#{i}"),
        }
    }
}

pub(crate) mod sealed {
    /// Construction of handles from raw indices, reserved to the graph.
    pub trait FromIndex {
        fn from_index(index: u32) -> Self;
    }
}

/// Any handle that names a declared resource.
///
/// Read-only handles cannot be written:
///
/// ```compile_fail
/// use framegraph::framegraph::{ImageId, PassBuilder};
///
/// fn write_history(builder: &mut PassBuilder<'_>, prev: ImageId) {
///     builder.add_storage_output(prev).unwrap();
/// }
/// ```
///
/// and only the graph mints handles, so one cannot be rebuilt as mutable
/// from its index:
///
/// ```compile_fail
/// use framegraph::framegraph::{ImageId, MutableImageId};
/// use framegraph::framegraph::handle::sealed::FromIndex;
///
/// fn forge(prev: ImageId) -> MutableImageId {
///     MutableImageId::from_index(prev.index())
/// }
/// ```
pub trait Resource: Copy + Into<ResourceKey> {
    /// The writable handle of the same kind.
    type Mutable: MutableResource + sealed::FromIndex;

    fn key(self) -> ResourceKey {
        self.into()
    }
}

/// Handles that may be passed where the resource is written.
pub trait MutableResource: Resource {}

macro_rules! resource_handle {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $mutable_alias:ident) => {
        $(#[$doc])*
        pub struct $name<M = ReadOnly> {
            index: u32,
            _mutability: PhantomData<M>,
        }

        pub type $mutable_alias = $name<Mutable>;

        impl<M> $name<M> {
            pub(crate) fn new(index: u32) -> Self {
                Self {
                    index,
                    _mutability: PhantomData,
                }
            }

            pub fn index(self) -> u32 {
                self.index
            }
        }

        impl<M> Clone for $name<M> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<M> Copy for $name<M> {}

        impl<M> PartialEq for $name<M> {
            fn eq(&self, other: &Self) -> bool {
                self.index == other.index
            }
        }

        impl<M> Eq for $name<M> {}

        impl<M> Hash for $name<M> {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.index.hash(state);
            }
        }

        impl<M> fmt::Debug for $name<M> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.index)
            }
        }

        impl From<$name<Mutable>> for $name<ReadOnly> {
            fn from(value: $name<Mutable>) -> Self {
                Self::new(value.index)
            }
        }

        impl<M> From<$name<M>> for ResourceKey {
            fn from(value: $name<M>) -> Self {
                ResourceKey::$variant(value.index)
            }
        }

        impl<M> Resource for $name<M> {
            type Mutable = $name<Mutable>;
        }

        impl<M> sealed::FromIndex for $name<M> {
            fn from_index(index: u32) -> Self {
                Self::new(index)
            }
        }

        impl MutableResource for $name<Mutable> {}
    };
}

resource_handle!(
    /// A two dimensional image declared in the current frame.
    ImageId,
    Image,
    MutableImageId
);
resource_handle!(
    /// A three dimensional image declared in the current frame.
    VolumeId,
    Volume,
    MutableVolumeId
);
resource_handle!(
    /// A buffer declared in the current frame.
    BufferId,
    Buffer,
    MutableBufferId
);

/// Caller-minted identifier under which a resource survives into later
/// frames. Stable only for the lifetime of the pool that stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersistentId(pub u32);

impl fmt::Display for PersistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persistent#{}", self.0)
    }
}
