//! Errors raised when a frame graph is malformed.
//!
//! None of these are recoverable for the frame that produced them: the graph
//! refuses to continue and the error travels up to the frame loop.

use ash::vk;

use super::{
    handle::{PersistentId, ResourceKey},
    resource::PassIndex,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A handle that was never declared in this frame.
    #[error("invalid or undeclared resource {0}")]
    InvalidResource(ResourceKey),
    /// A declaration with a zero sized dimension.
    #[error("cannot declare a zero sized {kind}")]
    ZeroSize { kind: &'static str },
    #[error("a buffer of {count} elements of {element_size} bytes overflows its size")]
    BufferSizeOverflow { count: usize, element_size: usize },
    /// The same resource registered twice in one pass.
    #[error("{resource} is used more than once in pass \"{pass}\"")]
    DuplicateUsage { resource: ResourceKey, pass: String },
    #[error("pass \"{pass}\" already has a depth attachment")]
    DuplicateDepthAttachment { pass: String },
    /// A clearing attachment output would discard contents written earlier.
    #[error(
        "pass \"{pass}\" would discard the contents of {resource} written by pass {written_by}; use LoadOp::Load"
    )]
    AttachmentOverwrite {
        resource: ResourceKey,
        pass: String,
        written_by: PassIndex,
    },
    #[error("{resource} does not match the framebuffer size of pass \"{pass}\"")]
    AttachmentSizeMismatch { resource: ResourceKey, pass: String },
    #[error("compute pass \"{pass}\" cannot have attachments")]
    AttachmentOnComputePass { pass: String },
    #[error("callback kind does not match the kind of pass \"{pass}\"")]
    CallbackKindMismatch { pass: String },
    /// Volumes never share backing memory.
    #[error("volume aliasing is not supported ({0})")]
    VolumeAliasing(ResourceKey),
    #[error("{alias} cannot alias {target}: shapes differ")]
    IncompatibleAlias { alias: ResourceKey, target: ResourceKey },
    #[error("{0} already has a backing resource")]
    ResourceExists(ResourceKey),
    /// A persistent resource requested but never stored.
    #[error("no resource stored under {0}")]
    MissingPersistent(PersistentId),
    /// A resource carried over from the previous frame written before it was read.
    #[error(
        "{resource} carries the previous frame's contents and is written by pass {pass} before being read"
    )]
    CarriedOverWrite { resource: ResourceKey, pass: PassIndex },
    /// The previous frame created a carried over image without usages this
    /// frame needs. Declare them on the persistent image.
    #[error("{resource} is carried over without the {missing:?} usage it is given this frame")]
    CarriedImageUsage {
        resource: ResourceKey,
        missing: vk::ImageUsageFlags,
    },
    #[error("{resource} is carried over without the {missing:?} usage it is given this frame")]
    CarriedBufferUsage {
        resource: ResourceKey,
        missing: vk::BufferUsageFlags,
    },
    #[error("invalid descriptor set index {index} in pass \"{pass}\"")]
    InvalidDescriptorSet { pass: String, index: i32 },
    #[error("{0} is not mapped for CPU writes")]
    NotHostVisible(ResourceKey),
    #[error("write of {len} bytes at offset {offset} overflows {resource} of {size} bytes")]
    MappedRangeOutOfBounds {
        resource: ResourceKey,
        offset: u64,
        len: u64,
        size: u64,
    },
    /// Regions must be closed innermost first.
    #[error("region \"{name}\" closed out of order or twice")]
    UnbalancedRegion { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::DuplicateUsage {
            resource: ResourceKey::Image(2),
            pass: "gbuffer".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "image#2 is used more than once in pass \"gbuffer\""
        );

        let err = GraphError::MissingPersistent(PersistentId(7));
        assert_eq!(err.to_string(), "no resource stored under persistent#7");
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = GraphError::VolumeAliasing(ResourceKey::Volume(0)).into();
        assert_eq!(
            err.downcast_ref::<GraphError>(),
            Some(&GraphError::VolumeAliasing(ResourceKey::Volume(0)))
        );
    }
}
