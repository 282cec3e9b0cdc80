mod alias;
mod barrier;
mod builder;
mod descriptor;
mod error;
mod frame_resources;
mod framebuffer;
mod graph;
mod handle;
mod pass;
mod pool;
mod region;
mod resource;
mod settings;

pub use graph::FrameGraph;

pub use builder::{Binding, PassBuilder};

pub use frame_resources::FrameResources;
pub use pool::{ResourcePool, TransientBuffer, TransientImage};

pub use pass::{
    ComputeCallback, FrameGraphPass, GraphicsCallback, PassCallback, PassContext, PassKind,
    RenderPassRecorder,
};
pub use region::{Region, RegionId};

pub use barrier::{
    Barrier, BarrierTracker, BufferBarrier, ImageBarrier, ResourceUsage, StageTransition,
    is_attachment_stage, stage_access,
};
pub use descriptor::{BoundDescriptor, Descriptor, DescriptorSets, ExternalDescriptor, SamplerType};
pub use framebuffer::{Attachment, Framebuffer, FramebufferAttachment, LoadOp};
pub use handle::{
    BufferId, ImageId, Mutable, MutableBufferId, MutableImageId, MutableResource, MutableVolumeId,
    PersistentId, ReadOnly, Resource, ResourceKey, VolumeId,
};
pub use resource::{BufferCreateInfo, ImageCreateInfo, PassIndex, ResourceCreateInfo};

pub use error::GraphError;
pub use settings::{DEFAULT_RETENTION_FRAMES, FrameGraphSettings, PoolSettings};
