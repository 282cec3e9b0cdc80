use ash::vk;
use smallvec::SmallVec;

use crate::image::ImageKey;

use super::handle::ImageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
    DontCare,
}

/// An attachment as declared on a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub image: ImageId,
    pub load_op: LoadOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferAttachment {
    pub image: ImageKey,
    pub format: vk::Format,
    pub load_op: LoadOp,
}

/// Attachments of a graphics pass resolved to backing images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    pub extent: vk::Extent2D,
    pub depth: Option<FramebufferAttachment>,
    pub colors: SmallVec<[FramebufferAttachment; 4]>,
}

impl Framebuffer {
    pub fn attachments(&self) -> impl Iterator<Item = &FramebufferAttachment> {
        self.depth.iter().chain(self.colors.iter())
    }
}
