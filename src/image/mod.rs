mod keys;
mod manager;
mod resource;
mod spec;

pub use keys::ImageKey;
pub use manager::ImageManager;
pub use resource::Image;
pub use spec::{ImageKind, ImageSpec, is_depth_format};
