mod keys;
mod manager;
mod resource;
mod spec;

pub use keys::BufferKey;
pub use manager::BufferManager;
pub use resource::Buffer;
pub use spec::{BufferSpec, MemoryType};
