use ash::vk;

use crate::{buffer::BufferKey, image::ImageKey};

use super::{error::GraphError, handle::ResourceKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerType {
    #[default]
    LinearRepeat,
    LinearClamp,
    PointRepeat,
    PointClamp,
    Shadow,
}

/// A binding owned by something outside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalDescriptor {
    Image {
        view: vk::ImageView,
        layout: vk::ImageLayout,
        sampler: SamplerType,
    },
    Buffer {
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    },
    Sampler(SamplerType),
}

/// A binding as declared by a pass, in terms of graph resources.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    SampledImage {
        resource: ResourceKey,
        sampler: SamplerType,
    },
    StorageImage(ResourceKey),
    UniformBuffer(ResourceKey),
    StorageBuffer(ResourceKey),
    Inline(Vec<u8>),
    External(ExternalDescriptor),
}

/// A binding resolved against the frame's backing resources, ready to be
/// written into a native descriptor set.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundDescriptor {
    SampledImage { image: ImageKey, sampler: SamplerType },
    StorageImage(ImageKey),
    UniformBuffer { buffer: BufferKey, size: u64 },
    StorageBuffer { buffer: BufferKey, size: u64 },
    Inline(Vec<u8>),
    External(ExternalDescriptor),
}

/// Descriptor sets of one pass. Set indices may be negative, counting from
/// the end: `-1` names the last set, so appending to it never needs the
/// caller to know how many sets exist.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSets {
    sets: Vec<Vec<Descriptor>>,
}

impl DescriptorSets {
    pub fn add(&mut self, pass: &str, index: i32, descriptor: Descriptor) -> Result<(), GraphError> {
        let slot = self.resolve(pass, index)?;
        if slot >= self.sets.len() {
            self.sets.resize_with(slot + 1, Vec::new);
        }
        self.sets[slot].push(descriptor);
        Ok(())
    }

    /// Index of the set that the next new set would occupy.
    pub fn next_index(&self) -> i32 {
        self.sets.len() as i32
    }

    pub fn sets(&self) -> &[Vec<Descriptor>] {
        &self.sets
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    fn resolve(&self, pass: &str, index: i32) -> Result<usize, GraphError> {
        if index >= 0 {
            return Ok(index as usize);
        }
        if self.sets.is_empty() && index == -1 {
            return Ok(0);
        }
        let slot = self.sets.len() as i64 + index as i64;
        if slot < 0 {
            return Err(GraphError::InvalidDescriptorSet {
                pass: pass.to_owned(),
                index,
            });
        }
        Ok(slot as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_index_appends_to_last_set() {
        let mut sets = DescriptorSets::default();
        sets.add("p", -1, Descriptor::Inline(vec![0])).unwrap();
        sets.add("p", 1, Descriptor::Inline(vec![1])).unwrap();
        sets.add("p", -1, Descriptor::Inline(vec![2])).unwrap();

        assert_eq!(sets.sets().len(), 2);
        assert_eq!(sets.sets()[0].len(), 1);
        assert_eq!(
            sets.sets()[1],
            vec![Descriptor::Inline(vec![1]), Descriptor::Inline(vec![2])]
        );
        assert_eq!(sets.next_index(), 2);
    }

    #[test]
    fn test_positive_index_fills_gaps() {
        let mut sets = DescriptorSets::default();
        sets.add("p", 2, Descriptor::UniformBuffer(ResourceKey::Buffer(0)))
            .unwrap();
        assert_eq!(sets.sets().len(), 3);
        assert!(sets.sets()[0].is_empty());
    }

    #[test]
    fn test_negative_index_out_of_range() {
        let mut sets = DescriptorSets::default();
        sets.add("p", 0, Descriptor::Inline(vec![])).unwrap();
        assert_eq!(
            sets.add("p", -2, Descriptor::Inline(vec![])),
            Err(GraphError::InvalidDescriptorSet {
                pass: "p".to_owned(),
                index: -2
            })
        );
    }
}
