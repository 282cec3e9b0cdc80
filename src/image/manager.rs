use anyhow::Context;
use ash::vk;
use slotmap::SlotMap;

use vk_mem::Alloc;

use crate::vulkan::DeviceContext;

use super::{
    ImageKey,
    resource::Image,
    spec::{ImageKind, ImageSpec},
};

/// Owns every native image handed out by the Vulkan backend, each with one
/// view covering all of its mips.
#[derive(Default)]
pub struct ImageManager {
    images: SlotMap<ImageKey, Image>,
}

impl ImageManager {
    #[inline]
    pub fn image(&self, key: ImageKey) -> &Image {
        self.images.get(key).expect("image: invalid ImageKey")
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn create_image(
        &mut self,
        allocator: &vk_mem::Allocator,
        device_context: &DeviceContext,
        spec: &ImageSpec,
    ) -> anyhow::Result<ImageKey> {
        let (vk_image, mut allocation) =
            with_image_create_info(spec, |ici, aci| unsafe { allocator.create_image(ici, aci) })
                .context("failed to create image")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(vk_image)
            .view_type(match spec.kind {
                ImageKind::Image2D => vk::ImageViewType::TYPE_2D,
                ImageKind::Volume => vk::ImageViewType::TYPE_3D,
            })
            .format(spec.format)
            .subresource_range(spec.subresource_range());

        let vk_view = match unsafe { device_context.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.destroy_image(vk_image, &mut allocation) };
                return Err(e).context("failed to create ImageView");
            }
        };

        if let Some(debug_name) = spec.debug_name.as_deref() {
            device_context.name_object(vk_image, debug_name)?;
            device_context.name_object(vk_view, format!("{debug_name}(View)"))?;
        }

        let key = self.images.insert(Image {
            vk_image,
            vk_view,
            allocation,
            spec: spec.clone(),
        });
        log::trace!("created image {:?}: {}", key, spec);
        Ok(key)
    }

    pub fn destroy_image(
        &mut self,
        device: &ash::Device,
        allocator: &vk_mem::Allocator,
        key: ImageKey,
    ) {
        let Some(mut image) = self.images.remove(key) else {
            log::warn!("destroy_image: unknown ImageKey {:?}", key);
            return;
        };
        unsafe {
            device.destroy_image_view(image.vk_view, None);
            allocator.destroy_image(image.vk_image, &mut image.allocation);
        }
    }

    pub fn cleanup(&mut self, device: &ash::Device, allocator: &vk_mem::Allocator) {
        if !self.images.is_empty() {
            log::warn!("destroying {} images still owned at shutdown", self.images.len());
        }
        for (_, mut image) in self.images.drain() {
            unsafe {
                device.destroy_image_view(image.vk_view, None);
                allocator.destroy_image(image.vk_image, &mut image.allocation);
            }
        }
    }
}

fn with_image_create_info<R>(
    spec: &ImageSpec,
    f: impl FnOnce(&vk::ImageCreateInfo, &vk_mem::AllocationCreateInfo) -> R,
) -> R {
    let ici = vk::ImageCreateInfo::default()
        .image_type(match spec.kind {
            ImageKind::Image2D => vk::ImageType::TYPE_2D,
            ImageKind::Volume => vk::ImageType::TYPE_3D,
        })
        .format(spec.format)
        .mip_levels(spec.mips)
        .array_layers(1)
        .extent(spec.extent)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(spec.usage);

    let aci = vk_mem::AllocationCreateInfo {
        usage: vk_mem::MemoryUsage::Auto,
        ..Default::default()
    };

    f(&ici, &aci)
}
