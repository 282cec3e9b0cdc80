use ash::vk;

use crate::image::spec::ImageSpec;

pub struct Image {
    pub vk_image: vk::Image,
    pub vk_view: vk::ImageView,
    pub allocation: vk_mem::Allocation,
    pub spec: ImageSpec,
}

impl Image {
    pub fn vk_image(&self) -> vk::Image {
        self.vk_image
    }

    pub fn vk_view(&self) -> vk::ImageView {
        self.vk_view
    }
}
