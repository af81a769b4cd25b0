use std::sync::{Arc, Mutex};

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::{
    MemoryLocation,
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
};

use crate::resources::format::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureKind {
    D1,
    #[default]
    D2,
    D3,
}

impl TextureKind {
    fn to_vk(self) -> vk::ImageType {
        match self {
            TextureKind::D1 => vk::ImageType::TYPE_1D,
            TextureKind::D2 => vk::ImageType::TYPE_2D,
            TextureKind::D3 => vk::ImageType::TYPE_3D,
        }
    }

    fn view_type(self) -> vk::ImageViewType {
        match self {
            TextureKind::D1 => vk::ImageViewType::TYPE_1D,
            TextureKind::D2 => vk::ImageViewType::TYPE_2D,
            TextureKind::D3 => vk::ImageViewType::TYPE_3D,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureUsage {
    #[default]
    Sampled,
    ColorAttachment,
    DepthStencilAttachment,
}

impl TextureUsage {
    fn to_vk(self) -> vk::ImageUsageFlags {
        match self {
            TextureUsage::Sampled => {
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
            }
            TextureUsage::ColorAttachment => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
            }
            TextureUsage::DepthStencilAttachment => {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureInfo {
    pub usage: TextureUsage,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub mip_levels: u32,
}

pub struct Texture {
    pub(crate) image: vk::Image,
    pub(crate) view: vk::ImageView,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub(crate) aspect: vk::ImageAspectFlags,

    // None for swapchain-owned images: the swapchain frees them, we only
    // own the view.
    allocation: Option<Allocation>,
    memory_allocator: Option<Arc<Mutex<Allocator>>>,
    device: Arc<ash::Device>,
}

impl Texture {
    pub(crate) fn new(
        info: &TextureInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(eyre!("Cannot create a texture with a zero extent"));
        }
        let format = info.format.to_vk();
        if format == vk::Format::UNDEFINED {
            return Err(eyre!("Cannot create a texture with an undefined format"));
        }

        let mip_levels = info.mip_levels.max(1);
        let aspect = info.format.aspect_mask();
        let extent = vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: 1,
        };

        let image = {
            let image_info = vk::ImageCreateInfo::default()
                .format(format)
                .usage(info.usage.to_vk())
                .extent(extent)
                .image_type(info.kind.to_vk())
                .mip_levels(mip_levels)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL);
            unsafe { device.create_image(&image_info, None)? }
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: "texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            })?;
        unsafe {
            device.bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view = create_view(&device, image, info.kind.view_type(), format, aspect, mip_levels)?;

        Ok(Self {
            image,
            view,
            extent,
            format,
            mip_levels,
            aspect,

            allocation: Some(allocation),
            memory_allocator: Some(memory_allocator),
            device,
        })
    }

    /// Wraps an image owned by a swapchain; only the view is created here.
    pub(crate) fn wrap_swapchain_image(
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let view = create_view(
            &device,
            image,
            vk::ImageViewType::TYPE_2D,
            format,
            vk::ImageAspectFlags::COLOR,
            1,
        )?;

        Ok(Self {
            image,
            view,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            format,
            mip_levels: 1,
            aspect: vk::ImageAspectFlags::COLOR,

            allocation: None,
            memory_allocator: None,
            device,
        })
    }
}

fn create_view(
    device: &ash::Device,
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .view_type(view_type)
        .image(image)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });
    Ok(unsafe { device.create_image_view(&view_info, None)? })
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Some(allocator) = &self.memory_allocator {
                if let Ok(mut allocator) = allocator.lock() {
                    let _ = allocator.free(allocation);
                }
            }
            unsafe {
                self.device.destroy_image(self.image, None);
            }
        }
    }
}
