use std::sync::Arc;

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::TextureHandle;
use crate::resources::texture::Texture;

/// Surface formats tried in order before falling back to the first one the
/// surface reports.
const PREFERRED_SURFACE_FORMATS: [vk::SurfaceFormatKHR; 2] = [
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
];

pub struct SwapChainInfo {
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
    pub width: u32,
    pub height: u32,
}

/// Ring of presentable images over a window surface.
///
/// Image acquisition is always synchronous: after creation, resize, and
/// every present, the next image index is acquired with a throwaway fence
/// before control returns to the caller.
pub struct SwapChain {
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    loader: ash::khr::swapchain::Device,
    physical: vk::PhysicalDevice,

    swapchain: vk::SwapchainKHR,
    pub(crate) surface_format: vk::SurfaceFormatKHR,
    pub(crate) extent: vk::Extent2D,

    // Texture-table handles wrapping the current image ring; owned by the
    // device and refreshed on every resize.
    pub(crate) image_textures: Vec<TextureHandle>,
    pub(crate) current_image: u32,

    device: Arc<ash::Device>,
}

impl SwapChain {
    pub(crate) fn new(
        info: &SwapChainInfo,
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        device: Arc<ash::Device>,
    ) -> Result<(Self, Vec<Texture>)> {
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                info.display_handle,
                info.window_handle,
                None,
            )?
        };
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        let loader = ash::khr::swapchain::Device::new(instance, &device);

        let mut swap_chain = Self {
            surface,
            surface_loader,
            loader,
            physical,
            swapchain: vk::SwapchainKHR::null(),
            surface_format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            image_textures: Vec::new(),
            current_image: 0,
            device,
        };

        let wrappers = swap_chain.recreate(info.width, info.height)?;
        Ok((swap_chain, wrappers))
    }

    /// Builds (or rebuilds) the image chain and returns fresh texture
    /// wrappers for the device to register. The previous chain, if any, is
    /// passed as `old_swapchain` and destroyed afterwards.
    pub(crate) fn recreate(&mut self, width: u32, height: u32) -> Result<Vec<Texture>> {
        let surface_capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical, self.surface)?
        };
        let surface_formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical, self.surface)?
        };
        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical, self.surface)?
        };

        let surface_format = PREFERRED_SURFACE_FORMATS
            .iter()
            .find(|preferred| {
                surface_formats.iter().any(|available| {
                    available.format == preferred.format
                        && available.color_space == preferred.color_space
                })
            })
            .copied()
            .or_else(|| surface_formats.first().copied())
            .ok_or_eyre("Surface reports no formats")?;

        let present_mode = if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            // FIFO is the only universally supported mode.
            log::warn!("Preferred present mode unavailable, falling back to FIFO");
            vk::PresentModeKHR::FIFO
        };

        let extent = {
            if surface_capabilities.current_extent.width != u32::MAX {
                surface_capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(
                        surface_capabilities.min_image_extent.width,
                        surface_capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        surface_capabilities.min_image_extent.height,
                        surface_capabilities.max_image_extent.height,
                    ),
                }
            }
        };

        let min_image_count = {
            let min = surface_capabilities.min_image_count;
            let max = surface_capabilities.max_image_count;
            // Recommended to request at least one more image than the minimum
            // to prevent having to wait on driver to complete internal operations
            // before another image can be acquired
            if max > 0 && min + 1 > max { max } else { min + 1 }
        };
        let pre_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };

        let old_swapchain = self.swapchain;
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.loader.create_swapchain(&swapchain_info, None)? };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.loader.destroy_swapchain(old_swapchain, None);
            }
        }

        self.swapchain = swapchain;
        self.surface_format = surface_format;
        self.extent = extent;
        self.current_image = 0;

        let images = unsafe { self.loader.get_swapchain_images(self.swapchain)? };
        images
            .into_iter()
            .map(|image| {
                Texture::wrap_swapchain_image(
                    image,
                    surface_format.format,
                    extent,
                    self.device.clone(),
                )
            })
            .collect()
    }

    /// Synchronously acquires the next presentable image index.
    pub(crate) fn acquire_next(&mut self) -> Result<()> {
        let fence_info = vk::FenceCreateInfo::default();
        let fence = unsafe { self.device.create_fence(&fence_info, None)? };

        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                fence,
            )
        };
        let index = match result {
            Ok((index, _suboptimal)) => {
                let wait =
                    unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) };
                unsafe {
                    self.device.destroy_fence(fence, None);
                }
                wait?;
                index
            }
            Err(err) => {
                unsafe {
                    self.device.destroy_fence(fence, None);
                }
                return Err(eyre!("Failed to acquire swapchain image: {err}"));
            }
        };

        self.current_image = index;
        Ok(())
    }

    /// Presents the current image, then immediately acquires the next one.
    pub(crate) fn present(
        &mut self,
        queue: vk::Queue,
        wait_semaphore: Option<vk::Semaphore>,
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [self.current_image];
        let wait_semaphores = wait_semaphore.map(|semaphore| [semaphore]);

        let mut present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        if let Some(wait_semaphores) = &wait_semaphores {
            present_info = present_info.wait_semaphores(wait_semaphores);
        }

        unsafe {
            self.loader.queue_present(queue, &present_info)?;
        }

        self.acquire_next()
    }

    /// Texture wrapping the currently acquired image.
    pub(crate) fn current_texture(&self) -> Result<TextureHandle> {
        self.image_textures
            .get(self.current_image as usize)
            .copied()
            .ok_or_eyre("SwapChain has no acquired image")
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
