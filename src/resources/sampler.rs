use std::sync::Arc;

use ash::vk;
use color_eyre::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    Clamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerFilterMode {
    #[default]
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerInfo {
    pub address_mode: SamplerAddressMode,
    pub filter_mode: SamplerFilterMode,
}

pub struct Sampler {
    pub(crate) raw: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Sampler {
    pub(crate) fn new(info: &SamplerInfo, device: Arc<ash::Device>) -> Result<Self> {
        let address_mode = match info.address_mode {
            SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            SamplerAddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        };
        let filter = match info.filter_mode {
            SamplerFilterMode::Linear => vk::Filter::LINEAR,
            SamplerFilterMode::Nearest => vk::Filter::NEAREST,
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let raw = unsafe { device.create_sampler(&sampler_info, None)? };

        Ok(Self { raw, device })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.raw, None);
        }
    }
}
