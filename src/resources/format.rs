use ash::vk;

/// Texel and vertex-attribute formats understood by the abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Undefined,
    Rg8,
    Rg32,
    Rgb8,
    Rgb32,
    Rgba8,
    Rgba32,
    Depth16,
    Depth24Stencil8,
    Depth32,
    Depth32Stencil8,
}

impl Format {
    pub(crate) fn to_vk(self) -> vk::Format {
        match self {
            Format::Undefined => vk::Format::UNDEFINED,
            Format::Rg8 => vk::Format::R8G8_UNORM,
            Format::Rg32 => vk::Format::R32G32_SFLOAT,
            Format::Rgb8 => vk::Format::R8G8B8_UNORM,
            Format::Rgb32 => vk::Format::R32G32B32_SFLOAT,
            Format::Rgba8 => vk::Format::R8G8B8A8_UNORM,
            Format::Rgba32 => vk::Format::R32G32B32A32_SFLOAT,
            Format::Depth16 => vk::Format::D16_UNORM,
            Format::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
            Format::Depth32 => vk::Format::D32_SFLOAT,
            Format::Depth32Stencil8 => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    /// Byte width of one element when used as a vertex attribute.
    pub fn byte_width(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::Rg8 => 2,
            Format::Rg32 => 8,
            Format::Rgb8 => 3,
            Format::Rgb32 => 12,
            Format::Rgba8 => 4,
            Format::Rgba32 => 16,
            Format::Depth16 => 2,
            Format::Depth24Stencil8 => 4,
            Format::Depth32 => 4,
            Format::Depth32Stencil8 => 5,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::Depth16
                | Format::Depth24Stencil8
                | Format::Depth32
                | Format::Depth32Stencil8
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::Depth24Stencil8 | Format::Depth32Stencil8)
    }

    pub(crate) fn aspect_mask(self) -> vk::ImageAspectFlags {
        if self.is_depth() {
            if self.has_stencil() {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_widths_match_component_layout() {
        assert_eq!(Format::Rg8.byte_width(), 2);
        assert_eq!(Format::Rg32.byte_width(), 8);
        assert_eq!(Format::Rgb32.byte_width(), 12);
        assert_eq!(Format::Rgba8.byte_width(), 4);
        assert_eq!(Format::Rgba32.byte_width(), 16);
    }

    #[test]
    fn depth_formats_report_depth_aspect() {
        assert!(Format::Depth32.is_depth());
        assert!(!Format::Depth32.has_stencil());
        assert!(Format::Depth24Stencil8.has_stencil());
        assert_eq!(Format::Rgba8.aspect_mask(), vk::ImageAspectFlags::COLOR);
        assert!(
            Format::Depth32Stencil8
                .aspect_mask()
                .contains(vk::ImageAspectFlags::STENCIL)
        );
    }
}
