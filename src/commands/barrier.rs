use ash::vk;

/// Logical state a texture can be transitioned through.
///
/// The abstraction does not track these; the caller (or the render graph on
/// its behalf) declares the old and new state on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureState {
    #[default]
    Undefined,
    /// Target of buffer-to-texture copies.
    UploadDst,
    ShaderRead,
    RenderTarget,
    Present,
}

impl TextureState {
    pub(crate) const ALL: [TextureState; 5] = [
        TextureState::Undefined,
        TextureState::UploadDst,
        TextureState::ShaderRead,
        TextureState::RenderTarget,
        TextureState::Present,
    ];
}

/// (layout, stage mask, access mask) triple describing one side of a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    pub layout: vk::ImageLayout,
    pub stage_mask: vk::PipelineStageFlags,
    pub access_mask: vk::AccessFlags,
}

/// Pure mapping from a logical state to its barrier triple.
pub fn state_info(state: TextureState) -> StateInfo {
    match state {
        TextureState::Undefined => StateInfo {
            layout: vk::ImageLayout::UNDEFINED,
            stage_mask: vk::PipelineStageFlags::TOP_OF_PIPE,
            access_mask: vk::AccessFlags::empty(),
        },
        TextureState::UploadDst => StateInfo {
            layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            stage_mask: vk::PipelineStageFlags::TRANSFER,
            access_mask: vk::AccessFlags::TRANSFER_WRITE,
        },
        TextureState::ShaderRead => StateInfo {
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::COMPUTE_SHADER,
            access_mask: vk::AccessFlags::SHADER_READ,
        },
        TextureState::RenderTarget => StateInfo {
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::COLOR_ATTACHMENT_READ,
        },
        TextureState::Present => StateInfo {
            layout: vk::ImageLayout::PRESENT_SRC_KHR,
            stage_mask: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            access_mask: vk::AccessFlags::empty(),
        },
    }
}

/// Barrier descriptor for an (old, new) state pair.
///
/// No validation is performed against the texture's true prior state; the
/// caller's declaration is taken at face value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierDesc {
    pub src: StateInfo,
    pub dst: StateInfo,
}

pub fn barrier_desc(old: TextureState, new: TextureState) -> BarrierDesc {
    BarrierDesc {
        src: state_info(old),
        dst: state_info(new),
    }
}

impl BarrierDesc {
    pub(crate) fn image_barrier<'a>(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> vk::ImageMemoryBarrier<'a> {
        vk::ImageMemoryBarrier::default()
            .src_access_mask(self.src.access_mask)
            .dst_access_mask(self.dst.access_mask)
            .old_layout(self.src.layout)
            .new_layout(self.dst.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_pair_yields_valid_barrier() {
        for old in TextureState::ALL {
            for new in TextureState::ALL {
                let desc = barrier_desc(old, new);
                assert!(
                    !desc.src.stage_mask.is_empty(),
                    "{old:?} has empty source stage mask"
                );
                assert!(
                    !desc.dst.stage_mask.is_empty(),
                    "{new:?} has empty destination stage mask"
                );
                assert_eq!(desc.src.layout, state_info(old).layout);
                assert_eq!(desc.dst.layout, state_info(new).layout);
            }
        }
    }

    #[test]
    fn round_trip_pairs_are_independent() {
        let forward = barrier_desc(TextureState::UploadDst, TextureState::ShaderRead);
        let back = barrier_desc(TextureState::ShaderRead, TextureState::UploadDst);
        assert_eq!(forward.src, back.dst);
        assert_eq!(forward.dst, back.src);
    }

    #[test]
    fn upload_dst_is_transfer_write() {
        let info = state_info(TextureState::UploadDst);
        assert_eq!(info.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(info.access_mask, vk::AccessFlags::TRANSFER_WRITE);
    }
}
