//! Handle-resolving recording operations.
//!
//! `reset`/`begin`/`end` report misuse and return errors; everything else
//! follows the lenient policy: an operation against a list that is not
//! recording, or with an unresolvable handle, logs and becomes a no-op.

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;
use smallvec::SmallVec;

use crate::commands::RenderPassInfo;
use crate::commands::barrier::TextureState;
use crate::commands::command_list::IndexType;
use crate::device::Device;
use crate::device::descriptor::ShaderStageFlags;
use crate::{BufferHandle, CommandListHandle, DescriptorSetHandle, PipelineHandle, TextureHandle};

macro_rules! resolve_or_return {
    ($device:expr, $table:ident, $handle:expr, $what:literal) => {{
        let Ok(slot) = $device.check_owner($handle, $what) else {
            log::error!(concat!($what, " handle belongs to a different device"));
            return;
        };
        match $device.$table.get(slot) {
            Some(resource) => resource,
            None => {
                log::error!(concat!($what, " not found"));
                return;
            }
        }
    }};
}

impl Device {
    fn command_list_mut(
        &mut self,
        handle: CommandListHandle,
    ) -> Result<&mut crate::commands::command_list::CommandList> {
        let slot = self.check_owner(handle, "CommandList")?;
        self.command_lists
            .get_mut(slot)
            .ok_or_eyre("CommandList not found")
    }

    /// Returns the list to a recordable state. Idempotent.
    pub fn reset(&mut self, command_list: CommandListHandle) -> Result<()> {
        self.command_list_mut(command_list)?.reset()
    }

    /// Starts recording. Fails (and reports) unless the list is idle.
    pub fn begin(&mut self, command_list: CommandListHandle) -> Result<()> {
        self.command_list_mut(command_list)?.begin()
    }

    /// Finishes recording, leaving the list submittable until reset.
    pub fn end(&mut self, command_list: CommandListHandle) -> Result<()> {
        self.command_list_mut(command_list)?.end()
    }

    pub fn begin_render_pass(&mut self, command_list: CommandListHandle, info: &RenderPassInfo) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };

        let mut extent = vk::Extent2D::default();
        let mut color_attachments: SmallVec<[(vk::ImageView, [f32; 4]); 4]> = SmallVec::new();
        for handle in &info.color_attachments {
            let texture = resolve_or_return!(self, textures, *handle, "Texture");
            extent = vk::Extent2D {
                width: texture.extent.width,
                height: texture.extent.height,
            };
            color_attachments.push((texture.view, info.clear_color));
        }

        let depth_attachment = match info.depth_attachment {
            Some(handle) => {
                let texture = resolve_or_return!(self, textures, handle, "Texture");
                Some(texture.view)
            }
            None => None,
        };

        if color_attachments.is_empty() && depth_attachment.is_none() {
            log::error!("begin_render_pass() requires at least one attachment");
            return;
        }

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.begin_rendering(extent, &color_attachments, depth_attachment);
    }

    pub fn end_render_pass(&mut self, command_list: CommandListHandle) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.end_rendering();
        } else {
            log::error!("CommandList not found");
        }
    }

    pub fn set_viewport(
        &mut self,
        command_list: CommandListHandle,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.set_viewport(x, y, width, height, min_depth, max_depth);
        } else {
            log::error!("CommandList not found");
        }
    }

    pub fn set_scissor(
        &mut self,
        command_list: CommandListHandle,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.set_scissor(x, y, width, height);
        } else {
            log::error!("CommandList not found");
        }
    }

    pub fn bind_pipeline(&mut self, command_list: CommandListHandle, pipeline: PipelineHandle) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };
        let pipeline = resolve_or_return!(self, pipelines, pipeline, "Pipeline");
        let (raw, layout, bind_point) =
            (pipeline.raw, pipeline.layout, pipeline.variant.bind_point());

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.bind_pipeline(raw, layout, bind_point);
    }

    /// Requires a pipeline bound earlier in the same recording.
    pub fn bind_descriptor_set(
        &mut self,
        command_list: CommandListHandle,
        set: DescriptorSetHandle,
        set_index: u32,
    ) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };
        let set = resolve_or_return!(self, descriptor_sets, set, "DescriptorSet");
        let raw = set.raw;

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.bind_descriptor_set(raw, set_index);
    }

    /// Requires a pipeline bound earlier in the same recording.
    pub fn set_constants(
        &mut self,
        command_list: CommandListHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.set_constants(stages.to_vk(), offset, data);
        } else {
            log::error!("CommandList not found");
        }
    }

    pub fn dispatch(
        &mut self,
        command_list: CommandListHandle,
        group_x: u32,
        group_y: u32,
        group_z: u32,
    ) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.dispatch(group_x, group_y, group_z);
        } else {
            log::error!("CommandList not found");
        }
    }

    pub fn bind_vertex_buffer(&mut self, command_list: CommandListHandle, buffer: BufferHandle) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };
        let buffer = resolve_or_return!(self, buffers, buffer, "Buffer");
        let raw = buffer.raw;

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.bind_vertex_buffer(raw);
    }

    pub fn bind_index_buffer(
        &mut self,
        command_list: CommandListHandle,
        buffer: BufferHandle,
        index_type: IndexType,
    ) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };
        let buffer = resolve_or_return!(self, buffers, buffer, "Buffer");
        let raw = buffer.raw;

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.bind_index_buffer(raw, index_type);
    }

    pub fn draw(
        &mut self,
        command_list: CommandListHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.draw(vertex_count, instance_count, first_vertex, first_instance);
        } else {
            log::error!("CommandList not found");
        }
    }

    pub fn draw_indexed(
        &mut self,
        command_list: CommandListHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if let Ok(command_list) = self.command_list_mut(command_list) {
            command_list.draw_indexed(
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        } else {
            log::error!("CommandList not found");
        }
    }

    /// Records a barrier built purely from the declared (old, new) states.
    /// The texture's true prior state is the caller's responsibility.
    pub fn transition_texture(
        &mut self,
        command_list: CommandListHandle,
        texture: TextureHandle,
        old: TextureState,
        new: TextureState,
    ) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };
        let texture = resolve_or_return!(self, textures, texture, "Texture");
        let (image, aspect, mip_levels) = (texture.image, texture.aspect, texture.mip_levels);

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.transition_texture(image, aspect, mip_levels, old, new);
    }

    /// Whole-extent copy into mip 0. The texture must have been transitioned
    /// to the upload state beforehand.
    pub fn copy_buffer_to_texture(
        &mut self,
        command_list: CommandListHandle,
        buffer: BufferHandle,
        texture: TextureHandle,
    ) {
        let Ok(slot) = self.check_owner(command_list, "CommandList") else {
            log::error!("CommandList handle belongs to a different device");
            return;
        };
        let buffer = resolve_or_return!(self, buffers, buffer, "Buffer");
        let raw_buffer = buffer.raw;
        let texture = resolve_or_return!(self, textures, texture, "Texture");
        let (image, aspect, extent) = (texture.image, texture.aspect, texture.extent);

        let Some(command_list) = self.command_lists.get_mut(slot) else {
            log::error!("CommandList not found");
            return;
        };
        command_list.copy_buffer_to_texture(raw_buffer, image, aspect, extent);
    }
}
