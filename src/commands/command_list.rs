use std::sync::Arc;

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use smallvec::SmallVec;

use crate::commands::barrier::{TextureState, barrier_desc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    fn to_vk(self) -> vk::IndexType {
        match self {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Idle,
    Recording,
    /// Ended and submittable; `begin` is rejected until `reset`.
    Finished,
}

#[derive(Clone, Copy)]
struct BoundPipeline {
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
}

/// Linear recording buffer over one `vk::CommandBuffer`.
///
/// Recording operations outside the Recording state are silently ignored;
/// `begin`/`end` misuse is reported. The list does not track resource
/// states: transitions record exactly what the caller declares.
pub struct CommandList {
    pub(crate) command_buffer: vk::CommandBuffer,
    pub(crate) queue: vk::Queue,
    command_pool: vk::CommandPool,

    state: RecordState,
    bound_pipeline: Option<BoundPipeline>,
    in_render_pass: bool,

    device: Arc<ash::Device>,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
}

impl CommandList {
    pub(crate) fn new(
        command_pool: vk::CommandPool,
        queue: vk::Queue,
        device: Arc<ash::Device>,
        dynamic_rendering: ash::khr::dynamic_rendering::Device,
    ) -> Result<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info)?[0] };

        Ok(Self {
            command_buffer,
            queue,
            command_pool,
            state: RecordState::Idle,
            bound_pipeline: None,
            in_render_pass: false,
            device,
            dynamic_rendering,
        })
    }

    pub(crate) fn is_submittable(&self) -> bool {
        self.state == RecordState::Finished
    }

    /// Returns to Idle from any state. Idempotent.
    pub(crate) fn reset(&mut self) -> Result<()> {
        if self.in_render_pass {
            log::error!("CommandList reset with an open render pass");
        }
        unsafe {
            self.device.reset_command_buffer(
                self.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }
        self.state = RecordState::Idle;
        self.bound_pipeline = None;
        self.in_render_pass = false;
        Ok(())
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        if self.state != RecordState::Idle {
            log::error!("CommandList begin() rejected: list is not idle (reset it first)");
            return Err(eyre!("CommandList has already begun recording"));
        }

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)?;
        }
        self.state = RecordState::Recording;
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        if self.state != RecordState::Recording {
            log::error!("CommandList end() rejected: list has not begun recording");
            return Err(eyre!("Cannot end a CommandList that has not begun"));
        }
        if self.in_render_pass {
            log::error!("CommandList end() with an open render pass");
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)?;
        }
        self.state = RecordState::Finished;
        Ok(())
    }

    fn recording(&self) -> bool {
        self.state == RecordState::Recording
    }

    pub(crate) fn begin_rendering(
        &mut self,
        extent: vk::Extent2D,
        color_attachments: &[(vk::ImageView, [f32; 4])],
        depth_attachment: Option<vk::ImageView>,
    ) {
        if !self.recording() {
            return;
        }

        let color_infos: SmallVec<[vk::RenderingAttachmentInfo; 4]> = color_attachments
            .iter()
            .map(|(view, clear_color)| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(*view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: *clear_color,
                        },
                    })
            })
            .collect();

        let depth_info = depth_attachment.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                })
        });

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_infos);
        if let Some(depth_info) = &depth_info {
            rendering_info = rendering_info.depth_attachment(depth_info);
        }

        unsafe {
            self.dynamic_rendering
                .cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
        self.in_render_pass = true;
    }

    pub(crate) fn end_rendering(&mut self) {
        if !self.recording() {
            return;
        }
        if !self.in_render_pass {
            log::error!("end_render_pass() without a matching begin_render_pass()");
            return;
        }
        unsafe {
            self.dynamic_rendering.cmd_end_rendering(self.command_buffer);
        }
        self.in_render_pass = false;
    }

    pub(crate) fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) {
        if !self.recording() {
            return;
        }
        let viewport = vk::Viewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        };
        unsafe {
            self.device
                .cmd_set_viewport(self.command_buffer, 0, &[viewport]);
        }
    }

    pub(crate) fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        if !self.recording() {
            return;
        }
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x, y },
            extent: vk::Extent2D { width, height },
        };
        unsafe {
            self.device
                .cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    pub(crate) fn bind_pipeline(
        &mut self,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
    ) {
        if !self.recording() {
            return;
        }
        unsafe {
            self.device
                .cmd_bind_pipeline(self.command_buffer, bind_point, pipeline);
        }
        self.bound_pipeline = Some(BoundPipeline { layout, bind_point });
    }

    pub(crate) fn bind_descriptor_set(&mut self, set: vk::DescriptorSet, set_index: u32) {
        if !self.recording() {
            return;
        }
        let Some(bound) = self.bound_pipeline else {
            log::error!("bind_descriptor_set() requires a bound pipeline");
            return;
        };
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                bound.bind_point,
                bound.layout,
                set_index,
                &[set],
                &[],
            );
        }
    }

    pub(crate) fn set_constants(
        &mut self,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        if !self.recording() {
            return;
        }
        let Some(bound) = self.bound_pipeline else {
            log::error!("set_constants() requires a bound pipeline");
            return;
        };
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                bound.layout,
                stages,
                offset,
                data,
            );
        }
    }

    pub(crate) fn dispatch(&mut self, group_x: u32, group_y: u32, group_z: u32) {
        if !self.recording() {
            return;
        }
        unsafe {
            self.device
                .cmd_dispatch(self.command_buffer, group_x, group_y, group_z);
        }
    }

    pub(crate) fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        if !self.recording() {
            return;
        }
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[0]);
        }
    }

    pub(crate) fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: IndexType) {
        if !self.recording() {
            return;
        }
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer, 0, index_type.to_vk());
        }
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if !self.recording() {
            return;
        }
        unsafe {
            self.device.cmd_draw(
                self.command_buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    pub(crate) fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        if !self.recording() {
            return;
        }
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    pub(crate) fn transition_texture(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
        old: TextureState,
        new: TextureState,
    ) {
        if !self.recording() {
            return;
        }
        let desc = barrier_desc(old, new);
        let barrier = desc.image_barrier(image, aspect, mip_levels);
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                desc.src.stage_mask,
                desc.dst.stage_mask,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    pub(crate) fn copy_buffer_to_texture(
        &mut self,
        buffer: vk::Buffer,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        extent: vk::Extent3D,
    ) {
        if !self.recording() {
            return;
        }
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(extent);
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if self.state == RecordState::Recording {
            log::warn!("Dropping a CommandList that is still recording");
        }
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
        }
    }
}
