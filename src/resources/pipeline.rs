use std::sync::Arc;

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;

use crate::device::descriptor::{DescriptorSetInfo, ShaderStageFlags};
use crate::resources::format::Format;

const SHADER_ENTRY_POINT: &std::ffi::CStr = c"main";

/// Small constant block set per-draw without a descriptor set.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConstantBlock {
    pub size: u32,
    pub stages: ShaderStageFlags,
}

/// One per-vertex attribute; declaration order defines both the shader
/// location and the byte offset inside the interleaved vertex.
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub name: String,
    pub format: Format,
}

#[derive(Default)]
pub struct ComputePipelineInfo {
    pub shader_code: Vec<u8>,
    pub descriptor_sets: Vec<DescriptorSetInfo>,
    pub constant_block: Option<PipelineConstantBlock>,
}

#[derive(Default)]
pub struct GraphicsPipelineInfo {
    pub vertex_code: Vec<u8>,
    pub fragment_code: Vec<u8>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub descriptor_sets: Vec<DescriptorSetInfo>,
    pub constant_block: Option<PipelineConstantBlock>,
    pub depth_test: bool,
    /// Attachment formats the pipeline renders to; no render-pass object.
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVariant {
    Compute,
    Graphics,
}

impl PipelineVariant {
    pub(crate) fn bind_point(self) -> vk::PipelineBindPoint {
        match self {
            PipelineVariant::Compute => vk::PipelineBindPoint::COMPUTE,
            PipelineVariant::Graphics => vk::PipelineBindPoint::GRAPHICS,
        }
    }
}

/// A compiled pipeline. Immutable once constructed.
pub struct Pipeline {
    pub(crate) raw: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    // Owned by the device's layout cache, referenced here for
    // set allocation from a pipeline.
    pub(crate) set_layouts: Vec<vk::DescriptorSetLayout>,
    pub(crate) variant: PipelineVariant,
    device: Arc<ash::Device>,
}

impl Pipeline {
    pub(crate) fn new_compute(
        info: &ComputePipelineInfo,
        set_layouts: Vec<vk::DescriptorSetLayout>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let shader_module = create_shader_module(&device, &info.shader_code)?;

        let layout = create_pipeline_layout(&device, &set_layouts, info.constant_block.as_ref())?;

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(SHADER_ENTRY_POINT);

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);

        let result = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        unsafe {
            device.destroy_shader_module(shader_module, None);
        }

        let raw = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe {
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(eyre!("Failed to create compute pipeline: {err}"));
            }
        };

        Ok(Self {
            raw,
            layout,
            set_layouts,
            variant: PipelineVariant::Compute,
            device,
        })
    }

    pub(crate) fn new_graphics(
        info: &GraphicsPipelineInfo,
        set_layouts: Vec<vk::DescriptorSetLayout>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let vert_module = create_shader_module(&device, &info.vertex_code)?;
        let frag_module = match create_shader_module(&device, &info.fragment_code) {
            Ok(module) => module,
            Err(err) => {
                unsafe {
                    device.destroy_shader_module(vert_module, None);
                }
                return Err(err);
            }
        };

        let layout = create_pipeline_layout(&device, &set_layouts, info.constant_block.as_ref())?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(SHADER_ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(SHADER_ENTRY_POINT),
        ];

        let (attributes, stride) = derive_vertex_layout(&info.vertex_attributes);
        let bindings = if stride > 0 {
            vec![
                vk::VertexInputBindingDescription::default()
                    .binding(0)
                    .stride(stride)
                    .input_rate(vk::VertexInputRate::VERTEX),
            ]
        } else {
            Vec::new()
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_attribute_descriptions(&attributes)
            .vertex_binding_descriptions(&bindings);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts are fixed here.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test)
            .depth_write_enable(info.depth_test)
            .depth_compare_op(if info.depth_test {
                vk::CompareOp::LESS_OR_EQUAL
            } else {
                vk::CompareOp::ALWAYS
            })
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_blend_attachments = info
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .blend_enable(false)
            })
            .collect::<Vec<_>>();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&color_blend_attachments);

        let color_attachment_formats = info
            .color_formats
            .iter()
            .map(|format| format.to_vk())
            .collect::<Vec<_>>();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats)
            .depth_attachment_format(
                info.depth_format.map_or(vk::Format::UNDEFINED, Format::to_vk),
            );

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        unsafe {
            device.destroy_shader_module(vert_module, None);
            device.destroy_shader_module(frag_module, None);
        }

        let raw = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe {
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(eyre!("Failed to create graphics pipeline: {err}"));
            }
        };

        Ok(Self {
            raw,
            layout,
            set_layouts,
            variant: PipelineVariant::Graphics,
            device,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.raw, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    constant_block: Option<&PipelineConstantBlock>,
) -> Result<vk::PipelineLayout> {
    let push_constant_ranges = constant_block
        .filter(|block| block.size > 0)
        .map(|block| {
            [vk::PushConstantRange::default()
                .stage_flags(block.stages.to_vk())
                .offset(0)
                .size(block.size)]
        });

    let mut layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
    if let Some(ranges) = &push_constant_ranges {
        layout_info = layout_info.push_constant_ranges(ranges);
    }

    Ok(unsafe { device.create_pipeline_layout(&layout_info, None)? })
}

fn create_shader_module(device: &ash::Device, code: &[u8]) -> Result<vk::ShaderModule> {
    if code.is_empty() || code.len() % 4 != 0 {
        return Err(eyre!(
            "Shader bytecode length {} is not a non-zero multiple of 4",
            code.len()
        ));
    }

    // The blob usually arrives 4-byte aligned; fall back to a copy if not.
    let words;
    let code = match bytemuck::try_cast_slice::<u8, u32>(code) {
        Ok(words) => words,
        Err(_) => {
            words = code
                .chunks_exact(4)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect::<Vec<u32>>();
            &words
        }
    };

    let module_info = vk::ShaderModuleCreateInfo::default().code(code);
    Ok(unsafe { device.create_shader_module(&module_info, None)? })
}

/// Concatenates the declared attribute formats into one interleaved binding:
/// attribute N gets location N and the byte offset of everything before it.
pub(crate) fn derive_vertex_layout(
    attributes: &[VertexAttribute],
) -> (Vec<vk::VertexInputAttributeDescription>, u32) {
    let mut descriptions = Vec::with_capacity(attributes.len());
    let mut offset = 0;
    for (location, attribute) in attributes.iter().enumerate() {
        descriptions.push(
            vk::VertexInputAttributeDescription::default()
                .location(location as u32)
                .binding(0)
                .format(attribute.format.to_vk())
                .offset(offset),
        );
        offset += attribute.format.byte_width();
    }
    (descriptions, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, format: Format) -> VertexAttribute {
        VertexAttribute {
            name: name.to_owned(),
            format,
        }
    }

    #[test]
    fn vertex_layout_offsets_are_prefix_sums() {
        let attributes = [
            attr("position", Format::Rgb32),
            attr("normal", Format::Rgb32),
            attr("texcoord", Format::Rg32),
            attr("color", Format::Rgba8),
        ];
        let (descriptions, stride) = derive_vertex_layout(&attributes);

        assert_eq!(descriptions.len(), 4);
        assert_eq!(stride, 12 + 12 + 8 + 4);

        assert_eq!(descriptions[0].location, 0);
        assert_eq!(descriptions[0].offset, 0);
        assert_eq!(descriptions[1].offset, 12);
        assert_eq!(descriptions[2].offset, 24);
        assert_eq!(descriptions[3].offset, 32);
        assert!(descriptions.iter().all(|d| d.binding == 0));
    }

    #[test]
    fn empty_attribute_list_has_zero_stride() {
        let (descriptions, stride) = derive_vertex_layout(&[]);
        assert!(descriptions.is_empty());
        assert_eq!(stride, 0);
    }

    #[test]
    fn bind_point_follows_variant() {
        assert_eq!(
            PipelineVariant::Compute.bind_point(),
            vk::PipelineBindPoint::COMPUTE
        );
        assert_eq!(
            PipelineVariant::Graphics.bind_point(),
            vk::PipelineBindPoint::GRAPHICS
        );
    }
}
