//! Handle-based abstraction layer over Vulkan.
//!
//! A host owns one [`Context`], creates one or more [`Device`]s from it,
//! and drives everything else through typed handles: buffers, textures,
//! samplers, pipelines, descriptor sets, command lists, swap chains, and
//! the synchronization primitives returned by submission. A [`RenderGraph`]
//! sits above the command list for declarative per-frame pass scheduling.
//!
//! Shader input is pre-compiled bytecode; windowing is interfaced through
//! `raw-window-handle`. Both are produced elsewhere.

pub mod commands;
pub mod context;
pub mod device;
pub mod graph;
mod handle;
pub mod resources;
pub mod swapchain;

pub use commands::RenderPassInfo;
pub use commands::barrier::{BarrierDesc, StateInfo, TextureState, barrier_desc, state_info};
pub use commands::command_list::{CommandList, IndexType};
pub use commands::sync::{Fence, Semaphore};
pub use context::{Context, ContextInfo};
pub use device::descriptor::{
    DescriptorBindingInfo, DescriptorKind, DescriptorSet, DescriptorSetInfo, ShaderStageFlags,
};
pub use device::queue::QueueFlags;
pub use device::{Device, DeviceFlags, DeviceInfo, SubmitInfo};
pub use graph::{RenderGraph, RenderGraphPass};
pub use handle::{DeviceHandle, Handle};
pub use resources::buffer::{Buffer, BufferInfo, BufferKind};
pub use resources::format::Format;
pub use resources::pipeline::{
    ComputePipelineInfo, GraphicsPipelineInfo, Pipeline, PipelineConstantBlock, PipelineVariant,
    VertexAttribute,
};
pub use resources::sampler::{Sampler, SamplerAddressMode, SamplerFilterMode, SamplerInfo};
pub use resources::texture::{Texture, TextureInfo, TextureKind, TextureUsage};
pub use swapchain::{SwapChain, SwapChainInfo};

pub type CommandListHandle = Handle<CommandList>;
pub type PipelineHandle = Handle<Pipeline>;
pub type DescriptorSetHandle = Handle<DescriptorSet>;
pub type BufferHandle = Handle<Buffer>;
pub type TextureHandle = Handle<Texture>;
pub type SamplerHandle = Handle<Sampler>;
pub type SwapChainHandle = Handle<SwapChain>;
pub type FenceHandle = Handle<Fence>;
pub type SemaphoreHandle = Handle<Semaphore>;
