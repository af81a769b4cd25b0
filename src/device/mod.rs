pub mod descriptor;
pub mod queue;
mod recording;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ash::vk;
use bitflags::bitflags;
use bytemuck::Pod;
use color_eyre::Result;
use color_eyre::eyre::{OptionExt, eyre};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use crate::commands::command_list::CommandList;
use crate::commands::sync::{Fence, Semaphore};
use crate::device::descriptor::{
    DescriptorLayoutCache, DescriptorSet, DescriptorSetInfo, create_shared_pool,
};
use crate::device::queue::{Queue, QueueFlags, find_queue_family};
use crate::handle::{DeviceHandle, Handle, HandleTable, Slot};
use crate::resources::buffer::{Buffer, BufferInfo};
use crate::resources::pipeline::{ComputePipelineInfo, GraphicsPipelineInfo, Pipeline};
use crate::resources::sampler::{Sampler, SamplerInfo};
use crate::resources::texture::{Texture, TextureInfo};
use crate::swapchain::{SwapChain, SwapChainInfo};
use crate::{
    BufferHandle, CommandListHandle, DescriptorSetHandle, FenceHandle, PipelineHandle,
    SamplerHandle, SemaphoreHandle, SwapChainHandle, TextureHandle,
};

bitflags! {
    /// Adapter-type preferences used when scoring physical devices.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// Prefer a separate processor connected to the host.
        const PREFER_DISCRETE = 1 << 0;
        /// Prefer a processor embedded in or tightly coupled with the host.
        const PREFER_INTEGRATED = 1 << 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub flags: DeviceFlags,
    /// Wanted queue capabilities; the position in this list is the queue
    /// index used by queue-related operations.
    pub queues: Vec<QueueFlags>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmitInfo {
    pub command_list: CommandListHandle,
    pub wait_semaphore: Option<SemaphoreHandle>,
}

const DEVICE_TYPE_PREFERENCE_BONUS: u32 = 1000;

/// A logical GPU device and every resource created from it.
///
/// All tables are generational: handles to destroyed resources miss instead
/// of aliasing. The device is single-threaded by design; it has no internal
/// locking.
pub struct Device {
    handle: DeviceHandle,

    pub(crate) physical: vk::PhysicalDevice,
    pub(crate) logical: Arc<ash::Device>,
    entry: ash::Entry,
    instance: ash::Instance,

    requested_queues: Vec<QueueFlags>,
    queue_map: HashMap<u32, Queue>,
    command_pools: HashMap<u32, vk::CommandPool>,

    descriptor_pool: vk::DescriptorPool,
    layout_cache: DescriptorLayoutCache,
    memory_allocator: Option<Arc<Mutex<Allocator>>>,
    dynamic_rendering: ash::khr::dynamic_rendering::Device,

    command_lists: HandleTable<CommandList>,
    pipelines: HandleTable<Pipeline>,
    descriptor_sets: HandleTable<DescriptorSet>,
    buffers: HandleTable<Buffer>,
    pub(crate) textures: HandleTable<Texture>,
    samplers: HandleTable<Sampler>,
    swap_chains: HandleTable<SwapChain>,
    fences: HandleTable<Fence>,
    semaphores: HandleTable<Semaphore>,
}

impl Device {
    pub(crate) fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        info: &DeviceInfo,
    ) -> Result<Self> {
        let physical = Self::select_physical_device(instance, info.flags)?;

        let (logical, queue_map) = Self::create_logical_device(instance, physical, &info.queues)?;
        let logical = Arc::new(logical);

        let mut command_pools = HashMap::new();
        for queue in queue_map.values() {
            let family = queue.family.index;
            if command_pools.contains_key(&family) {
                continue;
            }
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(family)
                // Allow the pool to reset individual command buffers
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let pool = unsafe { logical.create_command_pool(&pool_info, None)? };
            command_pools.insert(family, pool);
        }

        let descriptor_pool = create_shared_pool(&logical)?;
        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(instance, &logical);

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*logical).clone(),
            physical_device: physical,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            handle: DeviceHandle {
                slot: Slot {
                    index: 0,
                    generation: 0,
                },
            },
            physical,
            logical,
            entry: entry.clone(),
            instance: instance.clone(),
            requested_queues: info.queues.clone(),
            queue_map,
            command_pools,
            descriptor_pool,
            layout_cache: DescriptorLayoutCache::new(),
            memory_allocator: Some(Arc::new(Mutex::new(memory_allocator))),
            dynamic_rendering,
            command_lists: HandleTable::new(),
            pipelines: HandleTable::new(),
            descriptor_sets: HandleTable::new(),
            buffers: HandleTable::new(),
            textures: HandleTable::new(),
            samplers: HandleTable::new(),
            swap_chains: HandleTable::new(),
            fences: HandleTable::new(),
            semaphores: HandleTable::new(),
        })
    }

    pub(crate) fn set_handle(&mut self, handle: DeviceHandle) {
        self.handle = handle;
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// Picks the adapter with the highest weighted score: a fixed bonus for
    /// matching the preferred device type plus raw capability limits.
    fn select_physical_device(
        instance: &ash::Instance,
        flags: DeviceFlags,
    ) -> Result<vk::PhysicalDevice> {
        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        if physical_devices.is_empty() {
            return Err(eyre!("There are no physical devices"));
        }

        physical_devices
            .into_iter()
            .map(|device| {
                let props = unsafe { instance.get_physical_device_properties(device) };

                let mut score = 0u32;
                if flags.contains(DeviceFlags::PREFER_DISCRETE)
                    && props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
                {
                    score += DEVICE_TYPE_PREFERENCE_BONUS;
                }
                if flags.contains(DeviceFlags::PREFER_INTEGRATED)
                    && props.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU
                {
                    score += DEVICE_TYPE_PREFERENCE_BONUS;
                }

                score += props.limits.max_image_dimension2_d;
                score += props.limits.max_descriptor_set_sampled_images;
                score += props.limits.max_descriptor_set_uniform_buffers;
                score += props.limits.max_bound_descriptor_sets;

                (device, score)
            })
            .max_by_key(|(_, score)| *score)
            .map(|(device, _)| device)
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        requested: &[QueueFlags],
    ) -> Result<(ash::Device, HashMap<u32, Queue>)> {
        if requested.is_empty() {
            return Err(eyre!("DeviceInfo must request at least one queue"));
        }

        let family_props = unsafe { instance.get_physical_device_queue_family_properties(physical) };

        // Map every requested capability mask to the first superset family.
        let mut flags_family = HashMap::new();
        let mut families_by_index = HashMap::new();
        let mut family_request_counts: HashMap<u32, u32> = HashMap::new();
        for wanted in requested {
            let family = find_queue_family(&family_props, *wanted)
                .ok_or_eyre("No queue family supports the requested capabilities")?;
            *family_request_counts.entry(family.index).or_default() += 1;
            families_by_index.insert(family.index, family.clone());
            flags_family.insert(wanted.bits(), family);
        }

        let queue_priorities = [1.0f32; 8];
        let mut queue_create_infos = Vec::new();
        let mut family_created_counts: HashMap<u32, u32> = HashMap::new();
        for (family_index, requests) in &family_request_counts {
            let available = families_by_index[family_index].properties.queue_count;
            let count = (*requests).min(available).min(queue_priorities.len() as u32);
            family_created_counts.insert(*family_index, count);
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family_index)
                    .queue_priorities(&queue_priorities[..count as usize]),
            );
        }

        let enabled_extension_names = Self::required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let mut dynamic_rendering_features =
            vk::PhysicalDeviceDynamicRenderingFeaturesKHR::default().dynamic_rendering(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut dynamic_rendering_features);

        let logical = unsafe { instance.create_device(physical, &device_create_info, None)? };

        // Hand out one queue per request, wrapping around when a family
        // created fewer queues than were asked of it.
        let mut queue_map = HashMap::new();
        let mut family_next_index: HashMap<u32, u32> = HashMap::new();
        for wanted in requested {
            let family = &flags_family[&wanted.bits()];
            let created = family_created_counts[&family.index];
            let next = family_next_index.entry(family.index).or_default();
            let queue_index = *next % created;
            *next += 1;

            let handle = unsafe { logical.get_device_queue(family.index, queue_index) };
            queue_map.insert(
                wanted.bits(),
                Queue {
                    family: family.clone(),
                    handle,
                },
            );
        }

        Ok((logical, queue_map))
    }

    fn required_device_extensions() -> Vec<&'static std::ffi::CStr> {
        vec![
            ash::khr::swapchain::NAME,
            ash::khr::dynamic_rendering::NAME,
            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }

    fn queue_for_index(&self, queue_index: usize) -> Result<&Queue> {
        let flags = self
            .requested_queues
            .get(queue_index)
            .ok_or_eyre("Queue index was not requested at device creation")?;
        self.queue_map
            .get(&flags.bits())
            .ok_or_eyre("No queue mapped for the requested capabilities")
    }

    fn allocator(&self) -> Result<Arc<Mutex<Allocator>>> {
        self.memory_allocator
            .clone()
            .ok_or_eyre("Device memory allocator is gone")
    }

    fn check_owner<T>(&self, handle: Handle<T>, what: &str) -> Result<Slot> {
        if handle.device != self.handle {
            return Err(eyre!("{what} handle belongs to a different device"));
        }
        Ok(handle.slot)
    }

    /* Command lists */

    pub fn create_command_list(&mut self, queue_index: usize) -> Result<CommandListHandle> {
        let queue = self.queue_for_index(queue_index)?;
        let pool = *self
            .command_pools
            .get(&queue.family.index)
            .ok_or_eyre("No command pool for the queue's family")?;
        let queue_handle = queue.handle;

        let command_list = CommandList::new(
            pool,
            queue_handle,
            self.logical.clone(),
            self.dynamic_rendering.clone(),
        )?;
        let slot = self.command_lists.insert(command_list);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn destroy_command_list(&mut self, handle: CommandListHandle) -> Result<()> {
        let slot = self.check_owner(handle, "CommandList")?;
        self.command_lists
            .remove(slot)
            .map(drop)
            .ok_or_eyre("CommandList not found")
    }

    /// Submits a finished command list to its queue. A fence and/or signal
    /// semaphore are created on demand when requested.
    pub fn submit_command_list(
        &mut self,
        submit: &SubmitInfo,
        want_fence: bool,
        want_semaphore: bool,
    ) -> Result<(Option<FenceHandle>, Option<SemaphoreHandle>)> {
        let slot = self.check_owner(submit.command_list, "CommandList")?;

        let wait_semaphore = match submit.wait_semaphore {
            Some(handle) => {
                let slot = self.check_owner(handle, "Semaphore")?;
                let semaphore = self
                    .semaphores
                    .get(slot)
                    .ok_or_eyre("Wait semaphore not found")?;
                Some(semaphore.raw)
            }
            None => None,
        };

        let command_list = self
            .command_lists
            .get(slot)
            .ok_or_eyre("CommandList not found")?;
        if !command_list.is_submittable() {
            log::error!("Submitting a CommandList that has not been ended");
            return Err(eyre!("CommandList is not in a submittable state"));
        }
        let command_buffer = command_list.command_buffer;
        let queue = command_list.queue;

        let fence = if want_fence {
            Some(Fence::new(self.logical.clone())?)
        } else {
            None
        };
        let signal_semaphore = if want_semaphore {
            Some(Semaphore::new(self.logical.clone())?)
        } else {
            None
        };

        let command_buffers = [command_buffer];
        let wait_semaphores = wait_semaphore.map(|raw| [raw]);
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = signal_semaphore.as_ref().map(|semaphore| [semaphore.raw]);

        let mut submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        if let Some(wait_semaphores) = &wait_semaphores {
            submit_info = submit_info
                .wait_semaphores(wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }
        if let Some(signal_semaphores) = &signal_semaphores {
            submit_info = submit_info.signal_semaphores(signal_semaphores);
        }

        unsafe {
            self.logical.queue_submit(
                queue,
                &[submit_info],
                fence.as_ref().map_or(vk::Fence::null(), |fence| fence.raw),
            )?;
        }

        let fence_handle =
            fence.map(|fence| Handle::new(self.handle, self.fences.insert(fence)));
        let semaphore_handle = signal_semaphore
            .map(|semaphore| Handle::new(self.handle, self.semaphores.insert(semaphore)));

        Ok((fence_handle, semaphore_handle))
    }

    /// Blocks until the fence signals, then destroys it. Fences are
    /// single-use; the handle is invalid afterwards.
    pub fn wait_on_fence(&mut self, handle: FenceHandle) -> Result<()> {
        let slot = self.check_owner(handle, "Fence")?;
        let fence = self.fences.get(slot).ok_or_eyre("Fence not found")?;
        let result = fence.wait();
        self.fences.remove(slot);
        result
    }

    /* Pipelines */

    pub fn create_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> Result<PipelineHandle> {
        let set_layouts = self.resolve_set_layouts(&info.descriptor_sets)?;
        let pipeline = Pipeline::new_compute(info, set_layouts, self.logical.clone())?;
        let slot = self.pipelines.insert(pipeline);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn create_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> Result<PipelineHandle> {
        let set_layouts = self.resolve_set_layouts(&info.descriptor_sets)?;
        let pipeline = Pipeline::new_graphics(info, set_layouts, self.logical.clone())?;
        let slot = self.pipelines.insert(pipeline);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn destroy_pipeline(&mut self, handle: PipelineHandle) -> Result<()> {
        let slot = self.check_owner(handle, "Pipeline")?;
        self.pipelines
            .remove(slot)
            .map(drop)
            .ok_or_eyre("Pipeline not found")
    }

    fn resolve_set_layouts(
        &mut self,
        infos: &[DescriptorSetInfo],
    ) -> Result<Vec<vk::DescriptorSetLayout>> {
        infos
            .iter()
            .map(|info| self.layout_cache.get_or_create(&self.logical, info))
            .collect()
    }

    /* Descriptor sets */

    pub fn create_descriptor_set(&mut self, info: &DescriptorSetInfo) -> Result<DescriptorSetHandle> {
        let layout = self.layout_cache.get_or_create(&self.logical, info)?;
        let set = DescriptorSet::allocate(&self.logical, self.descriptor_pool, layout)?;
        let slot = self.descriptor_sets.insert(set);
        Ok(Handle::new(self.handle, slot))
    }

    /// Allocates a set using the pipeline's `set_index`th layout.
    pub fn create_descriptor_set_from_pipeline(
        &mut self,
        pipeline: PipelineHandle,
        set_index: usize,
    ) -> Result<DescriptorSetHandle> {
        let slot = self.check_owner(pipeline, "Pipeline")?;
        let pipeline = self.pipelines.get(slot).ok_or_eyre("Pipeline not found")?;
        let layout = *pipeline
            .set_layouts
            .get(set_index)
            .ok_or_eyre("Pipeline has no descriptor set at that index")?;

        let set = DescriptorSet::allocate(&self.logical, self.descriptor_pool, layout)?;
        let slot = self.descriptor_sets.insert(set);
        Ok(Handle::new(self.handle, slot))
    }

    /// Immediately writes a buffer binding into the set.
    pub fn bind_buffer_to_descriptor_set(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        buffer: BufferHandle,
    ) -> Result<()> {
        let set_slot = self.check_owner(set, "DescriptorSet")?;
        let buffer_slot = self.check_owner(buffer, "Buffer")?;

        let set = self
            .descriptor_sets
            .get(set_slot)
            .ok_or_eyre("DescriptorSet not found")?;
        let buffer = self.buffers.get(buffer_slot).ok_or_eyre("Buffer not found")?;
        let descriptor_type = buffer
            .kind
            .descriptor_type()
            .ok_or_eyre("Buffer kind cannot be bound to a descriptor set")?;

        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer.raw)
            .offset(0)
            .range(buffer.size)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.raw)
            .dst_binding(binding)
            .descriptor_type(descriptor_type)
            .buffer_info(&buffer_info);

        unsafe {
            self.logical.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    /// Immediately writes a texture+sampler pair into the set.
    pub fn bind_texture_to_descriptor_set(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> Result<()> {
        let set_slot = self.check_owner(set, "DescriptorSet")?;
        let texture_slot = self.check_owner(texture, "Texture")?;
        let sampler_slot = self.check_owner(sampler, "Sampler")?;

        let set = self
            .descriptor_sets
            .get(set_slot)
            .ok_or_eyre("DescriptorSet not found")?;
        let texture = self
            .textures
            .get(texture_slot)
            .ok_or_eyre("Texture not found")?;
        let sampler = self
            .samplers
            .get(sampler_slot)
            .ok_or_eyre("Sampler not found")?;

        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(texture.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .sampler(sampler.raw)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.raw)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);

        unsafe {
            self.logical.update_descriptor_sets(&[write], &[]);
        }
        Ok(())
    }

    /* Buffers */

    pub fn create_buffer(&mut self, info: &BufferInfo) -> Result<BufferHandle> {
        let buffer = Buffer::new(info, self.allocator()?, self.logical.clone())?;
        let slot = self.buffers.insert(buffer);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn destroy_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let slot = self.check_owner(handle, "Buffer")?;
        self.buffers
            .remove(slot)
            .map(drop)
            .ok_or_eyre("Buffer not found")
    }

    /// Host-visible view of the buffer's memory, valid until the buffer is
    /// destroyed.
    pub fn map_buffer(&mut self, handle: BufferHandle) -> Result<&mut [u8]> {
        let slot = self.check_owner(handle, "Buffer")?;
        self.buffers
            .get_mut(slot)
            .ok_or_eyre("Buffer not found")?
            .map()
    }

    pub fn unmap_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        let slot = self.check_owner(handle, "Buffer")?;
        self.buffers
            .get_mut(slot)
            .ok_or_eyre("Buffer not found")?
            .unmap();
        Ok(())
    }

    pub fn write_buffer<T: Pod>(
        &mut self,
        handle: BufferHandle,
        data: &[T],
        start_offset: usize,
    ) -> Result<()> {
        let slot = self.check_owner(handle, "Buffer")?;
        self.buffers
            .get_mut(slot)
            .ok_or_eyre("Buffer not found")?
            .write(data, start_offset)
            .map(drop)
    }

    /* Textures and samplers */

    pub fn create_texture(&mut self, info: &TextureInfo) -> Result<TextureHandle> {
        let texture = Texture::new(info, self.allocator()?, self.logical.clone())?;
        let slot = self.textures.insert(texture);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) -> Result<()> {
        let slot = self.check_owner(handle, "Texture")?;
        self.textures
            .remove(slot)
            .map(drop)
            .ok_or_eyre("Texture not found")
    }

    pub fn create_sampler(&mut self, info: &SamplerInfo) -> Result<SamplerHandle> {
        let sampler = Sampler::new(info, self.logical.clone())?;
        let slot = self.samplers.insert(sampler);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn destroy_sampler(&mut self, handle: SamplerHandle) -> Result<()> {
        let slot = self.check_owner(handle, "Sampler")?;
        self.samplers
            .remove(slot)
            .map(drop)
            .ok_or_eyre("Sampler not found")
    }

    /* Swap chains */

    pub fn create_swap_chain(&mut self, info: &SwapChainInfo) -> Result<SwapChainHandle> {
        let (mut swap_chain, wrappers) = SwapChain::new(
            info,
            &self.entry,
            &self.instance,
            self.physical,
            self.logical.clone(),
        )?;

        swap_chain.image_textures = wrappers
            .into_iter()
            .map(|texture| Handle::new(self.handle, self.textures.insert(texture)))
            .collect();
        swap_chain.acquire_next()?;

        let slot = self.swap_chains.insert(swap_chain);
        Ok(Handle::new(self.handle, slot))
    }

    pub fn destroy_swap_chain(&mut self, handle: SwapChainHandle) -> Result<()> {
        let slot = self.check_owner(handle, "SwapChain")?;
        let swap_chain = self
            .swap_chains
            .remove(slot)
            .ok_or_eyre("SwapChain not found")?;
        for texture in &swap_chain.image_textures {
            self.textures.remove(texture.slot);
        }
        Ok(())
    }

    /// Rebuilds the image chain for the new extent, invalidating all
    /// previously returned swapchain texture handles.
    pub fn resize_swap_chain(
        &mut self,
        handle: SwapChainHandle,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let slot = self.check_owner(handle, "SwapChain")?;

        let old_textures = {
            let swap_chain = self
                .swap_chains
                .get_mut(slot)
                .ok_or_eyre("SwapChain not found")?;
            std::mem::take(&mut swap_chain.image_textures)
        };
        for texture in &old_textures {
            self.textures.remove(texture.slot);
        }

        let wrappers = {
            let swap_chain = self
                .swap_chains
                .get_mut(slot)
                .ok_or_eyre("SwapChain not found")?;
            swap_chain.recreate(width, height)?
        };
        let handles = wrappers
            .into_iter()
            .map(|texture| Handle::new(self.handle, self.textures.insert(texture)))
            .collect();

        let swap_chain = self
            .swap_chains
            .get_mut(slot)
            .ok_or_eyre("SwapChain not found")?;
        swap_chain.image_textures = handles;
        swap_chain.acquire_next()
    }

    /// Presents the current image on the indexed queue, then synchronously
    /// acquires the next one.
    pub fn present_swap_chain(
        &mut self,
        handle: SwapChainHandle,
        queue_index: usize,
        wait_semaphore: Option<SemaphoreHandle>,
    ) -> Result<()> {
        let slot = self.check_owner(handle, "SwapChain")?;
        let queue = self.queue_for_index(queue_index)?.handle;

        let wait = match wait_semaphore {
            Some(handle) => {
                let slot = self.check_owner(handle, "Semaphore")?;
                let semaphore = self
                    .semaphores
                    .get(slot)
                    .ok_or_eyre("Wait semaphore not found")?;
                Some(semaphore.raw)
            }
            None => None,
        };

        self.swap_chains
            .get_mut(slot)
            .ok_or_eyre("SwapChain not found")?
            .present(queue, wait)
    }

    /// Texture wrapping the currently acquired swapchain image.
    pub fn swap_chain_image(&self, handle: SwapChainHandle) -> Result<TextureHandle> {
        let slot = self.check_owner(handle, "SwapChain")?;
        self.swap_chains
            .get(slot)
            .ok_or_eyre("SwapChain not found")?
            .current_texture()
    }

    pub fn swap_chain_extent(&self, handle: SwapChainHandle) -> Result<(u32, u32)> {
        let slot = self.check_owner(handle, "SwapChain")?;
        let swap_chain = self.swap_chains.get(slot).ok_or_eyre("SwapChain not found")?;
        Ok((swap_chain.extent.width, swap_chain.extent.height))
    }

    /// Blocks until every queue on the device is idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.logical.device_wait_idle();
        }

        // Swap chains first: their textures wrap images the swapchain owns.
        self.swap_chains.clear();
        self.command_lists.clear();
        self.pipelines.clear();
        self.descriptor_sets.clear();
        self.buffers.clear();
        self.textures.clear();
        self.samplers.clear();
        self.fences.clear();
        self.semaphores.clear();

        self.layout_cache.destroy(&self.logical);
        unsafe {
            self.logical
                .destroy_descriptor_pool(self.descriptor_pool, None);
            for pool in self.command_pools.values() {
                self.logical.destroy_command_pool(*pool, None);
            }
        }

        // Last owner: frees all remaining GPU memory before the device goes.
        self.memory_allocator.take();

        unsafe {
            self.logical.destroy_device(None);
        }
    }
}
