use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use ash::vk;
use bitflags::bitflags;
use color_eyre::Result;

bitflags! {
    /// Shader stages a binding or constant block is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const COMPUTE = 1 << 0;
        const VERTEX = 1 << 1;
        const FRAGMENT = 1 << 2;
    }
}

impl ShaderStageFlags {
    pub(crate) fn to_vk(self) -> vk::ShaderStageFlags {
        let mut flags = vk::ShaderStageFlags::empty();
        if self.contains(ShaderStageFlags::COMPUTE) {
            flags |= vk::ShaderStageFlags::COMPUTE;
        }
        if self.contains(ShaderStageFlags::VERTEX) {
            flags |= vk::ShaderStageFlags::VERTEX;
        }
        if self.contains(ShaderStageFlags::FRAGMENT) {
            flags |= vk::ShaderStageFlags::FRAGMENT;
        }
        flags
    }
}

/// Kind of resource a descriptor binding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    StorageBuffer,
    UniformBuffer,
    /// Texture sampled together with a sampler.
    Texture,
}

impl DescriptorKind {
    pub(crate) fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::Texture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorBindingInfo {
    pub kind: DescriptorKind,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Ordered binding list describing one descriptor set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetInfo {
    pub bindings: Vec<DescriptorBindingInfo>,
}

impl DescriptorSetInfo {
    /// Structural hash over (binding count, each binding's kind and count).
    ///
    /// Two infos with identical ordered binding lists hash equal and share
    /// one cached layout. Collisions between structurally different infos
    /// are not resolved.
    pub(crate) fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.bindings.len().hash(&mut hasher);
        for binding in &self.bindings {
            binding.kind.hash(&mut hasher);
            binding.count.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Per-device cache of descriptor-set layouts keyed by structural hash.
pub(crate) struct DescriptorLayoutCache {
    layouts: HashMap<u64, vk::DescriptorSetLayout>,
}

impl DescriptorLayoutCache {
    pub fn new() -> Self {
        Self {
            layouts: HashMap::new(),
        }
    }

    pub fn get_or_create(
        &mut self,
        device: &ash::Device,
        info: &DescriptorSetInfo,
    ) -> Result<vk::DescriptorSetLayout> {
        let key = info.structural_hash();
        if let Some(layout) = self.layouts.get(&key) {
            return Ok(*layout);
        }

        let bindings = info
            .bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(index as u32)
                    .descriptor_type(binding.kind.to_vk())
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages.to_vk())
            })
            .collect::<Vec<_>>();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };

        self.layouts.insert(key, layout);
        Ok(layout)
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for layout in self.layouts.values() {
            unsafe {
                device.destroy_descriptor_set_layout(*layout, None);
            }
        }
        self.layouts.clear();
    }
}

// Fixed sizing for the shared per-device pool.
const POOL_UNIFORM_BUFFERS: u32 = 128;
const POOL_STORAGE_BUFFERS: u32 = 128;
const POOL_SAMPLED_TEXTURES: u32 = 128;
const POOL_MAX_SETS: u32 = 256;

pub(crate) fn create_shared_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: POOL_UNIFORM_BUFFERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: POOL_STORAGE_BUFFERS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: POOL_SAMPLED_TEXTURES,
        },
    ];
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(POOL_MAX_SETS)
        .pool_sizes(&pool_sizes);
    Ok(unsafe { device.create_descriptor_pool(&pool_info, None)? })
}

/// A descriptor set allocated from the device's shared pool.
///
/// Sets live as long as the pool; there is no per-set free.
pub struct DescriptorSet {
    pub(crate) raw: vk::DescriptorSet,
    pub(crate) layout: vk::DescriptorSetLayout,
}

impl DescriptorSet {
    pub(crate) fn allocate(
        device: &ash::Device,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let raw = unsafe { device.allocate_descriptor_sets(&alloc_info)?[0] };
        Ok(Self { raw, layout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(bindings: &[(DescriptorKind, u32)]) -> DescriptorSetInfo {
        DescriptorSetInfo {
            bindings: bindings
                .iter()
                .map(|(kind, count)| DescriptorBindingInfo {
                    kind: *kind,
                    count: *count,
                    stages: ShaderStageFlags::COMPUTE,
                })
                .collect(),
        }
    }

    #[test]
    fn identical_binding_lists_hash_equal() {
        let a = info(&[
            (DescriptorKind::StorageBuffer, 1),
            (DescriptorKind::StorageBuffer, 1),
        ]);
        let b = info(&[
            (DescriptorKind::StorageBuffer, 1),
            (DescriptorKind::StorageBuffer, 1),
        ]);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn stage_mask_does_not_affect_structure() {
        let mut a = info(&[(DescriptorKind::UniformBuffer, 1)]);
        let b = info(&[(DescriptorKind::UniformBuffer, 1)]);
        a.bindings[0].stages = ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn different_structures_hash_differently() {
        let a = info(&[(DescriptorKind::StorageBuffer, 1)]);
        let b = info(&[(DescriptorKind::UniformBuffer, 1)]);
        let c = info(&[(DescriptorKind::StorageBuffer, 2)]);
        let d = info(&[
            (DescriptorKind::StorageBuffer, 1),
            (DescriptorKind::StorageBuffer, 1),
        ]);
        assert_ne!(a.structural_hash(), b.structural_hash());
        assert_ne!(a.structural_hash(), c.structural_hash());
        assert_ne!(a.structural_hash(), d.structural_hash());
    }

    #[test]
    fn shader_stage_conversion_covers_all_bits() {
        let all = ShaderStageFlags::COMPUTE | ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        let vk_flags = all.to_vk();
        assert!(vk_flags.contains(vk::ShaderStageFlags::COMPUTE));
        assert!(vk_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(vk_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
