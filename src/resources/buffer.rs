use std::sync::{Arc, Mutex};

use ash::vk;
use bytemuck::Pod;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::{
    MemoryLocation,
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
};

/// How a buffer will be used; fixes usage flags, memory location, and the
/// descriptor type it binds as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
    Storage,
    /// Staging source for buffer-to-texture copies.
    Upload,
}

impl BufferKind {
    fn usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferKind::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferKind::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferKind::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferKind::Storage => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferKind::Upload => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    // Every kind stays host-visible so map/unmap works across the board.
    fn memory_location(self) -> MemoryLocation {
        MemoryLocation::CpuToGpu
    }

    pub(crate) fn descriptor_type(self) -> Option<vk::DescriptorType> {
        match self {
            BufferKind::Uniform => Some(vk::DescriptorType::UNIFORM_BUFFER),
            BufferKind::Storage => Some(vk::DescriptorType::STORAGE_BUFFER),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferInfo {
    pub kind: BufferKind,
    pub size: u64,
}

pub struct Buffer {
    pub(crate) raw: vk::Buffer,
    pub size: u64,
    pub kind: BufferKind,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub(crate) fn new(
        info: &BufferInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        if info.size == 0 {
            return Err(eyre!("Cannot create a zero-sized buffer"));
        }

        let buffer = {
            let buffer_info = vk::BufferCreateInfo {
                size: info.size,
                usage: info.kind.usage(),
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location: info.kind.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            })?;

        unsafe {
            device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        Ok(Self {
            raw: buffer,
            size: info.size,
            kind: info.kind,

            allocation: Some(allocation),
            memory_allocator,
            device,
        })
    }

    /// Host-visible view of the buffer's memory.
    pub fn map(&mut self) -> Result<&mut [u8]> {
        let size = self.size as usize;
        self.allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .map(|slice| &mut slice[..size])
            .ok_or_else(|| eyre!("Buffer memory is not host-visible"))
    }

    // The allocation is persistently mapped; unmap exists for API symmetry
    // with explicit mapping backends and does nothing here.
    pub fn unmap(&mut self) {}

    pub fn write<T>(&mut self, data: &[T], start_offset: usize) -> Result<presser::CopyRecord>
    where
        T: Pod,
    {
        let allocation = self
            .allocation
            .as_mut()
            .ok_or_else(|| eyre!("Buffer has no allocation"))?;
        Ok(presser::copy_from_slice_to_offset(
            data,
            allocation,
            start_offset,
        )?)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Ok(mut allocator) = self.memory_allocator.lock() {
                let _ = allocator.free(allocation);
            }
        }
        unsafe {
            self.device.destroy_buffer(self.raw, None);
        }
    }
}
