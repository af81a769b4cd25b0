use std::sync::Arc;

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;

// Matches the wait the teacher transfer path uses; long enough for any
// realistic workload, short enough to surface a hang.
pub(crate) const FENCE_WAIT_TIMEOUT_NS: u64 = 10_000_000_000;

/// Single-use fence: waiting on it destroys it.
pub struct Fence {
    pub(crate) raw: vk::Fence,
    device: Arc<ash::Device>,
}

impl Fence {
    pub(crate) fn new(device: Arc<ash::Device>) -> Result<Self> {
        let fence_info = vk::FenceCreateInfo::default();
        let raw = unsafe { device.create_fence(&fence_info, None)? };
        Ok(Self { raw, device })
    }

    pub(crate) fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.raw], true, FENCE_WAIT_TIMEOUT_NS)
                .map_err(|err| eyre!("Fence wait failed: {err}"))
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.raw, None);
        }
    }
}

pub struct Semaphore {
    pub(crate) raw: vk::Semaphore,
    device: Arc<ash::Device>,
}

impl Semaphore {
    pub(crate) fn new(device: Arc<ash::Device>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let raw = unsafe { device.create_semaphore(&semaphore_info, None)? };
        Ok(Self { raw, device })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.raw, None);
        }
    }
}
