use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Capabilities requested for a device queue.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueFlags: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

impl QueueFlags {
    pub(crate) fn to_vk(self) -> vk::QueueFlags {
        let mut flags = vk::QueueFlags::empty();
        if self.contains(QueueFlags::GRAPHICS) {
            flags |= vk::QueueFlags::GRAPHICS;
        }
        if self.contains(QueueFlags::COMPUTE) {
            flags |= vk::QueueFlags::COMPUTE;
        }
        if self.contains(QueueFlags::TRANSFER) {
            flags |= vk::QueueFlags::TRANSFER;
        }
        flags
    }
}

/// One queue retrieved from the logical device, with its family.
#[derive(Clone)]
pub(crate) struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

#[derive(Clone)]
pub(crate) struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

/// First queue family whose capabilities are a superset of `wanted`.
pub(crate) fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    wanted: QueueFlags,
) -> Option<QueueFamily> {
    families
        .iter()
        .enumerate()
        .find(|(_, props)| props.queue_flags.contains(wanted.to_vk()))
        .map(|(index, props)| QueueFamily {
            index: index as u32,
            properties: *props,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_superset_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                4,
            ),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 2),
        ];

        let graphics = find_queue_family(&families, QueueFlags::GRAPHICS).unwrap();
        assert_eq!(graphics.index, 1);

        let transfer = find_queue_family(&families, QueueFlags::TRANSFER).unwrap();
        assert_eq!(transfer.index, 0);

        let combined =
            find_queue_family(&families, QueueFlags::COMPUTE | QueueFlags::TRANSFER).unwrap();
        assert_eq!(combined.index, 1);
    }

    #[test]
    fn missing_capability_yields_none() {
        let families = [family(vk::QueueFlags::TRANSFER, 1)];
        assert!(find_queue_family(&families, QueueFlags::GRAPHICS).is_none());
    }
}
