//! Configured devices, in configuration order.

use std::collections::HashSet;

use crate::device::Device;
use crate::driver::{ConnectorId, CrtcId};

/// Devices plus the set of CRTCs they hold.
///
/// `claimed` always holds exactly the CRTCs of the devices in `devices`.
#[derive(Debug)]
pub struct DeviceRegistry<M> {
    devices: Vec<Device<M>>,
    claimed: HashSet<CrtcId>,
}

impl<M> Default for DeviceRegistry<M> {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            claimed: HashSet::new(),
        }
    }
}

impl<M> DeviceRegistry<M>
where
    M: std::ops::DerefMut<Target = [u8]>,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device and claim its CRTC.
    pub fn push(&mut self, device: Device<M>) {
        let fresh = self.claimed.insert(device.crtc());
        debug_assert!(fresh, "CRTC {} claimed twice", device.crtc());
        self.devices.push(device);
    }

    /// CRTCs held by registered devices.
    pub fn claimed(&self) -> &HashSet<CrtcId> {
        &self.claimed
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device<M>> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device<M>> {
        self.devices.iter_mut()
    }

    pub fn get(&self, connector: ConnectorId) -> Option<&Device<M>> {
        self.devices.iter().find(|d| d.connector() == connector)
    }

    pub fn get_mut(&mut self, connector: ConnectorId) -> Option<&mut Device<M>> {
        self.devices.iter_mut().find(|d| d.connector() == connector)
    }

    /// Remove the oldest device and release its CRTC claim.
    pub fn take_next(&mut self) -> Option<Device<M>> {
        if self.devices.is_empty() {
            return None;
        }
        let device = self.devices.remove(0);
        self.claimed.remove(&device.crtc());
        Some(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::CrtcAssignment;
    use crate::buffer::allocate_buffer;
    use crate::driver::{DisplayMode, EncoderId};
    use crate::testing::{MockDriver, MockMapping};

    fn device(driver: &mut MockDriver, connector: u32, crtc: u32) -> Device<MockMapping> {
        let buffers = [
            allocate_buffer(driver, 8, 8).unwrap(),
            allocate_buffer(driver, 8, 8).unwrap(),
        ];
        Device::new(
            ConnectorId(connector),
            CrtcAssignment {
                encoder: EncoderId(1),
                crtc: CrtcId(crtc),
            },
            DisplayMode::new("8x8", 8, 8, 60),
            buffers,
        )
    }

    #[test]
    fn test_claims_follow_devices() {
        let mut driver = MockDriver::new();
        let mut registry = DeviceRegistry::new();
        registry.push(device(&mut driver, 1, 20));
        registry.push(device(&mut driver, 2, 21));

        assert_eq!(registry.len(), 2);
        assert!(registry.claimed().contains(&CrtcId(20)));
        assert!(registry.claimed().contains(&CrtcId(21)));
        assert_eq!(registry.get(ConnectorId(2)).map(|d| d.crtc()), Some(CrtcId(21)));

        let mut first = registry.take_next().unwrap();
        assert_eq!(first.connector(), ConnectorId(1));
        assert!(!registry.claimed().contains(&CrtcId(20)));
        first.teardown(&mut driver);

        let mut second = registry.take_next().unwrap();
        second.teardown(&mut driver);
        assert!(registry.take_next().is_none());
        assert!(registry.is_empty());
        assert!(registry.claimed().is_empty());
        assert_eq!(driver.live_allocations(), 0);
    }

    #[test]
    fn test_iteration_keeps_insertion_order() {
        let mut driver = MockDriver::new();
        let mut registry = DeviceRegistry::new();
        for (connector, crtc) in [(5, 22), (3, 20), (4, 21)] {
            registry.push(device(&mut driver, connector, crtc));
        }
        let order: Vec<u32> = registry.iter().map(|d| d.connector().0).collect();
        assert_eq!(order, [5, 3, 4]);

        while let Some(mut device) = registry.take_next() {
            device.teardown(&mut driver);
        }
    }
}
