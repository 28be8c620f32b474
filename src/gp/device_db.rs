// SPDX-License-Identifier: MIT OR Apache-2.0

use heapless::FnvIndexMap;
use log::warn;

use crate::ezsp::KeyData;
use crate::Error;

/// Most Green Power devices trackable at once.
pub const MAX_GP_DEVICES: usize = 64;

/// A provisioned Green Power device: its source id and individual key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpDevice {
    source_id: u32,
    key: KeyData,
}

impl GpDevice {
    #[must_use]
    pub const fn new(source_id: u32, key: KeyData) -> Self {
        Self { source_id, key }
    }

    /// Builds a device from a 32-digit hex key string.
    ///
    /// # Errors
    ///
    /// * `Err(Error::MalformedFrame)` for anything but 32 hex digits
    pub fn from_hex_key(source_id: u32, digits: &str) -> Result<Self, Error> {
        Ok(Self { source_id, key: KeyData::from_hex(digits)? })
    }

    #[must_use]
    pub const fn source_id(&self) -> u32 {
        self.source_id
    }

    #[must_use]
    pub const fn key(&self) -> &KeyData {
        &self.key
    }
}

/// The directory of authentication keys, indexed by source id. Read on
/// every secured frame, written only when the application provisions or
/// removes devices.
#[derive(Debug, Default)]
pub struct GpDeviceDb {
    devices: FnvIndexMap<u32, KeyData, MAX_GP_DEVICES>,
}

impl GpDeviceDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device, replacing any key already on file for the source id.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Capacity)` when the directory is full
    pub fn insert(&mut self, device: GpDevice) -> Result<(), Error> {
        match self.devices.insert(device.source_id, device.key) {
            Ok(Some(_)) => {
                warn!("overwriting key for source id 0x{:08X}", device.source_id);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(_) => Err(Error::Capacity),
        }
    }

    /// Replaces the whole directory.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Capacity)` when the list exceeds the directory size
    pub fn set_all(&mut self, devices: &[GpDevice]) -> Result<(), Error> {
        self.devices.clear();
        for device in devices {
            self.insert(*device)?;
        }
        Ok(())
    }

    pub fn remove(&mut self, source_id: u32) -> Option<KeyData> {
        self.devices.remove(&source_id)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    #[must_use]
    pub fn key_for(&self, source_id: u32) -> Option<&KeyData> {
        self.devices.get(&source_id)
    }

    #[must_use]
    pub fn contains(&self, source_id: u32) -> bool {
        self.devices.contains_key(&source_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{GpDevice, GpDeviceDb};
    use crate::ezsp::KeyData;

    #[test]
    fn lookup_returns_the_inserted_key() {
        let mut db = GpDeviceDb::new();
        let device =
            GpDevice::from_hex_key(0x1122_3344, "5A6967426565416C6C69616E63653039").unwrap();
        db.insert(device).unwrap();
        assert_eq!(db.key_for(0x1122_3344), Some(device.key()));
        assert!(db.key_for(0x0000_0001).is_none());
    }

    #[test]
    fn insert_replaces_existing_key() {
        let mut db = GpDeviceDb::new();
        db.insert(GpDevice::new(1, KeyData::default())).unwrap();
        let replacement = KeyData([0xAA; 16]);
        db.insert(GpDevice::new(1, replacement)).unwrap();
        assert_eq!(db.key_for(1), Some(&replacement));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn set_all_resets_the_directory() {
        let mut db = GpDeviceDb::new();
        db.insert(GpDevice::new(1, KeyData::default())).unwrap();
        db.set_all(&[GpDevice::new(2, KeyData::default()), GpDevice::new(3, KeyData::default())])
            .unwrap();
        assert!(!db.contains(1));
        assert!(db.contains(2));
        assert!(db.contains(3));
        db.clear();
        assert!(db.is_empty());
    }
}
