//! Discovered GATT service tree snapshots and characteristic resolution

use uuid::Uuid;

use crate::btuuid::BluetoothUuidExt;
use crate::platform::DiscoveredService;
use crate::{CharacteristicProperties, DeviceId};

/// A caller-supplied identifier for a characteristic.
///
/// Characteristics assigned by the Bluetooth SIG are commonly referred to by their
/// 16-bit short form; vendor characteristics use a full 128-bit UUID. A short
/// identifier matches any characteristic whose full UUID is the canonical
/// base-UUID form of that 16-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicId {
    /// A 16-bit Bluetooth SIG short UUID.
    Short(u16),
    /// A full 128-bit UUID.
    Full(Uuid),
}

impl CharacteristicId {
    fn matches(&self, uuid: Uuid) -> bool {
        match *self {
            CharacteristicId::Short(short) => uuid.try_to_u16() == Some(short),
            CharacteristicId::Full(full) => uuid == full,
        }
    }
}

impl From<u16> for CharacteristicId {
    fn from(short: u16) -> Self {
        CharacteristicId::Short(short)
    }
}

impl From<Uuid> for CharacteristicId {
    fn from(uuid: Uuid) -> Self {
        CharacteristicId::Full(uuid)
    }
}

/// An opaque handle to a characteristic within one device's discovered service tree.
///
/// A handle is scoped to the discovery snapshot that produced it: after a
/// disconnect/rediscovery cycle the tree is rebuilt and previously resolved
/// handles stop resolving. Handles are never valid across devices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub(crate) device: DeviceId,
    pub(crate) generation: u64,
    pub(crate) service: Uuid,
    pub(crate) characteristic: Uuid,
}

impl CharacteristicRef {
    /// The UUID of the service containing this characteristic.
    pub fn service_uuid(&self) -> Uuid {
        self.service
    }

    /// The UUID of this characteristic.
    pub fn uuid(&self) -> Uuid {
        self.characteristic
    }
}

/// An opaque handle to a descriptor of a resolved characteristic, with the same
/// snapshot scoping as [`CharacteristicRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorRef {
    pub(crate) characteristic: CharacteristicRef,
    pub(crate) descriptor: Uuid,
}

impl DescriptorRef {
    /// The characteristic this descriptor belongs to.
    pub fn characteristic(&self) -> &CharacteristicRef {
        &self.characteristic
    }

    /// The UUID of this descriptor.
    pub fn uuid(&self) -> Uuid {
        self.descriptor
    }
}

#[derive(Debug)]
pub(crate) struct CharacteristicEntry {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug)]
pub(crate) struct ServiceEntry {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicEntry>,
}

/// One immutable snapshot of a device's discovered services.
///
/// A fresh snapshot is built from each completed discovery and swapped in
/// wholesale; it is never mutated in place, so concurrent readers observe either
/// the previous tree or the new one. Adapters must hand over UUIDs already
/// normalized to the canonical big-endian base-UUID form (the two major native
/// stacks disagree on short-UUID byte order).
#[derive(Debug)]
pub(crate) struct GattTree {
    generation: u64,
    services: Vec<ServiceEntry>,
}

impl GattTree {
    /// The pre-discovery snapshot. Resolves nothing.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            services: Vec::new(),
        }
    }

    pub fn build(generation: u64, services: Vec<DiscoveredService>) -> Self {
        let services = services
            .into_iter()
            .map(|s| ServiceEntry {
                uuid: s.uuid,
                characteristics: s
                    .characteristics
                    .into_iter()
                    .map(|c| CharacteristicEntry {
                        uuid: c.uuid,
                        properties: c.properties,
                        descriptors: c.descriptors,
                    })
                    .collect(),
            })
            .collect();
        Self { generation, services }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolves `id` to a handle, searching all services flattened in discovery
    /// order and returning the first match. Uniqueness is not assumed.
    pub fn resolve(&self, device: &DeviceId, id: CharacteristicId) -> Option<CharacteristicRef> {
        for service in &self.services {
            for characteristic in &service.characteristics {
                if id.matches(characteristic.uuid) {
                    return Some(CharacteristicRef {
                        device: device.clone(),
                        generation: self.generation,
                        service: service.uuid,
                        characteristic: characteristic.uuid,
                    });
                }
            }
        }
        None
    }

    /// Validates a handle against this snapshot. Handles from another device or
    /// a superseded discovery fail here rather than reaching the native layer.
    pub fn entry(&self, device: &DeviceId, characteristic: &CharacteristicRef) -> Option<&CharacteristicEntry> {
        if characteristic.device != *device || characteristic.generation != self.generation {
            return None;
        }
        self.services
            .iter()
            .find(|s| s.uuid == characteristic.service)?
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic.characteristic)
    }

    pub fn descriptor(
        &self,
        device: &DeviceId,
        characteristic: &CharacteristicRef,
        descriptor: Uuid,
    ) -> Option<DescriptorRef> {
        let entry = self.entry(device, characteristic)?;
        entry.descriptors.contains(&descriptor).then(|| DescriptorRef {
            characteristic: characteristic.clone(),
            descriptor,
        })
    }
}
