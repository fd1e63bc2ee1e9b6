//! The boundary between this crate and a native GATT client stack

use uuid::Uuid;

use crate::{CharacteristicProperties, Result};

/// The write path requested by the application.
///
/// The choice is forwarded to the native layer unchanged; retrying a failed
/// reliable write is not this crate's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// Acknowledged write requiring peripheral confirmation.
    Reliable,
    /// Best-effort write without acknowledgement.
    BestEffort,
}

/// How a platform completed the local half of a notification toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifySetup {
    /// The platform collapses the toggle and configuration-descriptor write into
    /// one native call; nothing further is required.
    Complete,
    /// The local toggle succeeded but the client characteristic configuration
    /// descriptor must still be written with the notification sentinel.
    DescriptorWriteRequired,
}

/// The connection state reported by a native callback, before lifecycle
/// validation. Platforms map their own profile-state values onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawConnectionState {
    /// The link is down.
    Disconnected,
    /// The link is being established.
    Connecting,
    /// The link is up.
    Connected,
    /// The link is being torn down.
    Disconnecting,
}

/// A characteristic reported by native service discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredCharacteristic {
    /// The characteristic UUID, normalized to canonical big-endian base-UUID form.
    pub uuid: Uuid,
    /// The characteristic's GATT properties.
    pub properties: CharacteristicProperties,
    /// UUIDs of the characteristic's descriptors.
    pub descriptors: Vec<Uuid>,
}

/// A service reported by native service discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    /// The service UUID, normalized to canonical big-endian base-UUID form.
    pub uuid: Uuid,
    /// The service's characteristics, in native enumeration order.
    pub characteristics: Vec<DiscoveredCharacteristic>,
}

/// One native GATT client stack, wrapping a single peripheral handle.
///
/// Every method dispatches a request to the native stack and returns without
/// waiting for it to complete; completions arrive through the
/// [`GattCallbacks`][crate::GattCallbacks] handed to the platform glue when the
/// device was constructed. An `Err` return reports a dispatch failure only
/// (for example, calling into a dead native object); it never reflects the
/// outcome of the operation itself.
///
/// The platform boundary contract: each dispatched request eventually yields at
/// most one matching completion callback. Zero completions (a dropped
/// connection) must be tolerated by callers; this crate implements no timeouts.
///
/// UUIDs passed in both directions are in canonical big-endian base-UUID form;
/// adapters for stacks with a different short-UUID byte order must normalize at
/// this boundary.
pub trait PlatformAdapter: Send + Sync {
    /// The peripheral's advertised or cached name, if any.
    fn name(&self) -> Option<String>;

    /// Initiates a connection to the peripheral.
    fn connect(&self) -> Result<()>;

    /// Initiates disconnection from the peripheral.
    fn disconnect(&self) -> Result<()>;

    /// Starts service discovery. `generation` tags this attempt and must be
    /// echoed back on every discovery callback it produces.
    fn discover_services(&self, generation: u64) -> Result<()>;

    /// Requests a read of the value of `characteristic` within `service`.
    fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<()>;

    /// Requests a write of `value` to `characteristic` within `service` using the
    /// requested write path.
    fn write_characteristic(&self, service: Uuid, characteristic: Uuid, value: &[u8], kind: WriteKind) -> Result<()>;

    /// Toggles the platform-local notification flag for `characteristic`.
    ///
    /// Returns how the toggle completed; an `Err` means the toggle itself failed
    /// and no descriptor write may follow.
    fn set_characteristic_notification(&self, service: Uuid, characteristic: Uuid, enabled: bool)
        -> Result<NotifySetup>;

    /// Requests a read of `descriptor` of `characteristic` within `service`.
    fn read_descriptor(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid) -> Result<()>;

    /// Requests a write of `value` to `descriptor` of `characteristic` within
    /// `service`.
    fn write_descriptor(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> Result<()>;

    /// Requests the current signal strength of the link.
    fn read_remote_rssi(&self) -> Result<()>;
}
