#![warn(missing_docs)]

//! Gattway is a cross-platform [Bluetooth Low Energy] (BLE) GATT client abstraction for [Rust].
//!
//! The goal of Gattway is to normalize the heterogeneous native BLE central-role APIs
//! (Android's GATT client, Apple's CoreBluetooth) into one device abstraction with a uniform
//! connection lifecycle, service/characteristic discovery, read/write/notify operations, and a
//! single event vocabulary. Application code scans for, connects to, and exchanges data with
//! peripherals without per-platform branching; the GAP Central and GATT Client roles are
//! supported, Peripheral and Server roles are not.
//!
//! [Rust]: https://www.rust-lang.org/
//! [Bluetooth Low Energy]: https://www.bluetooth.com/specifications/specs/
//!
//! # Overview
//!
//! The primary types are:
//!
//! - [`Device`]: the public capability surface — [connect][Device::connect],
//!   [disconnect][Device::disconnect], [discover services][Device::discover_services],
//!   [resolve characteristics][Device::get_characteristic],
//!   [enable notifications][Device::enable_notifications],
//!   [read][Device::read_characteristic]/[write][Device::write_characteristic], and the
//!   [event stream][Device::events].
//! - [`DeviceEvent`]: the uniform event vocabulary every native completion is normalized into,
//!   each carrying a four-way [`GattOperationResult`] in place of any platform status code.
//! - [`PlatformAdapter`]: the seam a platform backend implements, paired with the
//!   [`GattCallbacks`] sink it drives with native completions.
//! - [`Manager`]: the scan-layer facade that constructs `Device` instances from native
//!   discovery results.
//!
//! # Operations and events
//!
//! Every operation that triggers native work is fire-and-forget: it dispatches the request and
//! returns. Completion is observed exclusively through the event stream — there is no blocking
//! round-trip anywhere in the crate, and no timeout or retry machinery: if the native stack
//! never delivers a completion (a dropped connection, for example), the operation simply never
//! produces an event.
//!
//! Events are emitted synchronously on whichever context delivered the native callback, in
//! listener-registration order. Listeners must not block that context and must not call device
//! operations from within the callback; hand work off to your own executor instead.
//!
//! # Platform specifics
//!
//! The two major native stacks differ in ways this crate hides:
//!
//! - Service discovery is one whole-tree callback on Android-like stacks and a per-service
//!   countdown on CoreBluetooth-like stacks; both arrive as a single
//!   [`ServicesDiscovered`][DeviceEvent::ServicesDiscovered] event.
//! - Enabling notifications is a single native call on some platforms and a
//!   toggle-plus-descriptor-write on others; [`Device::enable_notifications`] performs whichever
//!   the platform requires.
//! - The stacks disagree on the byte order of 16-bit short UUIDs. Adapters normalize to the
//!   canonical big-endian base-UUID form at the [`PlatformAdapter`] boundary, so
//!   [`Device::get_characteristic`] resolves a short id and its full form identically on every
//!   platform.
//!
//! # Feature flags
//!
//! The `serde` feature is available to enable serializing/deserializing device identifiers.

pub mod btuuid;
pub mod error;

mod device;
mod events;
mod gatt_tree;
mod manager;
mod platform;
mod state;

pub use device::{Device, DeviceId, GattCallbacks};
pub use error::{Error, ErrorKind, GattOperationResult, GattStatus};
pub use events::{DeviceEvent, DeviceEvents, EventSubscription};
pub use gatt_tree::{CharacteristicId, CharacteristicRef, DescriptorRef};
pub use manager::{Advertisement, DiscoveredDevice, Discoveries, Manager, ScanBackend};
pub use platform::{
    DiscoveredCharacteristic, DiscoveredService, NotifySetup, PlatformAdapter, RawConnectionState, WriteKind,
};
pub use state::{ConnectionState, StateTransition};
pub use uuid::Uuid;

/// Convenience alias for a result with [`Error`]
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Manufacturer specific data included in Bluetooth advertisements. See the Bluetooth Core
/// Specification Supplement §A.1.4 for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManufacturerData {
    /// Company identifier (defined [here](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/))
    pub company_id: u16,
    /// Manufacturer specific data
    pub data: Vec<u8>,
}

/// GATT characteristic properties as defined in the Bluetooth Core Specification, Vol 3,
/// Part G, §3.3.1.1. Extended properties are also included as defined in §3.3.3.1.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CharacteristicProperties {
    pub broadcast: bool,
    pub read: bool,
    pub write_without_response: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
    pub authenticated_signed_writes: bool,
    pub extended_properties: bool,
    pub reliable_write: bool,
    pub writable_auxiliaries: bool,
}

impl CharacteristicProperties {
    /// Raw transmutation from [`u32`].
    ///
    /// Extended properties are in the upper bits.
    pub fn from_bits(bits: u32) -> Self {
        CharacteristicProperties {
            broadcast: (bits & (1 << 0)) != 0,
            read: (bits & (1 << 1)) != 0,
            write_without_response: (bits & (1 << 2)) != 0,
            write: (bits & (1 << 3)) != 0,
            notify: (bits & (1 << 4)) != 0,
            indicate: (bits & (1 << 5)) != 0,
            authenticated_signed_writes: (bits & (1 << 6)) != 0,
            extended_properties: (bits & (1 << 7)) != 0,
            reliable_write: (bits & (1 << 8)) != 0,
            writable_auxiliaries: (bits & (1 << 9)) != 0,
        }
    }

    /// Raw transmutation to [`u32`].
    ///
    /// Extended properties are in the upper bits.
    pub fn to_bits(self) -> u32 {
        u32::from(self.broadcast)
            | (u32::from(self.read) << 1)
            | (u32::from(self.write_without_response) << 2)
            | (u32::from(self.write) << 3)
            | (u32::from(self.notify) << 4)
            | (u32::from(self.indicate) << 5)
            | (u32::from(self.authenticated_signed_writes) << 6)
            | (u32::from(self.extended_properties) << 7)
            | (u32::from(self.reliable_write) << 8)
            | (u32::from(self.writable_auxiliaries) << 9)
    }
}
