//! The scan/adapter facade producing [`Device`] instances

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_core::Stream;
use tracing::debug;
use uuid::Uuid;

use crate::platform::PlatformAdapter;
use crate::{Device, DeviceId, ManufacturerData, Result};

/// Data included in a Bluetooth advertisement or scan response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// The (possibly shortened) local name of the device.
    pub local_name: Option<String>,
    /// Advertised GATT service UUIDs.
    pub services: Vec<Uuid>,
    /// Manufacturer specific data.
    pub manufacturer_data: Option<ManufacturerData>,
    /// Set to true for connectable advertising packets.
    pub is_connectable: bool,
}

/// A device observed during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// The source of the advertisement.
    pub device: Device,
    /// The advertisement data.
    pub advertisement: Advertisement,
    /// The signal strength in dBm of the received advertisement packet, if reported.
    pub rssi: Option<i16>,
}

/// The native scan driver behind the [`Manager`].
///
/// This is the out-of-scope platform boundary: implementations wrap the
/// platform scanning API and report observed peripherals through
/// [`Manager::device_discovered`].
pub trait ScanBackend: Send + Sync {
    /// Whether this platform has a BLE central-capable adapter at all.
    fn is_supported(&self) -> bool;

    /// Whether the adapter is currently powered on.
    fn is_enabled(&self) -> bool;

    /// Attempts to enable or disable the adapter.
    ///
    /// Platforms that forbid programmatic toggling must return
    /// [`ErrorKind::NotSupported`][crate::ErrorKind::NotSupported] here, at call
    /// time, rather than failing asynchronously.
    fn set_enabled(&self, enabled: bool) -> Result<()>;

    /// Starts scanning for advertisements.
    fn start_scan(&self) -> Result<()>;

    /// Stops scanning.
    fn stop_scan(&self) -> Result<()>;
}

struct ManagerInner {
    known: BTreeMap<DeviceId, Device>,
    senders: Vec<async_channel::Sender<DiscoveredDevice>>,
}

/// Produces [`Device`] instances from native scan results.
///
/// The manager owns the one-`Device`-per-id invariant the rest of the crate
/// assumes: repeat observations of a known peripheral are dropped rather than
/// yielding a second `Device`.
pub struct Manager {
    backend: Arc<dyn ScanBackend>,
    inner: Mutex<ManagerInner>,
}

impl Manager {
    /// Creates a manager over a platform scan driver.
    pub fn new(backend: Arc<dyn ScanBackend>) -> Self {
        Self {
            backend,
            inner: Mutex::new(ManagerInner {
                known: BTreeMap::new(),
                senders: Vec::new(),
            }),
        }
    }

    /// Whether BLE central operation is supported on this platform.
    pub fn is_supported(&self) -> bool {
        self.backend.is_supported()
    }

    /// Whether the adapter is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    /// Attempts to enable or disable the adapter. Fails with
    /// [`ErrorKind::NotSupported`][crate::ErrorKind::NotSupported] on platforms
    /// that forbid programmatic toggling.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.backend.set_enabled(enabled)
    }

    /// Starts scanning for peripherals.
    pub fn start_scan(&self) -> Result<()> {
        self.backend.start_scan()
    }

    /// Stops scanning.
    pub fn stop_scan(&self) -> Result<()> {
        self.backend.stop_scan()
    }

    /// Every device this manager has produced so far, ordered by id.
    pub fn devices(&self) -> Vec<Device> {
        self.inner.lock().unwrap().known.values().cloned().collect()
    }

    /// Returns a stream of newly discovered devices.
    pub fn discoveries(&self) -> Discoveries {
        let (sender, receiver) = async_channel::unbounded();
        self.inner.lock().unwrap().senders.push(sender);
        Discoveries {
            receiver: Box::pin(receiver),
        }
    }

    /// Called by the scan driver for each observed peripheral.
    ///
    /// Constructs a [`Device`] on first observation and returns it; repeat
    /// observations of a known id return `None` and notify nobody.
    pub fn device_discovered(
        &self,
        id: impl Into<DeviceId>,
        adapter: Arc<dyn PlatformAdapter>,
        advertisement: Advertisement,
        rssi: Option<i16>,
    ) -> Option<Device> {
        let id = id.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.known.contains_key(&id) {
            debug!("ignoring repeat discovery of {id}");
            return None;
        }
        let device = Device::new(id.clone(), adapter);
        inner.known.insert(id, device.clone());
        let discovered = DiscoveredDevice {
            device: device.clone(),
            advertisement,
            rssi,
        };
        inner.senders.retain(|sender| sender.try_send(discovered.clone()).is_ok());
        Some(device)
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("devices", &self.inner.lock().unwrap().known.len())
            .finish()
    }
}

/// A stream of [`DiscoveredDevice`]s. Returned by [`Manager::discoveries`].
#[derive(Debug)]
pub struct Discoveries {
    receiver: Pin<Box<async_channel::Receiver<DiscoveredDevice>>>,
}

impl Stream for Discoveries {
    type Item = DiscoveredDevice;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.as_mut().poll_next(cx)
    }
}
