//! The cross-platform BLE device abstraction

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::btuuid::{CLIENT_CHARACTERISTIC_CONFIGURATION, DISABLE_NOTIFICATION_VALUE, ENABLE_NOTIFICATION_VALUE};
use crate::error::{GattOperationResult, GattStatus};
use crate::events::{DeviceEvent, DeviceEvents, EventSubscription, Listeners};
use crate::gatt_tree::{CharacteristicId, CharacteristicRef, DescriptorRef, GattTree};
use crate::platform::{DiscoveredCharacteristic, DiscoveredService, NotifySetup, PlatformAdapter, RawConnectionState};
use crate::state::{ConnectionState, ConnectionStateMachine, StateTransition};
use crate::{Error, ErrorKind, Result, WriteKind};

/// The stable, comparable identifier of a peripheral.
///
/// The contents are platform-determined (a MAC address string on Android-like
/// stacks, a UUID string on CoreBluetooth-like stacks) but always usable as a
/// key: two devices are equal iff their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(pub(crate) String);

impl DeviceId {
    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        DeviceId(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        DeviceId(id.to_owned())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One in-flight service discovery attempt.
#[derive(Debug)]
enum DiscoveryPhase {
    /// Dispatched; no discovery callback has arrived yet.
    AwaitingServices,
    /// The service list arrived; per-service characteristic callbacks are being
    /// counted down.
    PerService {
        slots: Vec<(Uuid, Option<DiscoveredService>)>,
        outstanding: usize,
        failed: bool,
    },
}

#[derive(Debug)]
struct DiscoverySession {
    generation: u64,
    phase: DiscoveryPhase,
}

/// State guarded by one mutex so connection transitions, the generation
/// counter, and the tree swap are atomic with respect to each other.
struct Inner {
    state: ConnectionStateMachine,
    tree: Arc<GattTree>,
    generation: u64,
    discovery: Option<DiscoverySession>,
}

struct Shared {
    id: DeviceId,
    adapter: Arc<dyn PlatformAdapter>,
    listeners: Listeners,
    inner: Mutex<Inner>,
}

impl Shared {
    /// Emits while the inner lock is held, so racing native callbacks and
    /// application calls produce one serialized event order. Listeners must not
    /// call back into device operations from the emitting context.
    fn emit(&self, _guard: &MutexGuard<'_, Inner>, event: DeviceEvent) {
        self.listeners.emit(&event);
    }

    fn emit_transition(&self, guard: &MutexGuard<'_, Inner>, transition: StateTransition) {
        self.emit(
            guard,
            DeviceEvent::ConnectionStateChanged {
                old: transition.old,
                new: transition.new,
            },
        );
    }

    fn characteristic_ref(&self, inner: &Inner, service: Uuid, characteristic: Uuid) -> CharacteristicRef {
        // Stale completions are still delivered; the ref carries the generation
        // current at delivery time, not at issue time.
        CharacteristicRef {
            device: self.id.clone(),
            generation: inner.tree.generation(),
            service,
            characteristic,
        }
    }

    fn finish_discovery(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        generation: u64,
        result: GattOperationResult,
        services: Vec<DiscoveredService>,
    ) {
        inner.discovery = None;
        if result.is_success() {
            inner.tree = Arc::new(GattTree::build(generation, services));
            self.emit(&inner, DeviceEvent::ServicesDiscovered { result });
            if let Some(transition) = inner.state.apply(ConnectionState::ConnectedWithServices) {
                self.emit_transition(&inner, transition);
            }
        } else {
            self.emit(&inner, DeviceEvent::ServicesDiscovered { result });
        }
    }
}

/// A remote BLE peripheral in the GATT central role.
///
/// A `Device` composes the connection state machine, the discovered service
/// tree, and the event normalization layer behind one capability surface. All
/// operations that trigger native work are fire-and-forget: they dispatch and
/// return, and completion is observed exclusively through the event stream.
///
/// Cloning a `Device` yields another handle to the same peripheral. Equality,
/// ordering, and hashing are by [`DeviceId`].
#[derive(Clone)]
pub struct Device {
    shared: Arc<Shared>,
}

impl Device {
    /// Wraps a native peripheral handle.
    ///
    /// Typically called by the platform's scan layer when a peripheral is first
    /// observed. The platform glue should retain the [`GattCallbacks`] from
    /// [`Device::callbacks`] and route every native completion through it.
    pub fn new(id: impl Into<DeviceId>, adapter: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: id.into(),
                adapter,
                listeners: Listeners::new(),
                inner: Mutex::new(Inner {
                    state: ConnectionStateMachine::new(),
                    tree: Arc::new(GattTree::empty()),
                    generation: 0,
                    discovery: None,
                }),
            }),
        }
    }

    /// This device's unique identifier.
    pub fn id(&self) -> DeviceId {
        self.shared.id.clone()
    }

    /// The local name for this device, if available.
    pub fn name(&self) -> Option<String> {
        self.shared.adapter.name()
    }

    /// The current connection lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().unwrap().state.current()
    }

    /// Returns `true` after a successful service discovery, until the next
    /// transition into [`ConnectionState::Disconnected`].
    pub fn services_discovered(&self) -> bool {
        self.connection_state().services_discovered()
    }

    /// The callback sink the platform glue routes native completions through.
    ///
    /// The sink holds only a weak back-reference: once every `Device` clone is
    /// dropped, callbacks routed through it become no-ops.
    pub fn callbacks(&self) -> GattCallbacks {
        GattCallbacks {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Registers an event listener. Listeners are invoked in registration order,
    /// synchronously on the context delivering the native callback; they must
    /// not block it and must not call device operations re-entrantly.
    pub fn subscribe(&self, listener: impl Fn(&DeviceEvent) + Send + Sync + 'static) -> EventSubscription {
        self.shared.listeners.subscribe(listener)
    }

    /// Returns a stream of this device's events.
    pub fn events(&self) -> DeviceEvents {
        DeviceEvents::new(&self.shared.listeners)
    }

    /// Initiates a connection.
    ///
    /// Meaningful only while [`Disconnected`][ConnectionState::Disconnected]; in
    /// any other state this is an idempotent no-op, so a duplicate request
    /// cannot race an in-flight connect.
    pub fn connect(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        let Some(transition) = inner.state.request_connect() else {
            return Ok(());
        };
        self.shared.emit_transition(&inner, transition);
        drop(inner);
        self.shared.adapter.connect()
    }

    /// Initiates disconnection. A no-op while already
    /// [`Disconnected`][ConnectionState::Disconnected].
    ///
    /// In-flight reads and writes are not cancelled; if their completions still
    /// arrive they are normalized and delivered as usual.
    pub fn disconnect(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        let Some(transition) = inner.state.request_disconnect() else {
            return Ok(());
        };
        self.shared.emit_transition(&inner, transition);
        drop(inner);
        self.shared.adapter.disconnect()
    }

    /// Starts service discovery.
    ///
    /// Each call supersedes any attempt still in flight: late callbacks from the
    /// superseded attempt are discarded, and exactly one
    /// [`ServicesDiscovered`][DeviceEvent::ServicesDiscovered] event is emitted
    /// for the newest attempt. Previously resolved characteristic handles become
    /// invalid once the new tree is installed.
    pub fn discover_services(&self) -> Result<()> {
        let generation = {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.generation += 1;
            let generation = inner.generation;
            inner.discovery = Some(DiscoverySession {
                generation,
                phase: DiscoveryPhase::AwaitingServices,
            });
            generation
        };
        self.shared.adapter.discover_services(generation)
    }

    /// Resolves a characteristic identifier within the discovered service tree.
    ///
    /// All services are searched, flattened in discovery order; the first match
    /// wins. Returns `None` when services have not been discovered or nothing
    /// matches. Never fails.
    pub fn get_characteristic(&self, id: impl Into<CharacteristicId>) -> Option<CharacteristicRef> {
        let inner = self.shared.inner.lock().unwrap();
        if !inner.state.current().services_discovered() {
            return None;
        }
        inner.tree.resolve(&self.shared.id, id.into())
    }

    /// Resolves a descriptor of a previously resolved characteristic.
    pub fn get_descriptor(&self, characteristic: &CharacteristicRef, descriptor: Uuid) -> Option<DescriptorRef> {
        let inner = self.shared.inner.lock().unwrap();
        if !inner.state.current().services_discovered() {
            return None;
        }
        inner.tree.descriptor(&self.shared.id, characteristic, descriptor)
    }

    /// Enables or disables notifications for a characteristic.
    ///
    /// On platforms that require it this is a compound operation: the local
    /// notify flag is toggled, then the notification sentinel is written to the
    /// client characteristic configuration descriptor. A toggle failure
    /// short-circuits the descriptor write. Returns `true` only if every
    /// required step was dispatched successfully; the descriptor write's
    /// completion, if one is required, is reported as a
    /// [`DescriptorWrite`][DeviceEvent::DescriptorWrite] event.
    pub fn enable_notifications(&self, characteristic: &CharacteristicRef, enabled: bool) -> bool {
        {
            let inner = self.shared.inner.lock().unwrap();
            if inner.tree.entry(&self.shared.id, characteristic).is_none() {
                debug!("enable_notifications: unresolvable characteristic {characteristic:?}");
                return false;
            }
        }
        let setup = match self.shared.adapter.set_characteristic_notification(
            characteristic.service,
            characteristic.characteristic,
            enabled,
        ) {
            Ok(setup) => setup,
            Err(err) => {
                debug!("notification toggle failed: {err}");
                return false;
            }
        };
        match setup {
            NotifySetup::Complete => true,
            NotifySetup::DescriptorWriteRequired => {
                let value: &[u8] = if enabled {
                    &ENABLE_NOTIFICATION_VALUE
                } else {
                    &DISABLE_NOTIFICATION_VALUE
                };
                self.shared
                    .adapter
                    .write_descriptor(
                        characteristic.service,
                        characteristic.characteristic,
                        CLIENT_CHARACTERISTIC_CONFIGURATION,
                        value,
                    )
                    .map_err(|err| debug!("configuration descriptor write failed: {err}"))
                    .is_ok()
            }
        }
    }

    /// Requests a read of a characteristic's value. The value arrives as a
    /// [`CharacteristicRead`][DeviceEvent::CharacteristicRead] event.
    pub fn read_characteristic(&self, characteristic: &CharacteristicRef) -> Result<()> {
        self.validate(characteristic)?;
        self.shared
            .adapter
            .read_characteristic(characteristic.service, characteristic.characteristic)
    }

    /// Requests a write of `value` to a characteristic.
    ///
    /// `reliable` selects the platform's acknowledged-write path and is
    /// forwarded to the native layer unchanged; no retry is performed here.
    pub fn write_characteristic(&self, characteristic: &CharacteristicRef, value: &[u8], reliable: bool) -> Result<()> {
        self.validate(characteristic)?;
        let kind = if reliable {
            WriteKind::Reliable
        } else {
            WriteKind::BestEffort
        };
        self.shared
            .adapter
            .write_characteristic(characteristic.service, characteristic.characteristic, value, kind)
    }

    /// Requests a read of a descriptor's value.
    pub fn read_descriptor(&self, descriptor: &DescriptorRef) -> Result<()> {
        self.validate(&descriptor.characteristic)?;
        self.shared.adapter.read_descriptor(
            descriptor.characteristic.service,
            descriptor.characteristic.characteristic,
            descriptor.descriptor,
        )
    }

    /// Requests a write of `value` to a descriptor.
    pub fn write_descriptor(&self, descriptor: &DescriptorRef, value: &[u8]) -> Result<()> {
        self.validate(&descriptor.characteristic)?;
        self.shared.adapter.write_descriptor(
            descriptor.characteristic.service,
            descriptor.characteristic.characteristic,
            descriptor.descriptor,
            value,
        )
    }

    /// Requests the current signal strength; it arrives as a
    /// [`ReadRemoteRssi`][DeviceEvent::ReadRemoteRssi] event.
    pub fn read_remote_rssi(&self) -> Result<()> {
        self.shared.adapter.read_remote_rssi()
    }

    /// Rejects handles from another device or a superseded discovery before
    /// they reach the native layer.
    fn validate(&self, characteristic: &CharacteristicRef) -> Result<()> {
        let inner = self.shared.inner.lock().unwrap();
        if inner.tree.entry(&self.shared.id, characteristic).is_none() {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                None,
                format!("characteristic {} is not resolvable", characteristic.characteristic),
            ));
        }
        Ok(())
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}

impl Eq for Device {}

impl PartialOrd for Device {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Device {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.shared.id.cmp(&other.shared.id)
    }
}

impl std::hash::Hash for Device {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.shared.id.hash(state);
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.shared.id)
            .field("state", &self.connection_state())
            .finish()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {:?}",
            self.name().as_deref().unwrap_or("(unknown)"),
            self.shared.id,
            self.connection_state()
        )
    }
}

/// The callback sink a platform adapter drives with native completions.
///
/// Each method normalizes one native callback shape into the uniform
/// [`DeviceEvent`] vocabulary, classifying the raw status on the way. The sink
/// holds a non-owning back-reference to its device, so callbacks arriving after
/// the application has dropped the device are silently discarded.
#[derive(Clone)]
pub struct GattCallbacks {
    shared: Weak<Shared>,
}

impl GattCallbacks {
    /// The native stack reported a connection state change.
    ///
    /// Illegal or redundant transitions are dropped without emitting, so
    /// listeners never observe two consecutive events with the same new state.
    pub fn connection_state_changed(&self, status: GattStatus, state: RawConnectionState) {
        let Some(shared) = self.shared.upgrade() else { return };
        if !status.is_success() {
            debug!("connection state change for {} with status {status:?}", shared.id);
        }
        let new = match state {
            RawConnectionState::Disconnected => ConnectionState::Disconnected,
            RawConnectionState::Connecting => ConnectionState::Connecting,
            RawConnectionState::Connected => ConnectionState::Connected,
            RawConnectionState::Disconnecting => ConnectionState::Disconnecting,
        };
        let mut inner = shared.inner.lock().unwrap();
        if let Some(transition) = inner.state.apply(new) {
            shared.emit_transition(&inner, transition);
        }
    }

    /// Whole-tree discovery completion: the native stack discovered every
    /// service and characteristic in one callback (Android-like stacks).
    pub fn services_discovered(&self, generation: u64, status: GattStatus, services: Vec<DiscoveredService>) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        if !current_attempt(&inner, generation) {
            warn!("discarding services-discovered callback for superseded attempt {generation}");
            return;
        }
        shared.finish_discovery(inner, generation, status.classify(), services);
    }

    /// Per-service discovery, step one: the list of service UUIDs arrived and a
    /// characteristic-discovery callback is now expected for each (CoreBluetooth-like
    /// stacks). An empty list completes the attempt immediately.
    pub fn service_list_discovered(&self, generation: u64, status: GattStatus, services: Vec<Uuid>) {
        let Some(shared) = self.shared.upgrade() else { return };
        let mut inner = shared.inner.lock().unwrap();
        if !current_attempt(&inner, generation) {
            warn!("discarding service-list callback for superseded attempt {generation}");
            return;
        }
        if !status.is_success() || services.is_empty() {
            shared.finish_discovery(inner, generation, status.classify(), Vec::new());
            return;
        }
        let outstanding = services.len();
        if let Some(session) = inner.discovery.as_mut() {
            session.phase = DiscoveryPhase::PerService {
                slots: services.into_iter().map(|uuid| (uuid, None)).collect(),
                outstanding,
                failed: false,
            };
        }
    }

    /// Per-service discovery, step two: the characteristics of one service
    /// arrived. When the last outstanding service reports, the aggregate
    /// [`ServicesDiscovered`][DeviceEvent::ServicesDiscovered] event is emitted.
    pub fn characteristics_discovered(
        &self,
        generation: u64,
        service: Uuid,
        status: GattStatus,
        characteristics: Vec<DiscoveredCharacteristic>,
    ) {
        let Some(shared) = self.shared.upgrade() else { return };
        let mut inner = shared.inner.lock().unwrap();
        if !current_attempt(&inner, generation) {
            warn!("discarding characteristics callback for superseded attempt {generation}");
            return;
        }
        let Some(session) = inner.discovery.as_mut() else { return };
        let DiscoveryPhase::PerService {
            slots,
            outstanding,
            failed,
        } = &mut session.phase
        else {
            warn!("characteristics callback before service list; discarding");
            return;
        };
        let Some(slot) = slots.iter_mut().find(|(uuid, filled)| *uuid == service && filled.is_none()) else {
            debug!("duplicate or unexpected characteristics callback for service {service}");
            return;
        };
        if status.is_success() {
            slot.1 = Some(DiscoveredService {
                uuid: service,
                characteristics,
            });
        } else {
            slot.1 = Some(DiscoveredService {
                uuid: service,
                characteristics: Vec::new(),
            });
            *failed = true;
        }
        *outstanding -= 1;
        if *outstanding > 0 {
            return;
        }
        let result = if *failed {
            GattOperationResult::Failure
        } else {
            GattOperationResult::Success
        };
        let services = slots.iter_mut().filter_map(|(_, filled)| filled.take()).collect();
        shared.finish_discovery(inner, generation, result, services);
    }

    /// A characteristic read completed.
    pub fn characteristic_read(&self, service: Uuid, characteristic: Uuid, status: GattStatus, value: Vec<u8>) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        let characteristic = shared.characteristic_ref(&inner, service, characteristic);
        shared.emit(
            &inner,
            DeviceEvent::CharacteristicRead {
                characteristic,
                value,
                result: status.classify(),
            },
        );
    }

    /// A characteristic write completed.
    pub fn characteristic_written(&self, service: Uuid, characteristic: Uuid, status: GattStatus) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        let characteristic = shared.characteristic_ref(&inner, service, characteristic);
        shared.emit(
            &inner,
            DeviceEvent::CharacteristicWrite {
                characteristic,
                result: status.classify(),
            },
        );
    }

    /// The peripheral pushed a new value for a characteristic.
    pub fn characteristic_changed(&self, service: Uuid, characteristic: Uuid, value: Vec<u8>) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        let characteristic = shared.characteristic_ref(&inner, service, characteristic);
        shared.emit(
            &inner,
            DeviceEvent::CharacteristicChanged {
                characteristic,
                value,
                result: GattOperationResult::Success,
            },
        );
    }

    /// A descriptor read completed.
    pub fn descriptor_read(
        &self,
        service: Uuid,
        characteristic: Uuid,
        descriptor: Uuid,
        status: GattStatus,
        value: Vec<u8>,
    ) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        let descriptor = DescriptorRef {
            characteristic: shared.characteristic_ref(&inner, service, characteristic),
            descriptor,
        };
        shared.emit(
            &inner,
            DeviceEvent::DescriptorRead {
                descriptor,
                value,
                result: status.classify(),
            },
        );
    }

    /// A descriptor write completed.
    pub fn descriptor_written(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid, status: GattStatus) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        let descriptor = DescriptorRef {
            characteristic: shared.characteristic_ref(&inner, service, characteristic),
            descriptor,
        };
        shared.emit(
            &inner,
            DeviceEvent::DescriptorWrite {
                descriptor,
                result: status.classify(),
            },
        );
    }

    /// A remote RSSI read completed.
    pub fn remote_rssi(&self, status: GattStatus, rssi: i16) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        shared.emit(
            &inner,
            DeviceEvent::ReadRemoteRssi {
                rssi,
                result: status.classify(),
            },
        );
    }

    /// A reliable-write transaction completed.
    pub fn reliable_write_completed(&self, status: GattStatus) {
        let Some(shared) = self.shared.upgrade() else { return };
        let inner = shared.inner.lock().unwrap();
        shared.emit(
            &inner,
            DeviceEvent::ReliableWriteCompleted {
                result: status.classify(),
            },
        );
    }
}

impl std::fmt::Debug for GattCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GattCallbacks")
    }
}

fn current_attempt(inner: &Inner, generation: u64) -> bool {
    matches!(&inner.discovery, Some(session) if session.generation == generation)
}
