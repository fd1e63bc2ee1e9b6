//! The uniform device event vocabulary and the per-device listener registry

use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::GattOperationResult;
use crate::gatt_tree::{CharacteristicRef, DescriptorRef};
use crate::state::ConnectionState;

/// An event emitted by a [`Device`][crate::Device].
///
/// Every asynchronous native completion is normalized into exactly one of these
/// variants, with the platform's status classified into a
/// [`GattOperationResult`]. Events are emitted synchronously on whichever
/// context received the native callback; listeners must not block it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeviceEvent {
    /// The connection lifecycle state changed.
    ConnectionStateChanged {
        /// The state before the transition.
        old: ConnectionState,
        /// The state after the transition.
        new: ConnectionState,
    },
    /// A service discovery attempt completed.
    ServicesDiscovered {
        /// The aggregate outcome of the discovery attempt.
        result: GattOperationResult,
    },
    /// A characteristic read completed.
    CharacteristicRead {
        /// The characteristic that was read.
        characteristic: CharacteristicRef,
        /// The value reported by the peripheral (empty on failure).
        value: Vec<u8>,
        /// The outcome of the read.
        result: GattOperationResult,
    },
    /// A characteristic write completed.
    CharacteristicWrite {
        /// The characteristic that was written.
        characteristic: CharacteristicRef,
        /// The outcome of the write.
        result: GattOperationResult,
    },
    /// The peripheral pushed a new characteristic value (notification or indication).
    CharacteristicChanged {
        /// The characteristic whose value changed.
        characteristic: CharacteristicRef,
        /// The new value.
        value: Vec<u8>,
        /// The outcome reported with the change.
        result: GattOperationResult,
    },
    /// A descriptor read completed.
    DescriptorRead {
        /// The descriptor that was read.
        descriptor: DescriptorRef,
        /// The value reported by the peripheral (empty on failure).
        value: Vec<u8>,
        /// The outcome of the read.
        result: GattOperationResult,
    },
    /// A descriptor write completed.
    DescriptorWrite {
        /// The descriptor that was written.
        descriptor: DescriptorRef,
        /// The outcome of the write.
        result: GattOperationResult,
    },
    /// A remote RSSI read completed.
    ReadRemoteRssi {
        /// The signal strength in dBm.
        rssi: i16,
        /// The outcome of the read.
        result: GattOperationResult,
    },
    /// A reliable-write transaction completed.
    ReliableWriteCompleted {
        /// The outcome of the transaction.
        result: GattOperationResult,
    },
}

type Listener = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// The listener registry owned by one device. Emission is in registration
/// order; there is no global event bus.
pub(crate) struct Listeners {
    inner: Arc<Mutex<ListenerTable>>,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListenerTable::default())),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&DeviceEvent) + Send + Sync + 'static) -> EventSubscription {
        let mut table = self.inner.lock().unwrap();
        let id = table.next_id;
        table.next_id += 1;
        table.entries.push((id, Arc::new(listener)));
        EventSubscription {
            table: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn emit(&self, event: &DeviceEvent) {
        // Snapshot so a listener may subscribe or unsubscribe re-entrantly;
        // listeners added during emission see only subsequent events.
        let snapshot: Vec<Listener> = {
            let table = self.inner.lock().unwrap();
            table.entries.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in snapshot {
            listener(event);
        }
    }
}

/// A handle to a registered event listener.
///
/// Dropping the subscription unregisters the listener. Returned by
/// [`Device::subscribe`][crate::Device::subscribe].
#[must_use = "dropping an EventSubscription unregisters the listener"]
pub struct EventSubscription {
    table: Weak<Mutex<ListenerTable>>,
    id: u64,
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().unwrap().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription").field("id", &self.id).finish()
    }
}

/// A stream of [`DeviceEvent`]s. Returned by [`Device::events`][crate::Device::events].
///
/// Dropping the stream unregisters the backing listener.
#[derive(Debug)]
pub struct DeviceEvents {
    receiver: Pin<Box<async_channel::Receiver<DeviceEvent>>>,
    _subscription: EventSubscription,
}

impl DeviceEvents {
    pub(crate) fn new(listeners: &Listeners) -> Self {
        let (sender, receiver) = async_channel::unbounded();
        let subscription = listeners.subscribe(move |event| {
            let _ = sender.try_send(event.clone());
        });
        Self {
            receiver: Box::pin(receiver),
            _subscription: subscription,
        }
    }
}

impl Stream for DeviceEvents {
    type Item = DeviceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.as_mut().poll_next(cx)
    }
}
