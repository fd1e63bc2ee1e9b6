//! Connection lifecycle state machine

use tracing::debug;

/// The connection lifecycle state of a [`Device`][crate::Device].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No connection exists and none is being established.
    Disconnected,
    /// A connection request has been issued and is awaiting the native stack.
    Connecting,
    /// The link is established; services have not been discovered.
    Connected,
    /// The link is established and service discovery has completed successfully.
    ConnectedWithServices,
    /// A disconnect has been requested and is awaiting the native stack.
    Disconnecting,
}

impl ConnectionState {
    /// Returns `true` if the device's service tree is currently valid.
    pub fn services_discovered(self) -> bool {
        matches!(self, ConnectionState::ConnectedWithServices)
    }
}

/// An accepted state transition, carried by
/// [`ConnectionStateChanged`][crate::DeviceEvent::ConnectionStateChanged].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// The state before the transition.
    pub old: ConnectionState,
    /// The state after the transition.
    pub new: ConnectionState,
}

/// Tracks the current connection state and validates transitions.
///
/// Each accepting method returns the transition that was applied, or `None` when the
/// input is illegal or redundant in the current state and must be dropped without
/// emitting anything. This guarantees listeners never observe two consecutive
/// events with the same `new` state.
#[derive(Debug)]
pub(crate) struct ConnectionStateMachine {
    current: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            current: ConnectionState::Disconnected,
        }
    }

    pub fn current(&self) -> ConnectionState {
        self.current
    }

    /// A connect request is meaningful only while disconnected; anywhere else it is
    /// an idempotent no-op so duplicate requests cannot race an in-flight connect.
    pub fn request_connect(&mut self) -> Option<StateTransition> {
        match self.current {
            ConnectionState::Disconnected => self.transition(ConnectionState::Connecting),
            other => {
                debug!("ignoring connect request in state {other:?}");
                None
            }
        }
    }

    /// A disconnect request is meaningful from any non-disconnected state.
    pub fn request_disconnect(&mut self) -> Option<StateTransition> {
        match self.current {
            ConnectionState::Disconnected => {
                debug!("ignoring disconnect request while already disconnected");
                None
            }
            _ => self.transition(ConnectionState::Disconnecting),
        }
    }

    /// Applies a state reported by the native stack.
    ///
    /// Duplicates of the current state are dropped. `ConnectedWithServices` is
    /// only reachable from `Connected`, so an unsolicited discovery completion
    /// arriving in any other state cannot corrupt the lifecycle.
    pub fn apply(&mut self, new: ConnectionState) -> Option<StateTransition> {
        if new == self.current {
            debug!("dropping redundant native transition to {new:?}");
            return None;
        }
        if new == ConnectionState::ConnectedWithServices && self.current != ConnectionState::Connected {
            debug!("dropping services-ready transition in state {:?}", self.current);
            return None;
        }
        self.transition(new)
    }

    fn transition(&mut self, new: ConnectionState) -> Option<StateTransition> {
        let old = std::mem::replace(&mut self.current, new);
        debug!("connection state {old:?} -> {new:?}");
        Some(StateTransition { old, new })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn connect_only_from_disconnected() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(
            sm.request_connect(),
            Some(StateTransition {
                old: Disconnected,
                new: Connecting
            })
        );
        assert_eq!(sm.request_connect(), None);
        sm.apply(Connected);
        assert_eq!(sm.request_connect(), None);
        assert_eq!(sm.current(), Connected);
    }

    #[test]
    fn disconnect_from_any_nondisconnected_state() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(sm.request_disconnect(), None);
        sm.request_connect();
        assert_eq!(
            sm.request_disconnect(),
            Some(StateTransition {
                old: Connecting,
                new: Disconnecting
            })
        );
    }

    #[test]
    fn duplicate_native_states_are_dropped() {
        let mut sm = ConnectionStateMachine::new();
        sm.request_connect();
        assert!(sm.apply(Connected).is_some());
        assert_eq!(sm.apply(Connected), None);
        assert!(sm.apply(Disconnected).is_some());
        assert_eq!(sm.apply(Disconnected), None);
    }

    #[test]
    fn services_ready_requires_connected() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(sm.apply(ConnectedWithServices), None);
        sm.request_connect();
        assert_eq!(sm.apply(ConnectedWithServices), None);
        sm.apply(Connected);
        assert!(sm.apply(ConnectedWithServices).is_some());
        assert!(sm.current().services_discovered());
        sm.apply(Disconnected);
        assert!(!sm.current().services_discovered());
    }

    #[test]
    fn emitted_sequence_has_no_consecutive_duplicates() {
        let mut sm = ConnectionStateMachine::new();
        let inputs = [
            Connecting,
            Connecting,
            Connected,
            Connected,
            ConnectedWithServices,
            ConnectedWithServices,
            Disconnected,
            Disconnected,
            Connected,
        ];
        let mut emitted = Vec::new();
        for input in inputs {
            if let Some(t) = sm.apply(input) {
                emitted.push(t);
            }
        }
        for pair in emitted.windows(2) {
            assert_ne!(pair[0].new, pair[1].new);
            assert_eq!(pair[0].new, pair[1].old);
        }
    }
}
