//! `Uuid` helpers for 16-bit Bluetooth UUIDs and well-known GATT constants

use uuid::Uuid;

/// This is the Bluetooth Base UUID. It is used with the 16-bit and 32-bit UUIDs
/// [defined](https://www.bluetooth.com/specifications/assigned-numbers/) by the Bluetooth SIG.
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Const function to create a 16-bit Bluetooth UUID
pub const fn bluetooth_uuid_from_u16(uuid: u16) -> Uuid {
    Uuid::from_u128(((uuid as u128) << 96) | BLUETOOTH_BASE_UUID)
}

/// The Client Characteristic Configuration descriptor (CCCD), written to enable or
/// disable notifications on platforms that expose the descriptor directly.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid = bluetooth_uuid_from_u16(0x2902);

/// CCCD value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// CCCD value disabling notifications and indications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Extension trait for [uuid::Uuid] with helper methods for dealing with 16-bit Bluetooth UUIDs
pub trait BluetoothUuidExt: private::Sealed {
    /// Creates a 16-bit Bluetooth UUID
    fn from_u16(uuid: u16) -> Self;

    /// Returns `true` if self is a valid 16-bit Bluetooth UUID
    fn is_u16_uuid(&self) -> bool;

    /// Tries to convert self into a 16-bit Bluetooth UUID
    fn try_to_u16(&self) -> Option<u16>;
}

impl BluetoothUuidExt for Uuid {
    fn from_u16(uuid: u16) -> Self {
        bluetooth_uuid_from_u16(uuid)
    }

    fn is_u16_uuid(&self) -> bool {
        let u = self.as_u128();
        (u & ((1 << 96) - 1)) == BLUETOOTH_BASE_UUID && (((u >> 96) as u32) & 0xffff0000) == 0
    }

    fn try_to_u16(&self) -> Option<u16> {
        let u = self.as_u128();
        self.is_u16_uuid().then(|| (u >> 96) as u16)
    }
}

mod private {
    use uuid::Uuid;

    pub trait Sealed {}

    impl Sealed for Uuid {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trip() {
        let uuid = Uuid::from_u16(0x180f);
        assert!(uuid.is_u16_uuid());
        assert_eq!(uuid.try_to_u16(), Some(0x180f));
        assert_eq!(uuid, "0000180f-0000-1000-8000-00805f9b34fb".parse::<Uuid>().unwrap());
    }

    #[test]
    fn full_uuid_is_not_short() {
        let uuid: Uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e".parse().unwrap();
        assert!(!uuid.is_u16_uuid());
        assert_eq!(uuid.try_to_u16(), None);
    }

    #[test]
    fn cccd_is_short() {
        assert_eq!(CLIENT_CHARACTERISTIC_CONFIGURATION.try_to_u16(), Some(0x2902));
    }
}
