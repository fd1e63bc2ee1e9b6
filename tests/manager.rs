use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_lite::StreamExt;
use gattway::*;

#[derive(Default)]
struct MockScanBackend {
    scanning: AtomicBool,
    enabled: AtomicBool,
    allow_toggle: AtomicBool,
}

impl ScanBackend for MockScanBackend {
    fn is_supported(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) -> Result<()> {
        if !self.allow_toggle.load(Ordering::SeqCst) {
            return Err(ErrorKind::NotSupported.into());
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn start_scan(&self) -> Result<()> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            return Err(ErrorKind::AlreadyScanning.into());
        }
        Ok(())
    }

    fn stop_scan(&self) -> Result<()> {
        self.scanning.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct NullAdapter;

impl PlatformAdapter for NullAdapter {
    fn name(&self) -> Option<String> {
        None
    }

    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    fn discover_services(&self, _generation: u64) -> Result<()> {
        Ok(())
    }

    fn read_characteristic(&self, _service: Uuid, _characteristic: Uuid) -> Result<()> {
        Ok(())
    }

    fn write_characteristic(
        &self,
        _service: Uuid,
        _characteristic: Uuid,
        _value: &[u8],
        _kind: WriteKind,
    ) -> Result<()> {
        Ok(())
    }

    fn set_characteristic_notification(
        &self,
        _service: Uuid,
        _characteristic: Uuid,
        _enabled: bool,
    ) -> Result<NotifySetup> {
        Ok(NotifySetup::Complete)
    }

    fn read_descriptor(&self, _service: Uuid, _characteristic: Uuid, _descriptor: Uuid) -> Result<()> {
        Ok(())
    }

    fn write_descriptor(&self, _service: Uuid, _characteristic: Uuid, _descriptor: Uuid, _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn read_remote_rssi(&self) -> Result<()> {
        Ok(())
    }
}

fn advertisement(name: &str) -> Advertisement {
    Advertisement {
        local_name: Some(name.into()),
        is_connectable: true,
        ..Default::default()
    }
}

#[test]
fn repeat_discoveries_of_one_id_yield_one_device() {
    let manager = Manager::new(Arc::new(MockScanBackend::default()));
    let first = manager.device_discovered(
        "AA:BB:CC:DD:EE:FF",
        Arc::new(NullAdapter),
        advertisement("sensor"),
        Some(-55),
    );
    assert!(first.is_some());
    let second = manager.device_discovered(
        "AA:BB:CC:DD:EE:FF",
        Arc::new(NullAdapter),
        advertisement("sensor"),
        Some(-61),
    );
    assert!(second.is_none());
    assert_eq!(manager.devices().len(), 1);
}

#[test]
fn devices_are_ordered_by_id() {
    let manager = Manager::new(Arc::new(MockScanBackend::default()));
    let _ = manager.device_discovered("CC:00:00:00:00:01", Arc::new(NullAdapter), Advertisement::default(), None);
    let _ = manager.device_discovered("AA:00:00:00:00:01", Arc::new(NullAdapter), Advertisement::default(), None);
    let ids: Vec<_> = manager.devices().into_iter().map(|d| d.id()).collect();
    assert_eq!(
        ids,
        vec![DeviceId::from("AA:00:00:00:00:01"), DeviceId::from("CC:00:00:00:00:01")]
    );
}

#[test]
fn adapter_toggle_unsupported_is_reported_at_call_time() {
    let backend = Arc::new(MockScanBackend::default());
    let manager = Manager::new(backend.clone());
    assert_eq!(manager.set_enabled(true).unwrap_err().kind(), ErrorKind::NotSupported);

    backend.allow_toggle.store(true, Ordering::SeqCst);
    manager.set_enabled(true).unwrap();
    assert!(manager.is_enabled());
}

#[test]
fn double_start_scan_fails() {
    let manager = Manager::new(Arc::new(MockScanBackend::default()));
    manager.start_scan().unwrap();
    assert_eq!(manager.start_scan().unwrap_err().kind(), ErrorKind::AlreadyScanning);
    manager.stop_scan().unwrap();
    manager.start_scan().unwrap();
}

#[tokio::test]
async fn discovery_stream_sees_new_devices_only() {
    let manager = Manager::new(Arc::new(MockScanBackend::default()));
    let mut discoveries = manager.discoveries();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let _ = manager.device_discovered("AA:BB:CC:DD:EE:FF", Arc::new(NullAdapter), advertisement("one"), Some(-50));
    let _ = manager.device_discovered("AA:BB:CC:DD:EE:FF", Arc::new(NullAdapter), advertisement("one"), Some(-51));
    let _ = manager.device_discovered("11:22:33:44:55:66", Arc::new(NullAdapter), advertisement("two"), None);

    for _ in 0..2 {
        let discovered = discoveries.next().await.unwrap();
        seen.lock().unwrap().push(discovered.device.id());
    }
    assert_eq!(
        *seen.lock().unwrap(),
        vec![DeviceId::from("AA:BB:CC:DD:EE:FF"), DeviceId::from("11:22:33:44:55:66")]
    );
}
