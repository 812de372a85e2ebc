use super::*;
use crate::error::ThermcamError;

fn thermal_camera() -> DeviceDescriptor {
    DeviceDescriptor::new(1, 239, 2)
}

#[tokio::test]
async fn test_register_is_idempotent() {
    let (backend, bus) = mock_bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = DeviceWatcher::new(backend, tx);

    watcher.register().unwrap();
    watcher.register().unwrap();
    assert!(watcher.is_registered());
    assert!(bus.is_listening());

    bus.attach(thermal_camera());
    match rx.recv().await.unwrap() {
        DeviceEvent::Attached(device) => assert_eq!(device, thermal_camera()),
        other => panic!("Expected Attached, got {:?}", other),
    }
    // a double register must not double-deliver
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unregister_stops_delivery() {
    let (backend, bus) = mock_bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = DeviceWatcher::new(backend, tx);

    watcher.register().unwrap();
    watcher.unregister().unwrap();
    watcher.unregister().unwrap();
    assert!(!watcher.is_registered());

    bus.attach(thermal_camera());
    assert!(rx.try_recv().is_err());

    // registering again reports the device that arrived meanwhile
    watcher.register().unwrap();
    match rx.recv().await.unwrap() {
        DeviceEvent::Attached(device) => assert_eq!(device, thermal_camera()),
        other => panic!("Expected Attached, got {:?}", other),
    }

    bus.detach(thermal_camera());
    assert!(matches!(rx.recv().await, Some(DeviceEvent::Detached(_))));
}

#[tokio::test]
async fn test_destroy_is_terminal() {
    let (backend, bus) = mock_bus();
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut watcher = DeviceWatcher::new(backend, tx);

    watcher.register().unwrap();
    watcher.destroy();
    assert!(watcher.is_destroyed());
    assert!(bus.is_released());
    assert!(!bus.is_listening());

    assert!(matches!(
        watcher.register(),
        Err(ThermcamError::WatcherDestroyed)
    ));
    assert!(matches!(
        watcher.unregister(),
        Err(ThermcamError::WatcherDestroyed)
    ));
    assert!(matches!(
        watcher.request_permission(&thermal_camera()),
        Err(ThermcamError::WatcherDestroyed)
    ));

    // destroying twice is harmless
    watcher.destroy();
}

#[tokio::test]
async fn test_permission_grant_delivers_handle() {
    let (backend, bus) = mock_bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = DeviceWatcher::new(backend, tx);
    watcher.register().unwrap();

    watcher.request_permission(&thermal_camera()).unwrap();

    assert!(matches!(
        rx.recv().await,
        Some(DeviceEvent::PermissionResult { granted: true, .. })
    ));
    let handle = match rx.recv().await {
        Some(DeviceEvent::Connected { handle, .. }) => handle,
        other => panic!("Expected Connected, got {:?}", other),
    };

    let id = handle.id();
    drop(handle);
    assert_eq!(bus.release_count(id), 1);
    assert_eq!(bus.permission_requests(), vec![thermal_camera()]);
}

#[tokio::test]
async fn test_permission_denied() {
    let (backend, bus) = mock_bus();
    bus.set_grant_permission(false);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = DeviceWatcher::new(backend, tx);
    watcher.register().unwrap();

    watcher.request_permission(&thermal_camera()).unwrap();

    assert!(matches!(
        rx.recv().await,
        Some(DeviceEvent::PermissionResult { granted: false, .. })
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_register_enumerates_present_devices() {
    let (backend, bus) = mock_bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = DeviceWatcher::new(backend, tx);

    bus.attach(thermal_camera());
    bus.attach(DeviceDescriptor::new(2, 3, 1));
    bus.detach(DeviceDescriptor::new(2, 3, 1));
    assert!(rx.try_recv().is_err());

    watcher.register().unwrap();
    match rx.recv().await.unwrap() {
        DeviceEvent::Attached(device) => assert_eq!(device, thermal_camera()),
        other => panic!("Expected Attached, got {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}
