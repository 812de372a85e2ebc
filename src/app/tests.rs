use super::*;
use crate::command::{CommandKind, HeadlessSurface, IssuedCommand, RecordingCommandSink};
use crate::config::ThermcamConfig;
use crate::device::DeviceDescriptor;
use crate::error::ThermcamError;
use crate::events::ThermcamEvent;
use crate::session::SessionState;
use crate::watcher::{mock_bus, MockHotplugBackend, MockUsbBus};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;

type TestService = ThermcamService<MockHotplugBackend, RecordingCommandSink, HeadlessSurface>;

struct Running {
    bus: MockUsbBus,
    sink: RecordingCommandSink,
    handle: ServiceHandle,
    events: broadcast::Receiver<ThermcamEvent>,
    task: JoinHandle<crate::error::Result<i32>>,
}

fn create_service() -> (TestService, MockUsbBus, RecordingCommandSink) {
    let (backend, bus) = mock_bus();
    let sink = RecordingCommandSink::new();
    let service = ThermcamService::new(
        ThermcamConfig::default(),
        backend,
        sink.clone(),
        HeadlessSurface::new(512, 384),
    )
    .unwrap();
    (service, bus, sink)
}

/// Start the watcher before spawning so devices plugged in right away are seen
fn spawn_service() -> Running {
    let (mut service, bus, sink) = create_service();
    service.start().unwrap();
    let handle = service.handle();
    let events = handle.subscribe();
    let task = tokio::spawn(service.run());

    Running {
        bus,
        sink,
        handle,
        events,
        task,
    }
}

fn camera() -> DeviceDescriptor {
    DeviceDescriptor::new(4, 239, 2).with_ids(0x0bda, 0x5830)
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn drain(events: &mut broadcast::Receiver<ThermcamEvent>) -> Vec<ThermcamEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

fn first_handle_id(sink: &RecordingCommandSink) -> u64 {
    sink.commands()
        .into_iter()
        .find_map(|command| match command {
            IssuedCommand::Open { handle_id, .. } => Some(handle_id),
            _ => None,
        })
        .unwrap()
}

#[tokio::test]
async fn test_service_creation() {
    let (service, bus, _sink) = create_service();

    assert_eq!(service.state(), ServiceState::Created);
    let status = service.status();
    assert!(!status.watcher_registered);
    assert_eq!(status.session.state, SessionState::Idle);
    assert!(!bus.is_listening());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let (backend, _bus) = mock_bus();
    let mut config = ThermcamConfig::default();
    config.system.request_queue_capacity = 0;

    let result = ThermcamService::new(
        config,
        backend,
        RecordingCommandSink::new(),
        HeadlessSurface::new(512, 384),
    );
    assert!(matches!(result, Err(ThermcamError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_denied_permission_leaves_service_idle() {
    let mut svc = spawn_service();
    svc.bus.set_grant_permission(false);

    svc.bus.attach(camera());
    let status = svc.handle.status().await.unwrap();

    assert_eq!(svc.bus.permission_requests(), vec![camera()]);
    assert_eq!(status.session.state, SessionState::Idle);
    assert_eq!(svc.sink.count(CommandKind::Open), 0);

    let events = drain(&mut svc.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, ThermcamEvent::PermissionRequested { .. })));
    assert!(events.iter().any(
        |e| matches!(e, ThermcamEvent::Error { kind, .. } if kind.as_str() == "permission_denied")
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_device_is_not_prompted() {
    let mut svc = spawn_service();

    svc.bus.attach(DeviceDescriptor::new(2, 1, 1));
    let status = svc.handle.status().await.unwrap();

    assert!(svc.bus.permission_requests().is_empty());
    assert_eq!(status.session.state, SessionState::Idle);
    assert!(drain(&mut svc.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_attach_to_active() {
    let svc = spawn_service();

    svc.bus.attach(camera());
    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Initializing);
    assert_eq!(status.session.device, Some(camera()));

    sleep(ms(2700)).await;

    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.state, ServiceState::Running);
    assert_eq!(status.session.state, SessionState::Active);
    assert!(status.session.previewing);
    assert!(status.session.measuring);
    assert!(status.session.ready);
    assert_eq!(svc.sink.commands().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_plan() {
    let svc = spawn_service();

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(700)).await;

    svc.bus.disconnect(camera());
    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Idle);

    sleep(ms(5000)).await;

    let handle_id = first_handle_id(&svc.sink);
    assert_eq!(svc.bus.released_handles(), vec![handle_id]);
    assert_eq!(svc.sink.count(CommandKind::SetControl), 0);
    assert_eq!(svc.sink.count(CommandKind::ChangePalette), 0);
    assert_eq!(svc.sink.count(CommandKind::StartMeasurement), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_while_active() {
    let svc = spawn_service();

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(2700)).await;
    let first = first_handle_id(&svc.sink);

    let second = svc.bus.connect(camera());
    let status = svc.handle.status().await.unwrap();

    assert_ne!(first, second);
    assert_eq!(svc.bus.release_count(first), 1);
    assert_eq!(svc.bus.release_count(second), 0);
    assert_eq!(status.session.state, SessionState::Initializing);
    assert!(!status.session.previewing);
    assert!(!status.session.measuring);

    sleep(ms(2700)).await;
    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Active);
    assert_eq!(svc.sink.count(CommandKind::StartPreview), 2);
    assert_eq!(svc.bus.release_count(first), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detach_of_other_device_keeps_session() {
    let svc = spawn_service();

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(2700)).await;

    svc.bus.detach(DeviceDescriptor::new(7, 3, 1));
    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Active);
    assert!(svc.bus.released_handles().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pause_keeps_session_and_resume_reattaches_camera() {
    let svc = spawn_service();

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(700)).await;

    svc.handle.pause().await.unwrap();
    svc.handle.pause().await.unwrap();
    assert!(!svc.bus.is_listening());

    sleep(ms(5000)).await;

    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.state, ServiceState::Paused);
    assert!(!status.watcher_registered);
    assert_eq!(status.session.state, SessionState::Previewing);
    assert_eq!(svc.sink.count(CommandKind::SetControl), 0);
    assert!(svc.bus.released_handles().is_empty());

    let first = first_handle_id(&svc.sink);

    // registering again enumerates the camera that is still plugged in, so
    // it is prompted and connected afresh and the plan restarts
    svc.handle.resume().await.unwrap();
    svc.handle.resume().await.unwrap();
    assert!(svc.bus.is_listening());

    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.state, ServiceState::Running);
    assert_eq!(status.session.state, SessionState::Initializing);
    assert!(!status.session.previewing);
    assert_eq!(svc.bus.permission_requests().len(), 2);
    assert_eq!(svc.bus.released_handles(), vec![first]);

    sleep(ms(2700)).await;

    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Active);
    assert!(status.session.ready);
    assert_eq!(svc.sink.count(CommandKind::StartPreview), 2);
    assert_eq!(svc.sink.count(CommandKind::SetControl), 1);
    assert_eq!(svc.bus.release_count(first), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detach_of_session_device_tears_down() {
    let mut svc = spawn_service();

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(700)).await;

    svc.bus.detach(camera());
    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Idle);
    assert_eq!(status.session.device, None);

    sleep(ms(5000)).await;

    let handle_id = first_handle_id(&svc.sink);
    assert_eq!(svc.bus.released_handles(), vec![handle_id]);
    assert_eq!(svc.sink.count(CommandKind::Close), 1);
    assert_eq!(svc.sink.count(CommandKind::SetControl), 0);
    assert_eq!(svc.sink.count(CommandKind::ChangePalette), 0);
    assert_eq!(svc.sink.count(CommandKind::StartMeasurement), 0);

    let events = drain(&mut svc.events);
    assert!(events.iter().any(
        |e| matches!(e, ThermcamEvent::Error { kind, .. } if kind.as_str() == "unexpected_disconnect")
    ));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ThermcamEvent::InitializationComplete { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_manual_operations() {
    let svc = spawn_service();

    assert!(matches!(
        svc.handle.stop_preview().await,
        Err(ThermcamError::NoSession)
    ));

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(2700)).await;

    svc.handle.stop_measurement().await.unwrap();
    let status = svc.handle.status().await.unwrap();
    assert_eq!(status.session.state, SessionState::Previewing);
    assert!(!status.session.measuring);

    svc.handle.start_measurement().await.unwrap();
    svc.handle.stop_preview().await.unwrap();
    let status = svc.handle.status().await.unwrap();
    assert!(!status.session.previewing);
    assert!(!status.session.measuring);

    assert!(matches!(
        svc.handle.start_measurement().await,
        Err(ThermcamError::InvalidState { .. })
    ));

    assert!(svc.handle.close_session().await.unwrap());
    assert!(!svc.handle.close_session().await.unwrap());
    assert_eq!(svc.bus.released_handles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_handle() {
    let mut svc = spawn_service();

    svc.bus.attach(camera());
    svc.handle.status().await.unwrap();
    sleep(ms(2700)).await;

    svc.handle.shutdown(ShutdownReason::UserRequest).await.unwrap();
    let exit_code = svc.task.await.unwrap().unwrap();

    assert_eq!(exit_code, 0);
    assert_eq!(svc.bus.released_handles().len(), 1);
    assert_eq!(svc.sink.count(CommandKind::Close), 1);
    assert!(svc.bus.is_released());
    assert!(!svc.bus.is_listening());

    let events = drain(&mut svc.events);
    assert!(events
        .iter()
        .any(|e| matches!(e, ThermcamEvent::ShutdownRequested { .. })));

    assert!(matches!(
        svc.handle.status().await,
        Err(ThermcamError::System { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_token_stops_service() {
    let (service, bus, _sink) = create_service();
    let token = service.cancellation_token();
    let task = tokio::spawn(service.run());

    sleep(ms(10)).await;
    assert!(bus.is_listening());

    token.cancel();
    assert_eq!(task.await.unwrap().unwrap(), 0);
    assert!(bus.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_error_shutdown_exit_code() {
    let svc = spawn_service();

    svc.handle
        .shutdown(ShutdownReason::Error("backend lost".to_string()))
        .await
        .unwrap();
    assert_eq!(svc.task.await.unwrap().unwrap(), 1);
}
