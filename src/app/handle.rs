use super::types::{Reply, ServiceRequest, ServiceStatus, ShutdownReason};
use crate::error::{Result, ThermcamError};
use crate::events::{EventBus, ThermcamEvent};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Cloneable client of a running [`ThermcamService`](super::ThermcamService)
#[derive(Clone)]
pub struct ServiceHandle {
    requests: mpsc::Sender<ServiceRequest>,
    event_bus: EventBus,
}

impl ServiceHandle {
    pub(super) fn new(requests: mpsc::Sender<ServiceRequest>, event_bus: EventBus) -> Self {
        Self {
            requests,
            event_bus,
        }
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        self.call(ServiceRequest::Status).await
    }

    /// Cancel the pending plan and stop watching the bus; the session stays open
    pub async fn pause(&self) -> Result<()> {
        self.call(ServiceRequest::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.call(ServiceRequest::Resume).await
    }

    pub async fn start_measurement(&self) -> Result<()> {
        self.call(ServiceRequest::StartMeasurement).await
    }

    pub async fn stop_measurement(&self) -> Result<()> {
        self.call(ServiceRequest::StopMeasurement).await
    }

    pub async fn stop_preview(&self) -> Result<()> {
        self.call(ServiceRequest::StopPreview).await
    }

    pub async fn reinitialize(&self) -> Result<()> {
        self.call(ServiceRequest::Reinitialize).await
    }

    /// Close the current session. Returns whether one was open.
    pub async fn close_session(&self) -> Result<bool> {
        self.call(ServiceRequest::CloseSession).await
    }

    /// Ask the service to shut down. Returns once the request is queued.
    pub async fn shutdown(&self, reason: ShutdownReason) -> Result<()> {
        self.send(ServiceRequest::Shutdown(reason)).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThermcamEvent> {
        self.event_bus.subscribe()
    }

    async fn call<T>(&self, request: impl FnOnce(Reply<T>) -> ServiceRequest) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(request(reply)).await?;
        response.await.map_err(|_| not_running())?
    }

    async fn send(&self, request: ServiceRequest) -> Result<()> {
        self.requests.send(request).await.map_err(|_| not_running())
    }
}

fn not_running() -> ThermcamError {
    ThermcamError::system("Camera service is not running")
}
