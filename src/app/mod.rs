mod handle;
mod lifecycle;
mod runtime;
mod service;
mod shutdown;
mod types;

#[cfg(test)]
mod tests;

pub use handle::ServiceHandle;
pub use runtime::spawn_signal_handlers;
pub use service::ThermcamService;
pub use types::{ServiceState, ServiceStatus, ShutdownReason};
