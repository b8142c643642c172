//! Runtime gateway interfaces and the SteamVR implementation.
//! The lifecycle loop only ever talks to the runtime through [`RuntimeGateway`].

mod registration;
mod steamvr;

pub use registration::{AppRegistrar, RegistrationReport};
pub use steamvr::SteamVrGateway;

use crate::error::ConnectError;

/// A lifecycle notification emitted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// The runtime is shutting down.
    Quit,
    /// Anything else the runtime reports; ignored by the lifecycle loop.
    Other(String),
}

/// Connection to the external VR runtime.
///
/// Implementors should:
/// - Report failures via `tracing::warn!` instead of panicking
/// - Tolerate `connect` being called again after a failure
/// - Tolerate `disconnect` without a prior successful `connect`
pub trait RuntimeGateway: Send {
    /// Attach to the runtime. On the first success, register the agent for
    /// auto-launch if it is not registered yet.
    fn connect(&mut self) -> Result<(), ConnectError>;

    /// Next pending event, or `None` if nothing is queued or the poll failed.
    fn poll_event(&mut self) -> Option<RuntimeEvent>;

    /// Tell the runtime the quit signal was observed. Best effort.
    fn acknowledge_shutdown(&mut self);

    /// Release the connection.
    fn disconnect(&mut self);
}
