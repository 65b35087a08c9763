//! Boundary to the library that actually talks to the media backend.

use tokio::sync::mpsc;

use crate::errors::ProviderError;
use crate::session::{ConnectionId, SessionId, StreamId};

/// Network-side operations for sessions.
///
/// Every method only *initiates* work and returns immediately; outcomes are
/// reported later as [`ProviderEvent`]s. Implementations may deliver events
/// synchronously from inside these calls.
pub trait SessionProvider: Send + Sync {
    fn connect(&self, session_id: &str, token: &str) -> Result<(), ProviderError>;
    fn disconnect(&self, session_id: &str);
    fn send_signal(&self, session_id: &str, signal_type: &str, data: &str)
    -> Result<(), ProviderError>;
}

/// Lifecycle callbacks a provider reports for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Connected,
    Disconnected,
    Reconnecting,
    Reconnected,
    StreamReceived { stream_id: StreamId },
    StreamDropped { stream_id: StreamId },
    ConnectionCreated { connection_id: ConnectionId },
    ConnectionDestroyed { connection_id: ConnectionId },
    SignalReceived {
        signal_type: String,
        data: String,
        connection_id: Option<ConnectionId>,
    },
    ArchiveStarted { archive_id: String, name: String },
    ArchiveStopped { archive_id: String },
    Error { message: String },
}

/// Ordered stream of provider callbacks, tagged with their session.
pub type ProviderEventSender = mpsc::UnboundedSender<(SessionId, ProviderEvent)>;
pub type ProviderEventReceiver = mpsc::UnboundedReceiver<(SessionId, ProviderEvent)>;

pub fn provider_channel() -> (ProviderEventSender, ProviderEventReceiver) {
    mpsc::unbounded_channel()
}
