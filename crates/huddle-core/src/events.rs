use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::session::{ConnectionId, SessionId, StreamId};

/// An event delivered to the host, always tagged with its originating session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEventKind {
    SessionConnected,
    SessionDisconnected,
    SessionReconnecting,
    SessionReconnected,
    SessionError { message: String },
    StreamCreated { stream_id: StreamId },
    StreamDestroyed { stream_id: StreamId },
    ConnectionCreated { connection_id: ConnectionId },
    ConnectionDestroyed { connection_id: ConnectionId },
    SignalReceived {
        #[serde(rename = "type")]
        signal_type: String,
        data: String,
        connection_id: Option<ConnectionId>,
    },
    ArchiveStarted { archive_id: String, name: String },
    ArchiveStopped { archive_id: String },
    PublishStarted,
    PublishStopped,
    PublishError { message: String },
    SubscribeStarted,
    SubscribeStopped,
    SubscribeError { message: String },
    SubscribeVideoChanged { enabled: bool },
}

impl SessionEventKind {
    /// Host-facing event name, stable across releases.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionConnected => "onSessionDidConnect",
            Self::SessionDisconnected => "onSessionDidDisconnect",
            Self::SessionReconnecting => "onSessionDidBeginReconnecting",
            Self::SessionReconnected => "onSessionDidReconnect",
            Self::SessionError { .. } => "onSessionDidFailWithError",
            Self::StreamCreated { .. } => "onSessionStreamCreated",
            Self::StreamDestroyed { .. } => "onSessionStreamDestroyed",
            Self::ConnectionCreated { .. } => "onSessionConnectionCreated",
            Self::ConnectionDestroyed { .. } => "onSessionConnectionDestroyed",
            Self::SignalReceived { .. } => "onSignalReceived",
            Self::ArchiveStarted { .. } => "onArchiveStartedWithId",
            Self::ArchiveStopped { .. } => "onArchiveStoppedWithId",
            Self::PublishStarted => "onPublishStart",
            Self::PublishStopped => "onPublishStop",
            Self::PublishError { .. } => "onPublishError",
            Self::SubscribeStarted => "onSubscribeStart",
            Self::SubscribeStopped => "onSubscribeStop",
            Self::SubscribeError { .. } => "onSubscribeError",
            Self::SubscribeVideoChanged { .. } => "onSubscribeVideoChanged",
        }
    }
}

impl SessionEvent {
    pub fn new(session_id: impl Into<SessionId>, kind: SessionEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// JSON payload for hosts that marshal events as maps.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Trait for receiving events from the coordinator.
/// Implementations must be Send + Sync (called from provider and host threads).
///
/// Listeners run after the originating session's lock is released and may
/// call back into the coordinator, including for the same session. Events of
/// one session are still delivered one at a time, in order.
pub trait SessionEventListener: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

/// Fans events out to every registered listener. No buffering, no retry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: Arc<RwLock<Vec<Arc<dyn SessionEventListener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn emit(&self, session_id: &str, kind: SessionEventKind) {
        let event = SessionEvent::new(session_id, kind);
        tracing::trace!(session = %event.session_id, event = event.name(), "dispatch");
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in &listeners {
            listener.on_event(event.clone());
        }
    }
}
