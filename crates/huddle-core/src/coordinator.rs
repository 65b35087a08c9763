use std::sync::Arc;

use crate::endpoint::{PublisherEndpoint, SubscriberEndpoint};
use crate::errors::CoordinatorError;
use crate::events::{EventDispatcher, SessionEventKind, SessionEventListener};
use crate::provider::{ProviderEvent, ProviderEventReceiver, SessionProvider};
use crate::registry::SessionRegistry;
use crate::session::{ConnectionStatus, SessionId, SessionState, StreamId};

/// Host-facing entry point: commands in, session-tagged events out.
///
/// Host commands and provider callbacks may arrive on any thread. Provider
/// operations, endpoint commands and listener callbacks are always invoked
/// outside the per-session lock, so listeners and endpoints may issue
/// commands from inside a callback.
pub struct SessionCoordinator {
    registry: Arc<SessionRegistry>,
    dispatcher: EventDispatcher,
    provider: Arc<dyn SessionProvider>,
}

impl SessionCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: EventDispatcher,
        provider: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            provider,
        }
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener>) {
        self.dispatcher.add_listener(listener);
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin connecting, creating the session if needed. A no-op while the
    /// session is already connecting or connected.
    pub fn connect(&self, session_id: &str, token: &str) {
        let state = self.registry.get_or_create(session_id);
        if !state.begin_connect() {
            return;
        }
        tracing::info!(session = session_id, "connecting");
        let result = self.provider.connect(session_id, token);
        let closed_meanwhile = state.finish_connect();
        match result {
            Err(e) => state.on_error(&e.to_string()),
            Ok(()) if closed_meanwhile => {
                tracing::info!(session = session_id, "disconnected while connecting");
                self.provider.disconnect(session_id);
            }
            Ok(()) => {}
        }
    }

    /// Tear the session down and forget it. Fails with `NotConnected` when
    /// the id was never connected; the entry is removed either way.
    pub fn disconnect(&self, session_id: &str) -> Result<(), CoordinatorError> {
        let state = self
            .registry
            .remove(session_id)
            .ok_or_else(|| CoordinatorError::NotConnected(session_id.to_string()))?;
        if self.close(&state) {
            Ok(())
        } else {
            Err(CoordinatorError::NotConnected(session_id.to_string()))
        }
    }

    pub fn disconnect_all(&self) {
        let sessions = self.registry.remove_all();
        tracing::info!(count = sessions.len(), "disconnecting all sessions");
        for state in sessions {
            self.close(&state);
        }
    }

    fn close(&self, state: &SessionState) -> bool {
        let outcome = state.close();
        if outcome.disconnect_provider {
            self.provider.disconnect(state.id());
        }
        outcome.connect_requested
    }

    /// Send a signal on a connected session. Signals are never queued.
    pub fn send_signal(
        &self,
        session_id: &str,
        signal_type: &str,
        data: &str,
    ) -> Result<(), CoordinatorError> {
        let state = self
            .registry
            .get(session_id)
            .filter(|state| state.can_signal())
            .ok_or_else(|| CoordinatorError::NotConnected(session_id.to_string()))?;
        if let Err(e) = self.provider.send_signal(session_id, signal_type, data) {
            state.on_error(&e.to_string());
        }
        Ok(())
    }

    pub fn attach_publisher(&self, session_id: &str, endpoint: &Arc<dyn PublisherEndpoint>) {
        self.registry.get_or_create(session_id).attach_publisher(endpoint);
    }

    pub fn detach_publisher(&self, session_id: &str) {
        if let Some(state) = self.registry.get(session_id) {
            state.detach_publisher();
        }
    }

    pub fn attach_subscriber(&self, session_id: &str, endpoint: &Arc<dyn SubscriberEndpoint>) {
        self.registry.get_or_create(session_id).attach_subscriber(endpoint);
    }

    pub fn detach_subscriber(&self, session_id: &str) {
        if let Some(state) = self.registry.get(session_id) {
            state.detach_subscriber();
        }
    }

    // ── Endpoint reports ─────────────────────────────────────────────

    pub fn report_publish_error(&self, session_id: &str, message: &str) {
        if let Some(state) = self.registry.get(session_id) {
            state.on_publish_error(message);
        }
    }

    pub fn report_subscribe_error(&self, session_id: &str, message: &str) {
        if let Some(state) = self.registry.get(session_id) {
            state.on_subscribe_error(message);
        }
    }

    pub fn report_subscriber_video_changed(&self, session_id: &str, enabled: bool) {
        if let Some(state) = self.registry.get(session_id) {
            state.on_subscriber_video_changed(enabled);
        }
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn connection_status(&self, session_id: &str) -> Option<ConnectionStatus> {
        self.registry.get(session_id).map(|state| state.status())
    }

    pub fn current_stream(&self, session_id: &str) -> Option<StreamId> {
        self.registry.get(session_id)?.current_stream()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.session_ids()
    }

    // ── Provider callbacks ───────────────────────────────────────────

    fn live_session(&self, session_id: &str, callback: &str) -> Option<Arc<SessionState>> {
        let state = self.registry.get(session_id);
        if state.is_none() {
            tracing::warn!(session = session_id, callback, "dropping callback for unknown session");
        }
        state
    }

    pub fn on_connected(&self, session_id: &str) {
        if let Some(state) = self.live_session(session_id, "connected") {
            state.on_connected();
        }
    }

    pub fn on_disconnected(&self, session_id: &str) {
        if let Some(state) = self.live_session(session_id, "disconnected") {
            state.on_disconnected();
        }
    }

    pub fn on_reconnecting(&self, session_id: &str) {
        if let Some(state) = self.live_session(session_id, "reconnecting") {
            state.on_reconnecting();
        }
    }

    pub fn on_reconnected(&self, session_id: &str) {
        if let Some(state) = self.live_session(session_id, "reconnected") {
            state.on_reconnected();
        }
    }

    pub fn on_stream_received(&self, session_id: &str, stream_id: &str) {
        if let Some(state) = self.live_session(session_id, "stream_received") {
            state.on_stream_received(stream_id);
        }
    }

    pub fn on_stream_dropped(&self, session_id: &str, stream_id: &str) {
        if let Some(state) = self.live_session(session_id, "stream_dropped") {
            state.on_stream_dropped(stream_id);
        }
    }

    pub fn on_signal(
        &self,
        session_id: &str,
        signal_type: &str,
        data: &str,
        connection_id: Option<&str>,
    ) {
        if let Some(state) = self.live_session(session_id, "signal") {
            state.on_informational(SessionEventKind::SignalReceived {
                signal_type: signal_type.to_string(),
                data: data.to_string(),
                connection_id: connection_id.map(str::to_string),
            });
        }
    }

    pub fn on_error(&self, session_id: &str, message: &str) {
        if let Some(state) = self.live_session(session_id, "error") {
            state.on_error(message);
        }
    }

    /// Apply one provider callback, dispatching on its kind.
    pub fn handle_provider_event(&self, session_id: &str, event: ProviderEvent) {
        match event {
            ProviderEvent::Connected => self.on_connected(session_id),
            ProviderEvent::Disconnected => self.on_disconnected(session_id),
            ProviderEvent::Reconnecting => self.on_reconnecting(session_id),
            ProviderEvent::Reconnected => self.on_reconnected(session_id),
            ProviderEvent::StreamReceived { stream_id } => {
                self.on_stream_received(session_id, &stream_id)
            }
            ProviderEvent::StreamDropped { stream_id } => {
                self.on_stream_dropped(session_id, &stream_id)
            }
            ProviderEvent::SignalReceived {
                signal_type,
                data,
                connection_id,
            } => self.on_signal(session_id, &signal_type, &data, connection_id.as_deref()),
            ProviderEvent::Error { message } => self.on_error(session_id, &message),
            ProviderEvent::ConnectionCreated { connection_id } => {
                self.forward(session_id, SessionEventKind::ConnectionCreated { connection_id })
            }
            ProviderEvent::ConnectionDestroyed { connection_id } => {
                self.forward(session_id, SessionEventKind::ConnectionDestroyed { connection_id })
            }
            ProviderEvent::ArchiveStarted { archive_id, name } => {
                self.forward(session_id, SessionEventKind::ArchiveStarted { archive_id, name })
            }
            ProviderEvent::ArchiveStopped { archive_id } => {
                self.forward(session_id, SessionEventKind::ArchiveStopped { archive_id })
            }
        }
    }

    fn forward(&self, session_id: &str, kind: SessionEventKind) {
        if let Some(state) = self.live_session(session_id, kind.name()) {
            state.on_informational(kind);
        }
    }

    /// Apply provider callbacks from `events` in arrival order on a spawned
    /// task. The task ends when every sender is dropped.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: ProviderEventReceiver,
    ) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while let Some((session_id, event)) = events.recv().await {
                tracing::trace!(session = %session_id, ?event, "provider event");
                coordinator.handle_provider_event(&session_id, event);
            }
            tracing::info!("provider event loop ended");
        })
    }
}
