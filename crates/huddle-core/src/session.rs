use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::endpoint::{EndpointRef, PublisherEndpoint, SubscriberEndpoint};
use crate::events::{EventDispatcher, SessionEventKind};

pub type SessionId = String;
pub type StreamId = String;
pub type ConnectionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

/// Side effect decided under the session lock and carried out after it is
/// released.
enum Effect {
    Emit(SessionEventKind),
    StartPublishing(Arc<dyn PublisherEndpoint>),
    StopPublishing(Arc<dyn PublisherEndpoint>),
    StartSubscribing(Arc<dyn SubscriberEndpoint>, StreamId),
    StopSubscribing(Arc<dyn SubscriberEndpoint>),
}

struct SessionInner {
    status: ConnectionStatus,
    current_stream: Option<StreamId>,
    publisher: Option<EndpointRef<dyn PublisherEndpoint>>,
    subscriber: Option<EndpointRef<dyn SubscriberEndpoint>>,
    /// Endpoint that was last told to start publishing.
    publishing: Option<EndpointRef<dyn PublisherEndpoint>>,
    /// Endpoint and stream that were last told to start subscribing.
    subscribing: Option<(EndpointRef<dyn SubscriberEndpoint>, StreamId)>,
    connect_requested: bool,
    /// Set between `begin_connect` and `finish_connect`, while the provider
    /// call is in flight.
    connect_issuing: bool,
    closed: bool,
    outbox: VecDeque<Effect>,
    draining: bool,
}

impl SessionInner {
    fn emit(&mut self, kind: SessionEventKind) {
        self.outbox.push_back(Effect::Emit(kind));
    }
}

/// What the coordinator must do after closing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CloseOutcome {
    pub(crate) connect_requested: bool,
    /// False while a provider connect is still being issued; the connecting
    /// caller disconnects the provider once its call returns.
    pub(crate) disconnect_provider: bool,
}

/// State of one session: connection status, the tracked remote stream and the
/// attached endpoints, reconciled by the publish and subscribe gates.
///
/// State changes and gate evaluation happen under a single per-session lock.
/// The events and endpoint commands they produce are queued in order and
/// delivered after the lock is released, by one caller at a time, so
/// listeners and endpoints may call back into the coordinator.
pub struct SessionState {
    id: SessionId,
    dispatcher: EventDispatcher,
    inner: Mutex<SessionInner>,
}

impl SessionState {
    pub fn new(id: impl Into<SessionId>, dispatcher: EventDispatcher) -> Self {
        Self {
            id: id.into(),
            dispatcher,
            inner: Mutex::new(SessionInner {
                status: ConnectionStatus::Idle,
                current_stream: None,
                publisher: None,
                subscriber: None,
                publishing: None,
                subscribing: None,
                connect_requested: false,
                connect_issuing: false,
                closed: false,
                outbox: VecDeque::new(),
                draining: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    pub fn current_stream(&self) -> Option<StreamId> {
        self.lock().current_stream.clone()
    }

    pub fn is_publishing(&self) -> bool {
        self.lock().publishing.is_some()
    }

    pub fn is_subscribing(&self) -> bool {
        self.lock().subscribing.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` under the lock, then delivers whatever it queued.
    fn update<R>(&self, f: impl FnOnce(&mut SessionInner) -> R) -> R {
        let result = {
            let mut inner = self.lock();
            f(&mut inner)
        };
        self.flush();
        result
    }

    /// Delivers queued effects in order without holding the lock. A caller
    /// that finds another delivery in progress (on this thread or another)
    /// leaves its effects to that one.
    fn flush(&self) {
        {
            let mut inner = self.lock();
            if inner.draining {
                return;
            }
            inner.draining = true;
        }
        loop {
            let effect = {
                let mut inner = self.lock();
                match inner.outbox.pop_front() {
                    Some(effect) => effect,
                    None => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            self.apply(effect);
        }
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::Emit(kind) => self.dispatcher.emit(&self.id, kind),
            Effect::StartPublishing(endpoint) => endpoint.start_publishing(&self.id),
            Effect::StopPublishing(endpoint) => endpoint.stop_publishing(),
            Effect::StartSubscribing(endpoint, stream) => {
                endpoint.start_subscribing(&self.id, &stream)
            }
            Effect::StopSubscribing(endpoint) => endpoint.stop_subscribing(),
        }
    }

    // ── Host commands ────────────────────────────────────────────────

    /// Marks the session as connecting. Returns `false` when a connect is
    /// already in flight or established, in which case the provider must not
    /// be asked again. On `true` the caller issues the provider connect and
    /// then calls [`Self::finish_connect`].
    pub(crate) fn begin_connect(&self) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        match inner.status {
            ConnectionStatus::Connecting
            | ConnectionStatus::Connected
            | ConnectionStatus::Reconnecting => {
                tracing::debug!(session = %self.id, status = ?inner.status, "connect ignored");
                false
            }
            ConnectionStatus::Idle | ConnectionStatus::Disconnected => {
                inner.status = ConnectionStatus::Connecting;
                inner.connect_requested = true;
                inner.connect_issuing = true;
                true
            }
        }
    }

    /// Ends the provider connect started by [`Self::begin_connect`]. Returns
    /// `true` when the session was closed meanwhile; the provider connection
    /// then belongs to nobody and the caller must disconnect it.
    pub(crate) fn finish_connect(&self) -> bool {
        let mut inner = self.lock();
        inner.connect_issuing = false;
        inner.closed
    }

    pub(crate) fn can_signal(&self) -> bool {
        let inner = self.lock();
        !inner.closed && inner.status == ConnectionStatus::Connected
    }

    /// Tears the session down for good.
    pub(crate) fn close(&self) -> CloseOutcome {
        self.update(|inner| {
            if inner.closed {
                return CloseOutcome {
                    connect_requested: inner.connect_requested,
                    disconnect_provider: false,
                };
            }
            let outcome = CloseOutcome {
                connect_requested: inner.connect_requested,
                disconnect_provider: inner.connect_requested && !inner.connect_issuing,
            };
            let was_live = matches!(
                inner.status,
                ConnectionStatus::Connecting
                    | ConnectionStatus::Connected
                    | ConnectionStatus::Reconnecting
            );
            inner.closed = true;
            inner.status = ConnectionStatus::Disconnected;
            inner.current_stream = None;
            inner.publisher = None;
            inner.subscriber = None;
            self.sync_publish(inner);
            self.sync_subscribe(inner);
            if was_live {
                inner.emit(SessionEventKind::SessionDisconnected);
            }
            tracing::info!(session = %self.id, "session closed");
            outcome
        })
    }

    pub fn attach_publisher(&self, endpoint: &Arc<dyn PublisherEndpoint>) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            inner.publisher = Some(EndpointRef::new(endpoint));
            self.sync_publish(inner);
        })
    }

    pub fn detach_publisher(&self) {
        self.update(|inner| {
            inner.publisher = None;
            self.sync_publish(inner);
        })
    }

    pub fn attach_subscriber(&self, endpoint: &Arc<dyn SubscriberEndpoint>) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            inner.subscriber = Some(EndpointRef::new(endpoint));
            self.sync_subscribe(inner);
        })
    }

    pub fn detach_subscriber(&self) {
        self.update(|inner| {
            inner.subscriber = None;
            self.sync_subscribe(inner);
        })
    }

    // ── Provider callbacks ───────────────────────────────────────────
    //
    // Each returns without effect once the session is closed, and status
    // callbacks only act on the transitions they describe. The callback's own
    // event is queued before any rendezvous event it causes.

    /// A `Connected` report while reconnecting is taken as `Reconnected`.
    pub fn on_connected(&self) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            match inner.status {
                ConnectionStatus::Connected => {}
                ConnectionStatus::Reconnecting => self.reconnected(inner),
                ConnectionStatus::Idle
                | ConnectionStatus::Connecting
                | ConnectionStatus::Disconnected => {
                    inner.status = ConnectionStatus::Connected;
                    tracing::info!(session = %self.id, "connected");
                    inner.emit(SessionEventKind::SessionConnected);
                    self.sync_publish(inner);
                }
            }
        })
    }

    /// Ignored unless the session is connecting, connected or reconnecting.
    pub fn on_disconnected(&self) {
        self.update(|inner| {
            if inner.closed || !Self::is_live(inner.status) {
                return;
            }
            inner.status = ConnectionStatus::Disconnected;
            inner.current_stream = None;
            tracing::info!(session = %self.id, "disconnected by provider");
            inner.emit(SessionEventKind::SessionDisconnected);
            self.sync_publish(inner);
            self.sync_subscribe(inner);
        })
    }

    /// Endpoints stay attached and running while the provider reconnects.
    pub fn on_reconnecting(&self) {
        self.update(|inner| {
            if inner.closed || inner.status != ConnectionStatus::Connected {
                return;
            }
            inner.status = ConnectionStatus::Reconnecting;
            tracing::info!(session = %self.id, "reconnecting");
            inner.emit(SessionEventKind::SessionReconnecting);
        })
    }

    pub fn on_reconnected(&self) {
        self.update(|inner| {
            if inner.closed || inner.status != ConnectionStatus::Reconnecting {
                return;
            }
            self.reconnected(inner);
        })
    }

    fn reconnected(&self, inner: &mut SessionInner) {
        inner.status = ConnectionStatus::Connected;
        tracing::info!(session = %self.id, "reconnected");
        inner.emit(SessionEventKind::SessionReconnected);
        self.sync_publish(inner);
    }

    fn is_live(status: ConnectionStatus) -> bool {
        matches!(
            status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected | ConnectionStatus::Reconnecting
        )
    }

    pub fn on_stream_received(&self, stream_id: &str) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            inner.emit(SessionEventKind::StreamCreated {
                stream_id: stream_id.to_string(),
            });
            if let Some(previous) = inner.current_stream.replace(stream_id.to_string()) {
                if previous != stream_id {
                    tracing::debug!(session = %self.id, %previous, current = stream_id, "stream replaced");
                }
            }
            self.sync_subscribe(inner);
        })
    }

    pub fn on_stream_dropped(&self, stream_id: &str) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            inner.emit(SessionEventKind::StreamDestroyed {
                stream_id: stream_id.to_string(),
            });
            if inner.current_stream.as_deref() == Some(stream_id) {
                inner.current_stream = None;
                self.sync_subscribe(inner);
            }
        })
    }

    /// Forwards events that carry no session state (connections, signals,
    /// archives).
    pub fn on_informational(&self, kind: SessionEventKind) {
        self.update(|inner| {
            if !inner.closed {
                inner.emit(kind);
            }
        })
    }

    pub fn on_error(&self, message: &str) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            tracing::warn!(session = %self.id, "provider error: {message}");
            inner.emit(SessionEventKind::SessionError {
                message: message.to_string(),
            });
            if inner.status == ConnectionStatus::Connecting {
                inner.status = ConnectionStatus::Disconnected;
            }
        })
    }

    // ── Endpoint reports ─────────────────────────────────────────────

    /// The publisher failed on its own. Publishing ends and the endpoint is
    /// released; the host re-attaches to try again.
    pub fn on_publish_error(&self, message: &str) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            tracing::warn!(session = %self.id, "publish error: {message}");
            inner.emit(SessionEventKind::PublishError {
                message: message.to_string(),
            });
            if let Some(endpoint) = inner.publishing.take().and_then(|active| active.upgrade()) {
                inner.outbox.push_back(Effect::StopPublishing(endpoint));
            }
            inner.publisher = None;
        })
    }

    pub fn on_subscribe_error(&self, message: &str) {
        self.update(|inner| {
            if inner.closed {
                return;
            }
            tracing::warn!(session = %self.id, "subscribe error: {message}");
            inner.emit(SessionEventKind::SubscribeError {
                message: message.to_string(),
            });
            if let Some(endpoint) = inner.subscribing.take().and_then(|(active, _)| active.upgrade()) {
                inner.outbox.push_back(Effect::StopSubscribing(endpoint));
            }
            inner.subscriber = None;
        })
    }

    pub fn on_subscriber_video_changed(&self, enabled: bool) {
        self.update(|inner| {
            if inner.closed || inner.subscribing.is_none() {
                return;
            }
            inner.emit(SessionEventKind::SubscribeVideoChanged { enabled });
        })
    }

    // ── Rendezvous ───────────────────────────────────────────────────

    /// Brings the running publisher in line with the publish gate. Queues a
    /// stop and/or a start only when the desired endpoint differs from the
    /// one already publishing.
    fn sync_publish(&self, inner: &mut SessionInner) {
        if inner.publisher.as_ref().is_some_and(|p| !p.is_alive()) {
            tracing::debug!(session = %self.id, "publisher endpoint dropped by host");
            inner.publisher = None;
        }
        let live = match inner.status {
            ConnectionStatus::Connected => true,
            ConnectionStatus::Reconnecting => inner.publishing.is_some(),
            _ => false,
        };
        let desired = if live { inner.publisher.clone() } else { None };

        let unchanged = match (&inner.publishing, &desired) {
            (Some(active), Some(wanted)) => active.ptr_eq(wanted),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(active) = inner.publishing.take() {
            if let Some(endpoint) = active.upgrade() {
                inner.outbox.push_back(Effect::StopPublishing(endpoint));
            }
            tracing::debug!(session = %self.id, "publish stopped");
            inner.emit(SessionEventKind::PublishStopped);
        }
        if let Some(wanted) = desired {
            if let Some(endpoint) = wanted.upgrade() {
                inner.outbox.push_back(Effect::StartPublishing(endpoint));
                inner.publishing = Some(wanted);
                tracing::debug!(session = %self.id, "publish started");
                inner.emit(SessionEventKind::PublishStarted);
            }
        }
    }

    /// Same as [`Self::sync_publish`] for the (subscriber, stream) pair.
    fn sync_subscribe(&self, inner: &mut SessionInner) {
        if inner.subscriber.as_ref().is_some_and(|s| !s.is_alive()) {
            tracing::debug!(session = %self.id, "subscriber endpoint dropped by host");
            inner.subscriber = None;
        }
        let desired = match (&inner.subscriber, &inner.current_stream) {
            (Some(endpoint), Some(stream)) => Some((endpoint.clone(), stream.clone())),
            _ => None,
        };

        let unchanged = match (&inner.subscribing, &desired) {
            (Some((active, active_stream)), Some((wanted, wanted_stream))) => {
                active.ptr_eq(wanted) && active_stream == wanted_stream
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some((active, stream)) = inner.subscribing.take() {
            if let Some(endpoint) = active.upgrade() {
                inner.outbox.push_back(Effect::StopSubscribing(endpoint));
            }
            tracing::debug!(session = %self.id, %stream, "subscribe stopped");
            inner.emit(SessionEventKind::SubscribeStopped);
        }
        if let Some((wanted, stream)) = desired {
            if let Some(endpoint) = wanted.upgrade() {
                inner
                    .outbox
                    .push_back(Effect::StartSubscribing(endpoint, stream.clone()));
                tracing::debug!(session = %self.id, %stream, "subscribe started");
                inner.subscribing = Some((wanted, stream));
                inner.emit(SessionEventKind::SubscribeStarted);
            }
        }
    }
}
