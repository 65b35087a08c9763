//! [`SessionProvider`] backed by LiveKit rooms. One room per session id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use livekit::DataPacket;
use livekit::prelude::{Room, RoomEvent, RoomOptions};
use livekit::track::TrackKind as LkTrackKind;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::CoordinatorConfig;
use crate::errors::ProviderError;
use crate::provider::{ProviderEvent, ProviderEventSender, SessionProvider};
use crate::session::SessionId;

/// `None` while the room is still connecting.
type RoomMap = HashMap<SessionId, Option<Arc<Room>>>;

pub struct LiveKitProvider {
    server_url: Option<String>,
    runtime: Handle,
    events: ProviderEventSender,
    rooms: Arc<Mutex<RoomMap>>,
}

impl LiveKitProvider {
    pub fn new(config: &CoordinatorConfig, runtime: Handle, events: ProviderEventSender) -> Self {
        Self {
            server_url: config.server_url.clone(),
            runtime,
            events,
            rooms: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn rooms(rooms: &Mutex<RoomMap>) -> MutexGuard<'_, RoomMap> {
        rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn room(&self, session_id: &str) -> Option<Arc<Room>> {
        Self::rooms(&self.rooms).get(session_id).cloned().flatten()
    }

    async fn forward_room_events(
        session_id: SessionId,
        mut events: UnboundedReceiver<RoomEvent>,
        sink: ProviderEventSender,
    ) {
        while let Some(event) = events.recv().await {
            if let RoomEvent::Disconnected { reason } = &event {
                tracing::info!(session = %session_id, "room disconnected: {reason:?}");
            }
            let Some(mapped) = map_room_event(event) else {
                continue;
            };
            let last = matches!(mapped, ProviderEvent::Disconnected);
            if sink.send((session_id.clone(), mapped)).is_err() || last {
                break;
            }
        }
        tracing::info!(session = %session_id, "room event loop ended");
    }
}

/// Translates one room event. `None` for events with no session meaning.
/// `Disconnected` is the last event a room produces.
fn map_room_event(event: RoomEvent) -> Option<ProviderEvent> {
    match event {
        RoomEvent::Reconnecting => Some(ProviderEvent::Reconnecting),
        RoomEvent::Reconnected => Some(ProviderEvent::Reconnected),
        RoomEvent::Disconnected { .. } => Some(ProviderEvent::Disconnected),
        RoomEvent::ParticipantConnected(participant) => Some(ProviderEvent::ConnectionCreated {
            connection_id: participant.sid().to_string(),
        }),
        RoomEvent::ParticipantDisconnected(participant) => {
            Some(ProviderEvent::ConnectionDestroyed {
                connection_id: participant.sid().to_string(),
            })
        }
        RoomEvent::TrackSubscribed { track, publication, .. } => {
            track_event(publication.kind(), track.sid().to_string(), true)
        }
        RoomEvent::TrackUnsubscribed { track, publication, .. } => {
            track_event(publication.kind(), track.sid().to_string(), false)
        }
        RoomEvent::DataReceived { payload, topic, participant, .. } => {
            data_event(&payload, topic, participant.map(|p| p.sid().to_string()))
        }
        other => {
            tracing::debug!("unhandled room event: {other:?}");
            None
        }
    }
}

/// Only video tracks count as session streams.
fn track_event(kind: LkTrackKind, track_sid: String, subscribed: bool) -> Option<ProviderEvent> {
    if kind != LkTrackKind::Video {
        return None;
    }
    Some(if subscribed {
        ProviderEvent::StreamReceived { stream_id: track_sid }
    } else {
        ProviderEvent::StreamDropped { stream_id: track_sid }
    })
}

/// Data packets are signals: the topic is the signal type and the payload
/// must be UTF-8 text.
fn data_event(
    payload: &[u8],
    topic: Option<String>,
    connection_id: Option<String>,
) -> Option<ProviderEvent> {
    match std::str::from_utf8(payload) {
        Ok(text) => Some(ProviderEvent::SignalReceived {
            signal_type: topic.unwrap_or_default(),
            data: text.to_string(),
            connection_id,
        }),
        Err(e) => {
            tracing::debug!("non-text data packet: {e}");
            None
        }
    }
}

impl SessionProvider for LiveKitProvider {
    fn connect(&self, session_id: &str, token: &str) -> Result<(), ProviderError> {
        let url = self
            .server_url
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("no server url configured".into()))?;
        Self::rooms(&self.rooms).insert(session_id.to_string(), None);

        let session_id = session_id.to_string();
        let token = token.to_string();
        let rooms = self.rooms.clone();
        let sink = self.events.clone();
        self.runtime.spawn(async move {
            let mut options = RoomOptions::default();
            options.auto_subscribe = true;

            let (room, events) = match Room::connect(&url, &token, options).await {
                Ok(connected) => connected,
                Err(e) => {
                    Self::rooms(&rooms).remove(&session_id);
                    let _ = sink.send((
                        session_id,
                        ProviderEvent::Error {
                            message: ProviderError::Connect(e.to_string()).to_string(),
                        },
                    ));
                    return;
                }
            };
            let room = Arc::new(room);

            let still_wanted = match Self::rooms(&rooms).get_mut(&session_id) {
                Some(slot) => {
                    *slot = Some(room.clone());
                    true
                }
                None => false,
            };
            if !still_wanted {
                tracing::info!(session = %session_id, "disconnected while connecting, closing room");
                if let Err(e) = room.close().await {
                    tracing::warn!("error closing room: {e}");
                }
                return;
            }

            let _ = sink.send((session_id.clone(), ProviderEvent::Connected));
            for participant in room.remote_participants().values() {
                let _ = sink.send((
                    session_id.clone(),
                    ProviderEvent::ConnectionCreated {
                        connection_id: participant.sid().to_string(),
                    },
                ));
            }
            Self::forward_room_events(session_id, events, sink).await;
        });
        Ok(())
    }

    fn disconnect(&self, session_id: &str) {
        let room = Self::rooms(&self.rooms).remove(session_id).flatten();
        if let Some(room) = room {
            self.runtime.spawn(async move {
                if let Err(e) = room.close().await {
                    tracing::warn!("error closing room: {e}");
                }
            });
        }
    }

    fn send_signal(&self, session_id: &str, signal_type: &str, data: &str) -> Result<(), ProviderError> {
        let room = self
            .room(session_id)
            .ok_or_else(|| ProviderError::Signal(format!("no room for session {session_id}")))?;
        let packet = DataPacket {
            payload: data.as_bytes().to_vec(),
            topic: Some(signal_type.to_string()),
            reliable: true,
            ..Default::default()
        };
        let session_id = session_id.to_string();
        let sink = self.events.clone();
        self.runtime.spawn(async move {
            if let Err(e) = room.local_participant().publish_data(packet).await {
                let _ = sink.send((
                    session_id,
                    ProviderEvent::Error {
                        message: ProviderError::Signal(e.to_string()).to_string(),
                    },
                ));
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_events_map_one_to_one() {
        assert_eq!(
            map_room_event(RoomEvent::Reconnecting),
            Some(ProviderEvent::Reconnecting)
        );
        assert_eq!(
            map_room_event(RoomEvent::Reconnected),
            Some(ProviderEvent::Reconnected)
        );
    }

    #[test]
    fn only_video_tracks_become_streams() {
        assert_eq!(
            track_event(LkTrackKind::Video, "TR_v".into(), true),
            Some(ProviderEvent::StreamReceived { stream_id: "TR_v".into() })
        );
        assert_eq!(
            track_event(LkTrackKind::Video, "TR_v".into(), false),
            Some(ProviderEvent::StreamDropped { stream_id: "TR_v".into() })
        );
        assert_eq!(track_event(LkTrackKind::Audio, "TR_a".into(), true), None);
    }

    #[test]
    fn text_data_becomes_signal() {
        assert_eq!(
            data_event(b"hello", Some("chat".into()), Some("PA_1".into())),
            Some(ProviderEvent::SignalReceived {
                signal_type: "chat".into(),
                data: "hello".into(),
                connection_id: Some("PA_1".into()),
            })
        );
    }

    #[test]
    fn data_without_topic_has_empty_signal_type() {
        assert_eq!(
            data_event(b"{}", None, None),
            Some(ProviderEvent::SignalReceived {
                signal_type: String::new(),
                data: "{}".into(),
                connection_id: None,
            })
        );
    }

    #[test]
    fn binary_data_is_dropped() {
        assert_eq!(data_event(&[0xff, 0xfe, 0x00], Some("chat".into()), None), None);
    }
}
