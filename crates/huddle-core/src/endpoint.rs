//! Host-owned attachment endpoints.
//!
//! The host UI layer creates publisher/subscriber endpoints and attaches them
//! to a session. The coordinator keeps only a [`Weak`] reference and forwards
//! start/stop commands when the rendezvous gates open or close.

use std::sync::{Arc, Weak};

/// Local outgoing media for one session.
///
/// Commands are issued after the session lock is released, so an endpoint may
/// call back into the coordinator (e.g. detach itself) from inside a command.
pub trait PublisherEndpoint: Send + Sync {
    fn start_publishing(&self, session_id: &str);
    fn stop_publishing(&self);
}

/// Local rendering of the session's remote stream.
pub trait SubscriberEndpoint: Send + Sync {
    fn start_subscribing(&self, session_id: &str, stream_id: &str);
    fn stop_subscribing(&self);
}

/// Non-owning slot for an attached endpoint.
pub(crate) struct EndpointRef<T: ?Sized> {
    handle: Weak<T>,
}

impl<T: ?Sized> EndpointRef<T> {
    pub(crate) fn new(endpoint: &Arc<T>) -> Self {
        Self {
            handle: Arc::downgrade(endpoint),
        }
    }

    /// `None` once the host has dropped the endpoint.
    pub(crate) fn upgrade(&self) -> Option<Arc<T>> {
        self.handle.upgrade()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.handle.strong_count() > 0
    }

    /// Whether both slots refer to the same endpoint.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.handle, &other.handle)
    }
}

impl<T: ?Sized> Clone for EndpointRef<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Endpoint command as observed by a fake endpoint.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Command {
        StartPublishing(String),
        StopPublishing,
        StartSubscribing(String, String),
        StopSubscribing,
    }

    #[derive(Default)]
    pub(crate) struct FakeEndpoint {
        pub(crate) commands: Mutex<Vec<Command>>,
    }

    impl FakeEndpoint {
        pub(crate) fn commands(&self) -> Vec<Command> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl PublisherEndpoint for FakeEndpoint {
        fn start_publishing(&self, session_id: &str) {
            self.commands
                .lock()
                .unwrap()
                .push(Command::StartPublishing(session_id.to_string()));
        }

        fn stop_publishing(&self) {
            self.commands.lock().unwrap().push(Command::StopPublishing);
        }
    }

    impl SubscriberEndpoint for FakeEndpoint {
        fn start_subscribing(&self, session_id: &str, stream_id: &str) {
            self.commands.lock().unwrap().push(Command::StartSubscribing(
                session_id.to_string(),
                stream_id.to_string(),
            ));
        }

        fn stop_subscribing(&self) {
            self.commands.lock().unwrap().push(Command::StopSubscribing);
        }
    }

    #[test]
    fn endpoint_ref_does_not_keep_endpoint_alive() {
        let endpoint: Arc<dyn PublisherEndpoint> = Arc::new(FakeEndpoint::default());
        let slot = EndpointRef::new(&endpoint);
        assert!(slot.is_alive());
        assert!(slot.upgrade().is_some());

        drop(endpoint);
        assert!(!slot.is_alive());
        assert!(slot.upgrade().is_none());
    }
}
