//! Huddle session coordinator.
//!
//! Tracks concurrently active real-time sessions, their connection state and
//! remote stream, and starts/stops host-owned publisher and subscriber
//! endpoints when network and UI lifecycles meet. Events flow out to the host
//! through registered listeners.

pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod errors;
pub mod events;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod session;

#[cfg(feature = "livekit")]
pub mod livekit_provider;

pub use config::CoordinatorConfig;
pub use coordinator::SessionCoordinator;
pub use endpoint::{PublisherEndpoint, SubscriberEndpoint};
pub use errors::{ConfigError, CoordinatorError, ProviderError};
pub use events::{EventDispatcher, SessionEvent, SessionEventKind, SessionEventListener};
pub use provider::{ProviderEvent, SessionProvider, provider_channel};
pub use registry::SessionRegistry;
pub use session::{ConnectionStatus, SessionId, SessionState, StreamId};

#[cfg(feature = "livekit")]
pub use livekit_provider::LiveKitProvider;
